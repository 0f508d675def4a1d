//! Write path: keep the index in step with the primary store after each
//! mutation, and repair it from data-change events.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::entities::Searchable;
use crate::error::{Result, SearchError};
use crate::events::{ChangeKind, DataChangeEvent, EventPublisher};
use crate::index::SearchIndex;
use crate::store::{RecordStore, StoreError};
use crate::types::{DocId, HouseholdId, IndexName};

/// Who asked for a mutation; copied onto the emitted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub user_id: String,
    pub household_id: Option<HouseholdId>,
}

impl Requester {
    pub fn new(user_id: impl Into<String>, household_id: Option<HouseholdId>) -> Self {
        Requester {
            user_id: user_id.into(),
            household_id,
        }
    }
}

/// Called by an entity service once its primary-store write has committed.
pub struct EntityIndexer<T> {
    index: SearchIndex,
    publisher: Arc<dyn EventPublisher>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for EntityIndexer<T> {
    fn clone(&self) -> Self {
        EntityIndexer {
            index: self.index.clone(),
            publisher: Arc::clone(&self.publisher),
            _record: PhantomData,
        }
    }
}

impl<T: Searchable> EntityIndexer<T> {
    pub fn new(index: SearchIndex, publisher: Arc<dyn EventPublisher>) -> Self {
        EntityIndexer {
            index,
            publisher,
            _record: PhantomData,
        }
    }

    pub fn index(&self) -> &SearchIndex {
        &self.index
    }

    pub async fn on_created(&self, record: &T, by: &Requester) -> Result<()> {
        self.index.index(record.to_document()).await?;
        self.emit(ChangeKind::Created, record, by)
    }

    /// Replaces the prior document under the same ID.
    pub async fn on_updated(&self, record: &T, by: &Requester) -> Result<()> {
        self.index.index(record.to_document()).await?;
        self.emit(ChangeKind::Updated, record, by)
    }

    pub async fn on_archived(&self, record: &T, by: &Requester) -> Result<()> {
        self.index.delete(&record.id()).await?;
        self.emit(ChangeKind::Archived, record, by)
    }

    fn emit(&self, kind: ChangeKind, record: &T, by: &Requester) -> Result<()> {
        let event = DataChangeEvent::new(
            T::TOPIC,
            kind,
            T::INDEX,
            by.user_id.clone(),
            by.household_id,
            serde_json::to_value(record)?,
        );
        if let Err(e) = self.publisher.publish(event) {
            tracing::warn!(index = %T::INDEX, error = %e, "failed to publish data change");
        }
        Ok(())
    }
}

/// Unit of reconciliation work derived from a data-change event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRequest {
    pub row_id: DocId,
    pub index_type: IndexName,
    pub delete: bool,
}

impl IndexRequest {
    /// `None` when the event's record carries no ID.
    pub fn from_event(event: &DataChangeEvent) -> Option<Self> {
        Some(IndexRequest {
            row_id: DocId::new(event.record_id()?),
            index_type: event.index.clone(),
            delete: event.kind == ChangeKind::Archived,
        })
    }
}

/// Re-derives index state for one entity type from the primary store.
pub struct Reconciler<T, S> {
    index: SearchIndex,
    store: S,
    _record: PhantomData<fn() -> T>,
}

impl<T, S: Clone> Clone for Reconciler<T, S> {
    fn clone(&self) -> Self {
        Reconciler {
            index: self.index.clone(),
            store: self.store.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Searchable, S: RecordStore<T>> Reconciler<T, S> {
    pub fn new(index: SearchIndex, store: S) -> Self {
        Reconciler {
            index,
            store,
            _record: PhantomData,
        }
    }

    /// Apply one request. Requests for other indexes are ignored.
    pub async fn handle(&self, request: &IndexRequest) -> Result<()> {
        if request.index_type != T::INDEX {
            return Ok(());
        }
        if request.delete {
            return self.index.delete(&request.row_id).await;
        }
        match self.store.get(&request.row_id).await {
            Ok(record) => self.index.index(record.to_document()).await,
            Err(StoreError::NoRows) => {
                tracing::debug!(index = %T::INDEX, id = %request.row_id, "record gone, removing from index");
                self.index.delete(&request.row_id).await
            }
            Err(e) => Err(SearchError::backend("reading record", e)),
        }
    }

    /// Consume events until the bus closes. Lagged receivers skip ahead.
    pub async fn run(self, mut events: broadcast::Receiver<DataChangeEvent>) {
        tracing::info!(index = %T::INDEX, "reconciler started");
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(index = %T::INDEX, skipped, "reconciler lagged behind event bus");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let Some(request) = IndexRequest::from_event(&event) else {
                tracing::warn!(topic = %event.topic, "data change without record id");
                continue;
            };
            if let Err(e) = self.handle(&request).await {
                tracing::error!(
                    index = %T::INDEX,
                    id = %request.row_id,
                    error = %e,
                    "reconciliation failed"
                );
            }
        }
        tracing::info!(index = %T::INDEX, "reconciler stopped");
    }
}
