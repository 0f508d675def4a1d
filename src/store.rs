//! Primary-store seam. The index only ever holds derivative projections;
//! records are always read back from a [`RecordStore`].

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;

use crate::entities::Searchable;
use crate::types::{DocId, HouseholdId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("no rows")]
    NoRows,

    #[error("store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Database of record for one entity type.
pub trait RecordStore<T: Searchable>: Clone + Send + Sync + 'static {
    fn get(&self, id: &DocId) -> impl Future<Output = StoreResult<T>> + Send;

    /// Records for `ids` in the order given, at most `limit` of them. Missing
    /// IDs are skipped; `NoRows` when none exist.
    fn get_with_ids(
        &self,
        ids: &[DocId],
        limit: usize,
    ) -> impl Future<Output = StoreResult<Vec<T>>> + Send;

    /// The store's own text search, used when the index is bypassed.
    fn search_for(
        &self,
        query: &str,
        household: HouseholdId,
        limit: usize,
    ) -> impl Future<Output = StoreResult<Vec<T>>> + Send;
}

/// In-memory [`RecordStore`]. Clones share the same records.
#[derive(Debug)]
pub struct MemoryStore<T> {
    records: Arc<DashMap<DocId, T>>,
}

impl<T> Clone for MemoryStore<T> {
    fn clone(&self) -> Self {
        MemoryStore {
            records: Arc::clone(&self.records),
        }
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        MemoryStore {
            records: Arc::new(DashMap::new()),
        }
    }
}

impl<T: Searchable> MemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace.
    pub fn insert(&self, record: T) {
        self.records.insert(record.id(), record);
    }

    /// Remove and return the record.
    pub fn archive(&self, id: &DocId) -> Option<T> {
        self.records.remove(id).map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<T: Searchable> RecordStore<T> for MemoryStore<T> {
    async fn get(&self, id: &DocId) -> StoreResult<T> {
        self.records
            .get(id)
            .map(|r| r.value().clone())
            .ok_or(StoreError::NoRows)
    }

    async fn get_with_ids(&self, ids: &[DocId], limit: usize) -> StoreResult<Vec<T>> {
        let found: Vec<T> = ids
            .iter()
            .filter_map(|id| self.records.get(id).map(|r| r.value().clone()))
            .take(limit)
            .collect();
        if found.is_empty() {
            return Err(StoreError::NoRows);
        }
        Ok(found)
    }

    async fn search_for(
        &self,
        query: &str,
        household: HouseholdId,
        limit: usize,
    ) -> StoreResult<Vec<T>> {
        let mut found: Vec<T> = self
            .records
            .iter()
            .filter(|r| r.household() == Some(household) && r.matches(query))
            .map(|r| r.value().clone())
            .collect();
        found.sort_by_key(|r| r.id());
        found.truncate(limit);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::fixtures::ingredient;
    use crate::entities::ValidIngredient;

    fn store() -> MemoryStore<ValidIngredient> {
        let s = MemoryStore::new();
        s.insert(ingredient("a", "onion", 1));
        s.insert(ingredient("b", "spring onion", 1));
        s.insert(ingredient("c", "garlic", 1));
        s.insert(ingredient("d", "onion", 2));
        s
    }

    #[tokio::test]
    async fn get_with_ids_keeps_requested_order() {
        let s = store();
        let ids = [DocId::new("c"), DocId::new("zz"), DocId::new("a")];
        let got = s.get_with_ids(&ids, 50).await.unwrap();
        let names: Vec<_> = got.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["garlic", "onion"]);
    }

    #[tokio::test]
    async fn get_with_ids_honours_limit() {
        let s = store();
        let ids = [DocId::new("a"), DocId::new("b"), DocId::new("c")];
        assert_eq!(s.get_with_ids(&ids, 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn get_with_ids_reports_no_rows() {
        let s = store();
        assert_eq!(
            s.get_with_ids(&[DocId::new("nope")], 10).await.unwrap_err(),
            StoreError::NoRows
        );
        assert_eq!(s.get_with_ids(&[], 10).await.unwrap_err(), StoreError::NoRows);
    }

    #[tokio::test]
    async fn search_for_scopes_to_household() {
        let s = store();
        let got = s.search_for("onion", 1, 10).await.unwrap();
        let ids: Vec<_> = got.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(s.search_for("onion", 1, 1).await.unwrap().len(), 1);
        assert!(s.search_for("onion", 3, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn archive_removes_record() {
        let s = store();
        assert!(s.archive(&DocId::new("a")).is_some());
        assert_eq!(s.get(&DocId::new("a")).await.unwrap_err(), StoreError::NoRows);
        assert_eq!(s.len(), 3);
    }
}
