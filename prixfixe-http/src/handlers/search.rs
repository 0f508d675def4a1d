use std::marker::PhantomData;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::{Extension, Router};
use prixfixe::entities::{SearchSubset, Searchable};
use prixfixe::{DocId, RecordStore, SearchError, Searcher, StoreError};
use serde::Serialize;

use super::HttpError;
use crate::dto::{ApiResponse, Pagination, SearchParams};
use crate::fusion::fuse;
use crate::session::SessionContext;

/// Everything the search route of one entity needs.
pub struct EntityState<T, S> {
    pub searcher: Searcher,
    pub store: S,
    /// Take hit IDs from the subsets stored in the index.
    pub use_search_service: bool,
    _record: PhantomData<fn() -> T>,
}

impl<T, S: Clone> Clone for EntityState<T, S> {
    fn clone(&self) -> Self {
        EntityState {
            searcher: self.searcher.clone(),
            store: self.store.clone(),
            use_search_service: self.use_search_service,
            _record: PhantomData,
        }
    }
}

impl<T: Searchable, S: RecordStore<T>> EntityState<T, S> {
    pub fn new(searcher: Searcher, store: S, use_search_service: bool) -> Self {
        EntityState {
            searcher,
            store,
            use_search_service,
            _record: PhantomData,
        }
    }
}

/// `GET /api/v1/<index>/search` for `T`.
pub fn entity_routes<T: Searchable, S: RecordStore<T>>(state: EntityState<T, S>) -> Router {
    Router::new()
        .route(&format!("/api/v1/{}/search", T::INDEX), get(search::<T, S>))
        .with_state(state)
}

pub async fn search<T: Searchable, S: RecordStore<T>>(
    State(state): State<EntityState<T, S>>,
    session: Option<Extension<SessionContext>>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Response, HttpError> {
    let Some(Extension(session)) = session else {
        return Err(HttpError::Unauthorized);
    };
    let Query(params) = params.map_err(|rejection| {
        log_failure::<T>(
            "parsing parameters",
            SearchError::InvalidQuery(rejection.body_text()),
        )
    })?;
    let query = params.q.trim();
    if query.is_empty() {
        return Err(SearchError::EmptyQuery.into());
    }
    let limit = params.limit();
    let household = session.household_id;

    if params.use_db || state.searcher.is_noop() {
        let records = no_rows_as_empty(state.store.search_for(query, household, limit).await)
            .map_err(|e| log_failure::<T>("searching store", e))?;
        return Ok(page(records, limit));
    }

    let ids: Vec<DocId> = if state.use_search_service {
        state
            .searcher
            .search_subsets::<T::Subset>(query, household)
            .await
            .map_err(|e| log_failure::<T>("searching index", e))?
            .iter()
            .map(SearchSubset::id)
            .collect()
    } else {
        state
            .searcher
            .search(query, household)
            .await
            .map_err(|e| log_failure::<T>("searching index", e))?
    };
    if ids.is_empty() {
        return Ok(page(Vec::<T>::new(), limit));
    }
    let records = no_rows_as_empty(state.store.get_with_ids(&ids, limit).await)
        .map_err(|e| log_failure::<T>("fetching records", e))?;
    Ok(page(fuse(&ids, records), limit))
}

fn no_rows_as_empty<T>(result: Result<Vec<T>, StoreError>) -> Result<Vec<T>, StoreError> {
    match result {
        Err(StoreError::NoRows) => Ok(Vec::new()),
        other => other,
    }
}

fn log_failure<T: Searchable>(operation: &'static str, e: impl Into<HttpError>) -> HttpError {
    let e = e.into();
    match &e {
        HttpError::Search(err) if err.status_code().is_client_error() => {
            tracing::debug!(index = %T::INDEX, operation, error = %err, "search rejected");
        }
        HttpError::Search(err) => {
            tracing::error!(index = %T::INDEX, operation, error = %err, "search failed");
        }
        HttpError::Store(err) => {
            tracing::error!(index = %T::INDEX, operation, error = %err, "search failed");
        }
        HttpError::Unauthorized => {}
    }
    e
}

fn page<D: Serialize>(items: Vec<D>, limit: usize) -> Response {
    let total_count = items.len();
    Json(ApiResponse::ok(items).with_pagination(Pagination {
        page: 1,
        limit,
        total_count,
    }))
    .into_response()
}
