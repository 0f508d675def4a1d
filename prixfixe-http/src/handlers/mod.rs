use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use prixfixe::error::ApiError;
use prixfixe::{SearchError, SearchProvider, StoreError};
use std::sync::Arc;

use crate::dto::ApiResponse;

pub mod health;
pub mod metrics;
pub mod search;

/// State shared by the service routes.
pub struct AppState {
    pub provider: SearchProvider,
    pub registry: Arc<prometheus::Registry>,
    pub start_time: std::time::Instant,
}

/// Failure of a request handler, rendered as a JSON envelope.
#[derive(Debug)]
pub enum HttpError {
    Unauthorized,
    Search(SearchError),
    Store(StoreError),
}

impl From<SearchError> for HttpError {
    fn from(e: SearchError) -> Self {
        HttpError::Search(e)
    }
}

impl From<StoreError> for HttpError {
    fn from(e: StoreError) -> Self {
        HttpError::Store(e)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            HttpError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ApiError {
                    code: "unauthorized".into(),
                    message: "no session found".into(),
                },
            ),
            HttpError::Search(e) => return e.into_response(),
            HttpError::Store(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError {
                    code: "store_error".into(),
                    message: e.to_string(),
                },
            ),
        };
        let body: ApiResponse<()> = ApiResponse {
            data: None,
            pagination: None,
            error: Some(error),
        };
        (status, Json(body)).into_response()
    }
}
