use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SearchError {
    #[error("invalid index name: {0}")]
    InvalidIndexName(String),

    #[error("empty search query provided")]
    EmptyQuery,

    #[error("invalid search query: {0}")]
    InvalidQuery(String),

    #[error("nil config provided for {0}")]
    NilConfig(&'static str),

    #[error("{operation}: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },

    #[error("decoding search hit: {0}")]
    Decode(String),

    #[error("index {0} is closed")]
    IndexClosed(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("type mismatch for field {field}: expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("unknown provider {0:?}")]
    UnknownProvider(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("tantivy error: {0}")]
    Tantivy(String),

    #[error("JSON error: {0}")]
    Json(String),
}

pub type Result<T> = std::result::Result<T, SearchError>;

impl SearchError {
    /// Wrap a backend failure with the operation it happened in.
    pub fn backend(operation: &'static str, cause: impl std::fmt::Display) -> Self {
        SearchError::Backend {
            operation,
            message: cause.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            SearchError::InvalidIndexName(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SearchError::EmptyQuery => StatusCode::BAD_REQUEST,
            SearchError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            SearchError::NilConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SearchError::Backend { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            SearchError::Decode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SearchError::IndexClosed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SearchError::InvalidDocument(_) => StatusCode::BAD_REQUEST,
            SearchError::TypeMismatch { .. } => StatusCode::BAD_REQUEST,
            SearchError::DimensionMismatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            SearchError::UnknownProvider(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SearchError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SearchError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SearchError::Tantivy(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SearchError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code used in the `error.code` field of responses.
    pub fn code(&self) -> &'static str {
        match self {
            SearchError::InvalidIndexName(_) => "invalid_index_name",
            SearchError::EmptyQuery => "empty_query",
            SearchError::InvalidQuery(_) => "invalid_query",
            SearchError::NilConfig(_) => "nil_config",
            SearchError::Backend { .. } => "search_backend_error",
            SearchError::Decode(_) => "decode_error",
            SearchError::IndexClosed(_) => "index_closed",
            SearchError::InvalidDocument(_) => "invalid_document",
            SearchError::TypeMismatch { .. } => "type_mismatch",
            SearchError::DimensionMismatch { .. } => "dimension_mismatch",
            SearchError::UnknownProvider(_) => "unknown_provider",
            SearchError::Config(_) => "config_error",
            SearchError::Io(_) => "io_error",
            SearchError::Tantivy(_) => "internal_error",
            SearchError::Json(_) => "json_error",
        }
    }
}

impl From<std::io::Error> for SearchError {
    fn from(e: std::io::Error) -> Self {
        SearchError::Io(e.to_string())
    }
}

impl From<tantivy::TantivyError> for SearchError {
    fn from(e: tantivy::TantivyError) -> Self {
        SearchError::Tantivy(e.to_string())
    }
}

impl From<tantivy::directory::error::OpenDirectoryError> for SearchError {
    fn from(e: tantivy::directory::error::OpenDirectoryError) -> Self {
        SearchError::Tantivy(e.to_string())
    }
}

impl From<tantivy::directory::error::OpenReadError> for SearchError {
    fn from(e: tantivy::directory::error::OpenReadError) -> Self {
        SearchError::Tantivy(e.to_string())
    }
}

impl From<tantivy::query::QueryParserError> for SearchError {
    fn from(e: tantivy::query::QueryParserError) -> Self {
        SearchError::InvalidQuery(e.to_string())
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(e: reqwest::Error) -> Self {
        SearchError::backend("sending request", e)
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(e: serde_json::Error) -> Self {
        SearchError::Json(e.to_string())
    }
}

/// The `error` member of the response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl From<&SearchError> for ApiError {
    fn from(e: &SearchError) -> Self {
        ApiError {
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

#[cfg(feature = "axum-support")]
use axum::response::{IntoResponse, Json, Response};

#[cfg(feature = "axum-support")]
impl IntoResponse for SearchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "data": serde_json::Value::Null,
            "error": ApiError::from(&self),
        });
        (status, Json(body)).into_response()
    }
}
