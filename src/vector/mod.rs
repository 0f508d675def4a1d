//! Vector-similarity backends.
//!
//! Both drivers speak plain REST through `reqwest` and expose the same four
//! operations. [`VectorSearcher`] picks one at startup from `vectors.provider`.

pub mod config;
pub mod embedder;
pub mod manager;
pub mod metadata;
pub mod pinecone;
pub mod qdrant;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};
use crate::types::Fields;
use config::VectorsConfig;
use pinecone::PineconeClient;
use qdrant::QdrantClient;

pub const OP_CREATE_INDEX: &str = "creating index";
pub const OP_DESCRIBE_INDEX: &str = "describing index";
pub const OP_UPSERT: &str = "upserting vectors";
pub const OP_QUERY: &str = "querying by vector";
pub const OP_DELETE: &str = "deleting vector";

/// One vector to insert or replace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertVector {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Fields,
}

/// A single result from a vector similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub id: String,
    pub vectors: Vec<f32>,
    pub score: f32,
    pub metadata: Fields,
}

/// Dispatch enum over the vector store drivers. Enum dispatch because async
/// fn in traits is not dyn-safe.
#[derive(Debug, Clone)]
pub enum VectorSearcher {
    Qdrant(QdrantClient),
    Pinecone(PineconeClient),
}

impl VectorSearcher {
    pub fn provider(&self) -> &'static str {
        match self {
            VectorSearcher::Qdrant(_) => "qdrant",
            VectorSearcher::Pinecone(_) => "pinecone",
        }
    }

    /// Provision `index` if it does not exist yet.
    pub async fn create_index(&self, index: &str) -> Result<()> {
        match self {
            VectorSearcher::Qdrant(c) => c.create_index(index).await,
            VectorSearcher::Pinecone(c) => c.create_index(index).await,
        }
    }

    pub async fn upsert_vector(&self, index: &str, vector: UpsertVector) -> Result<()> {
        match self {
            VectorSearcher::Qdrant(c) => c.upsert_vector(index, vector).await,
            VectorSearcher::Pinecone(c) => c.upsert_vector(index, vector).await,
        }
    }

    /// Top-K closest vectors whose metadata matches every key in `filter`.
    pub async fn query_vector(
        &self,
        index: &str,
        vector: &[f32],
        filter: &Fields,
    ) -> Result<Vec<QueryResult>> {
        match self {
            VectorSearcher::Qdrant(c) => c.query_vector(index, vector, filter).await,
            VectorSearcher::Pinecone(c) => c.query_vector(index, vector, filter).await,
        }
    }

    pub async fn delete_vector(&self, index: &str, id: &str) -> Result<()> {
        match self {
            VectorSearcher::Qdrant(c) => c.delete_vector(index, id).await,
            VectorSearcher::Pinecone(c) => c.delete_vector(index, id).await,
        }
    }
}

/// Build the driver named by `config.provider`.
pub fn provide_vector_searcher(config: &VectorsConfig) -> Result<VectorSearcher> {
    config.validate()?;
    match config.provider.as_str() {
        "qdrant" => {
            let qdrant = config.qdrant.as_ref().ok_or(SearchError::NilConfig("vectors.qdrant"))?;
            if config.pinecone.is_some() {
                tracing::warn!("both vector drivers configured; using qdrant");
            }
            Ok(VectorSearcher::Qdrant(QdrantClient::new(
                qdrant,
                config.dimensions,
                config.top_k,
            )?))
        }
        "pinecone" => {
            let pinecone = config
                .pinecone
                .as_ref()
                .ok_or(SearchError::NilConfig("vectors.pinecone"))?;
            if config.qdrant.is_some() {
                tracing::warn!("both vector drivers configured; using pinecone");
            }
            Ok(VectorSearcher::Pinecone(PineconeClient::new(
                pinecone,
                config.dimensions,
                config.top_k,
            )?))
        }
        other => Err(SearchError::UnknownProvider(other.to_string())),
    }
}

pub(crate) fn http_client(operation: &'static str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .build()
        .map_err(|e| SearchError::backend(operation, format!("building HTTP client: {e}")))
}

/// Read a JSON body, turning non-2xx statuses into a backend error tagged with
/// `operation`. An empty body reads as `null`.
pub(crate) async fn read_json(
    resp: reqwest::Response,
    operation: &'static str,
) -> Result<serde_json::Value> {
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| SearchError::backend(operation, e))?;
    if !status.is_success() {
        return Err(SearchError::backend(
            operation,
            format!("{status}: {}", error_message(&text)),
        ));
    }
    if text.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(&text)
        .map_err(|e| SearchError::backend(operation, format!("decoding response: {e}")))
}

fn error_message(body: &str) -> String {
    let Ok(v) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };
    let message = [
        &v["status"]["error"],
        &v["error"]["message"],
        &v["message"],
        &v["error"],
    ]
    .into_iter()
    .find_map(|m| m.as_str())
    .map(String::from)
    .unwrap_or_else(|| body.to_string());
    message
}
