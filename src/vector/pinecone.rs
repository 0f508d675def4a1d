//! Pinecone REST driver (serverless indexes).
//!
//! Control-plane calls go to `controlPlaneUrl`; data-plane calls go to the
//! per-index host returned by describing the index, cached after first use.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{json, Value};

use super::config::PineconeConfig;
use super::metadata::{flatten, pinecone_filter, unflatten};
use super::{
    http_client, read_json, QueryResult, UpsertVector, OP_CREATE_INDEX, OP_DELETE,
    OP_DESCRIBE_INDEX, OP_QUERY, OP_UPSERT,
};
use crate::error::{Result, SearchError};
use crate::types::Fields;

#[derive(Debug, Clone)]
pub struct PineconeClient {
    http: reqwest::Client,
    config: PineconeConfig,
    control_plane: String,
    dimensions: usize,
    top_k: usize,
    hosts: Arc<DashMap<String, String>>,
}

impl PineconeClient {
    pub fn new(config: &PineconeConfig, dimensions: usize, top_k: usize) -> Result<Self> {
        Ok(PineconeClient {
            http: http_client(OP_CREATE_INDEX)?,
            control_plane: config.control_plane_url.trim_end_matches('/').to_string(),
            config: config.clone(),
            dimensions,
            top_k,
            hosts: Arc::new(DashMap::new()),
        })
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("Api-Key", &self.config.api_key)
            .header("X-Pinecone-API-Version", &self.config.api_version)
    }

    pub async fn create_index(&self, index: &str) -> Result<()> {
        let name = self.config.index_name(index);
        let body = json!({
            "name": name,
            "dimension": self.dimensions,
            "metric": "cosine",
            "spec": {
                "serverless": {"cloud": self.config.cloud, "region": self.config.region}
            }
        });
        let resp = self
            .request(
                reqwest::Method::POST,
                format!("{}/indexes", self.control_plane),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::backend(OP_CREATE_INDEX, e))?;
        if resp.status() == reqwest::StatusCode::CONFLICT {
            tracing::debug!(index = %name, "pinecone index already exists");
            return Ok(());
        }
        let created = read_json(resp, OP_CREATE_INDEX).await?;
        if let Some(host) = created["host"].as_str().filter(|h| !h.is_empty()) {
            self.hosts.insert(name.clone(), normalize_host(host));
        }
        tracing::info!(index = %name, dimensions = self.dimensions, "created pinecone index");
        Ok(())
    }

    /// Data-plane base URL for `index`, describing the index on first use.
    async fn host(&self, index: &str) -> Result<String> {
        let name = self.config.index_name(index);
        if let Some(host) = self.hosts.get(&name) {
            return Ok(host.clone());
        }
        let resp = self
            .request(
                reqwest::Method::GET,
                format!("{}/indexes/{}", self.control_plane, name),
            )
            .send()
            .await
            .map_err(|e| SearchError::backend(OP_DESCRIBE_INDEX, e))?;
        let described = read_json(resp, OP_DESCRIBE_INDEX).await?;
        let host = described["host"]
            .as_str()
            .filter(|h| !h.is_empty())
            .map(normalize_host)
            .ok_or_else(|| {
                SearchError::backend(OP_DESCRIBE_INDEX, format!("index {name} has no host yet"))
            })?;
        self.hosts.insert(name, host.clone());
        Ok(host)
    }

    pub async fn upsert_vector(&self, index: &str, vector: UpsertVector) -> Result<()> {
        let host = self.host(index).await?;
        let body = json!({
            "vectors": [{
                "id": vector.id,
                "values": vector.values,
                "metadata": flatten(&vector.metadata),
            }],
            "namespace": self.config.namespace,
        });
        let resp = self
            .request(reqwest::Method::POST, format!("{host}/vectors/upsert"))
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::backend(OP_UPSERT, e))?;
        read_json(resp, OP_UPSERT).await?;
        Ok(())
    }

    pub async fn query_vector(
        &self,
        index: &str,
        vector: &[f32],
        filter: &Fields,
    ) -> Result<Vec<QueryResult>> {
        let host = self.host(index).await?;
        let mut body = json!({
            "vector": vector,
            "topK": self.top_k,
            "includeValues": true,
            "includeMetadata": true,
            "namespace": self.config.namespace,
        });
        if let Some(f) = pinecone_filter(filter) {
            body["filter"] = f;
        }
        let resp = self
            .request(reqwest::Method::POST, format!("{host}/query"))
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::backend(OP_QUERY, e))?;
        let parsed = read_json(resp, OP_QUERY).await?;

        let matches = match &parsed["matches"] {
            Value::Array(m) => m.as_slice(),
            Value::Null => &[],
            _ => return Err(SearchError::backend(OP_QUERY, "matches is not an array")),
        };
        matches.iter().map(decode_match).collect()
    }

    pub async fn delete_vector(&self, index: &str, id: &str) -> Result<()> {
        let host = self.host(index).await?;
        let body = json!({
            "ids": [id],
            "namespace": self.config.namespace,
        });
        let resp = self
            .request(reqwest::Method::POST, format!("{host}/vectors/delete"))
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::backend(OP_DELETE, e))?;
        read_json(resp, OP_DELETE).await?;
        Ok(())
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

fn decode_match(m: &Value) -> Result<QueryResult> {
    let id = m["id"]
        .as_str()
        .ok_or_else(|| SearchError::Decode(format!("pinecone match without id: {m}")))?
        .to_string();
    let vectors = match &m["values"] {
        Value::Array(values) => values
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| SearchError::Decode(format!("non-numeric values for {id}")))?,
        _ => Vec::new(),
    };
    let metadata = match &m["metadata"] {
        Value::Object(flat) => unflatten(flat),
        _ => Fields::new(),
    };
    Ok(QueryResult {
        score: m["score"].as_f64().unwrap_or_default() as f32,
        id,
        vectors,
        metadata,
    })
}
