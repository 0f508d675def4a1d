use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

pub const DEFAULT_DIMENSIONS: usize = 384;
pub const DEFAULT_TOP_K: usize = 3;

/// The `vectors` block of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorsConfig {
    /// `qdrant` or `pinecone`. Kept as a string so an unknown value is
    /// reported by name instead of as a parse failure.
    pub provider: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub qdrant: Option<QdrantConfig>,
    #[serde(default)]
    pub pinecone: Option<PineconeConfig>,
    #[serde(default)]
    pub embedder: Option<EmbedderConfig>,
}

fn default_dimensions() -> usize {
    DEFAULT_DIMENSIONS
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

impl VectorsConfig {
    pub fn validate(&self) -> Result<()> {
        match self.provider.as_str() {
            "qdrant" => {
                let qdrant = self.qdrant.as_ref().ok_or(SearchError::NilConfig("vectors.qdrant"))?;
                if qdrant.host.trim().is_empty() {
                    return Err(SearchError::Config("vectors.qdrant.host is empty".into()));
                }
            }
            "pinecone" => {
                let pinecone = self
                    .pinecone
                    .as_ref()
                    .ok_or(SearchError::NilConfig("vectors.pinecone"))?;
                if pinecone.api_key.trim().is_empty() {
                    return Err(SearchError::Config("vectors.pinecone.apiKey is empty".into()));
                }
            }
            other => return Err(SearchError::UnknownProvider(other.to_string())),
        }
        if self.dimensions == 0 {
            return Err(SearchError::Config("vectors.dimensions must be positive".into()));
        }
        if self.top_k == 0 {
            return Err(SearchError::Config("vectors.topK must be positive".into()));
        }
        if let Some(embedder) = &self.embedder {
            if let Some(d) = embedder.dimensions {
                if d != self.dimensions {
                    return Err(SearchError::Config(format!(
                        "vectors.embedder.dimensions ({d}) differs from vectors.dimensions ({})",
                        self.dimensions
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Self-hosted Qdrant, addressed by host and port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QdrantConfig {
    pub host: String,
    #[serde(default = "default_qdrant_port")]
    pub port: u16,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub collection_prefix: String,
}

fn default_qdrant_port() -> u16 {
    6333
}

impl QdrantConfig {
    /// REST base URL. A bare host gets plain `http://`.
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.contains("://") {
            format!("{}:{}", host, self.port)
        } else {
            format!("http://{}:{}", host, self.port)
        }
    }

    pub fn collection_name(&self, index: &str) -> String {
        if self.collection_prefix.is_empty() {
            index.to_string()
        } else {
            format!("{}_{}", self.collection_prefix, index)
        }
    }
}

/// Pinecone serverless, addressed through its control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PineconeConfig {
    #[serde(default)]
    pub api_key: String,
    /// Prefix for every index created in the project.
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_cloud")]
    pub cloud: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_control_plane")]
    pub control_plane_url: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_cloud() -> String {
    "aws".into()
}

fn default_region() -> String {
    "us-east-1".into()
}

fn default_control_plane() -> String {
    "https://api.pinecone.io".into()
}

fn default_namespace() -> String {
    "default".into()
}

fn default_api_version() -> String {
    "2024-07".into()
}

impl PineconeConfig {
    /// Pinecone index names allow only lowercase letters, digits and `-`.
    pub fn index_name(&self, index: &str) -> String {
        let raw = if self.name.is_empty() {
            index.to_string()
        } else {
            format!("{}-{}", self.name, index)
        };
        raw.chars()
            .map(|c| match c {
                'a'..='z' | '0'..='9' | '-' => c,
                'A'..='Z' => c.to_ascii_lowercase(),
                _ => '-',
            })
            .collect()
    }
}

/// OpenAI-compatible embeddings endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedderConfig {
    #[serde(default = "default_embedder_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_embedder_model")]
    pub model: String,
    /// Expected vector length; defaults to `vectors.dimensions`.
    #[serde(default)]
    pub dimensions: Option<usize>,
}

fn default_embedder_url() -> String {
    "https://api.openai.com/v1/embeddings".into()
}

fn default_embedder_model() -> String {
    "text-embedding-3-small".into()
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        EmbedderConfig {
            url: default_embedder_url(),
            api_key: None,
            model: default_embedder_model(),
            dimensions: None,
        }
    }
}
