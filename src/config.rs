use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};
use crate::vector::config::VectorsConfig;

pub const ENV_PINECONE_API_KEY: &str = "PRIXFIXE_PINECONE_API_KEY";
pub const ENV_QDRANT_API_KEY: &str = "PRIXFIXE_QDRANT_API_KEY";
pub const ENV_EMBEDDER_API_KEY: &str = "PRIXFIXE_EMBEDDER_API_KEY";

/// Which kind of index backs every entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProvider {
    /// Search switched off; handlers fall back to the primary store.
    #[default]
    None,
    Embedded,
    Vector,
}

impl SearchProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchProvider::None => "none",
            SearchProvider::Embedded => "embedded",
            SearchProvider::Vector => "vector",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchConfig {
    #[serde(default)]
    pub provider: SearchProvider,
    /// Root directory of the embedded indexes; one subdirectory per index.
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,
    /// Collect hit IDs from the subsets stored in the index rather than
    /// the bare ID list. Records are still read from the primary store.
    #[serde(default)]
    pub use_search_service: bool,
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./data/search")
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            provider: SearchProvider::None,
            index_path: default_index_path(),
            use_search_service: false,
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub vectors: Option<VectorsConfig>,
}

impl Config {
    /// Read, apply secret overrides from the environment, and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SearchError::Config(format!("reading {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_json(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| SearchError::Config(format!("parsing config: {e}")))
    }

    /// Fill absent API keys from `PRIXFIXE_*_API_KEY` variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok().filter(|v| !v.is_empty()));
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let Some(vectors) = self.vectors.as_mut() else {
            return;
        };
        if let Some(pinecone) = vectors.pinecone.as_mut() {
            if pinecone.api_key.is_empty() {
                if let Some(key) = lookup(ENV_PINECONE_API_KEY) {
                    pinecone.api_key = key;
                }
            }
        }
        if let Some(qdrant) = vectors.qdrant.as_mut() {
            if qdrant.api_key.is_none() {
                qdrant.api_key = lookup(ENV_QDRANT_API_KEY);
            }
        }
        if let Some(embedder) = vectors.embedder.as_mut() {
            if embedder.api_key.is_none() {
                embedder.api_key = lookup(ENV_EMBEDDER_API_KEY);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self.search.provider {
            SearchProvider::None => Ok(()),
            SearchProvider::Embedded => {
                if self.search.index_path.as_os_str().is_empty() {
                    return Err(SearchError::Config("search.indexPath is empty".into()));
                }
                Ok(())
            }
            SearchProvider::Vector => self
                .vectors
                .as_ref()
                .ok_or(SearchError::NilConfig("vectors"))?
                .validate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_means_search_off() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg.search.provider, SearchProvider::None);
        assert!(!cfg.search.use_search_service);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parses_camel_case_keys() {
        let cfg = Config::from_json(
            r#"{
                "search": {"provider": "embedded", "indexPath": "/var/lib/pf", "useSearchService": true},
                "vectors": {
                    "provider": "qdrant",
                    "dimensions": 768,
                    "qdrant": {"host": "qdrant", "port": 6334, "collectionPrefix": "pf"},
                    "embedder": {"url": "http://embed/v1/embeddings", "model": "nomic"}
                }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.search.provider, SearchProvider::Embedded);
        assert_eq!(cfg.search.index_path, PathBuf::from("/var/lib/pf"));
        assert!(cfg.search.use_search_service);
        let v = cfg.vectors.unwrap();
        assert_eq!(v.dimensions, 768);
        assert_eq!(v.qdrant.unwrap().collection_prefix, "pf");
        assert_eq!(v.embedder.unwrap().model, "nomic");
    }

    #[test]
    fn unknown_search_provider_is_a_parse_error() {
        assert!(matches!(
            Config::from_json(r#"{"search": {"provider": "elastic"}}"#),
            Err(SearchError::Config(_))
        ));
    }

    #[test]
    fn vector_provider_requires_vectors_block() {
        let cfg = Config::from_json(r#"{"search": {"provider": "vector"}}"#).unwrap();
        assert!(matches!(cfg.validate(), Err(SearchError::NilConfig("vectors"))));
    }

    #[test]
    fn unknown_vector_provider_is_named() {
        let cfg = Config::from_json(
            r#"{"search": {"provider": "vector"}, "vectors": {"provider": "foobar"}}"#,
        )
        .unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("unknown provider \"foobar\""));
    }

    #[test]
    fn overrides_fill_only_missing_keys() {
        let mut cfg = Config::from_json(
            r#"{
                "vectors": {
                    "provider": "pinecone",
                    "pinecone": {},
                    "qdrant": {"host": "q", "apiKey": "from-file"},
                    "embedder": {}
                }
            }"#,
        )
        .unwrap();
        let env: HashMap<&str, &str> = [
            (ENV_PINECONE_API_KEY, "pc-env"),
            (ENV_QDRANT_API_KEY, "q-env"),
            (ENV_EMBEDDER_API_KEY, "e-env"),
        ]
        .into_iter()
        .collect();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        let v = cfg.vectors.unwrap();
        assert_eq!(v.pinecone.unwrap().api_key, "pc-env");
        assert_eq!(v.qdrant.unwrap().api_key.as_deref(), Some("from-file"));
        assert_eq!(v.embedder.unwrap().api_key.as_deref(), Some("e-env"));
    }

    #[test]
    #[serial_test::serial]
    fn env_overrides_read_process_environment() {
        std::env::set_var(ENV_QDRANT_API_KEY, "q-process");
        let mut cfg = Config::from_json(
            r#"{"vectors": {"provider": "qdrant", "qdrant": {"host": "q"}}}"#,
        )
        .unwrap();
        cfg.apply_env_overrides();
        std::env::remove_var(ENV_QDRANT_API_KEY);
        assert_eq!(
            cfg.vectors.unwrap().qdrant.unwrap().api_key.as_deref(),
            Some("q-process")
        );
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"search": {"provider": "embedded"}}"#).unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.search.provider, SearchProvider::Embedded);
        assert_eq!(cfg.search.index_path, PathBuf::from("./data/search"));

        assert!(matches!(
            Config::load(&dir.path().join("missing.json")),
            Err(SearchError::Config(_))
        ));
    }
}
