//! Binds index names to live [`SearchIndex`] handles according to the
//! `search` configuration.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

use super::text::TextIndex;
use super::SearchIndex;
use crate::config::{SearchConfig, SearchProvider};
use crate::error::{Result, SearchError};
use crate::observability::IndexMetrics;
use crate::types::IndexName;
use crate::vector::config::{EmbedderConfig, VectorsConfig};
use crate::vector::embedder::Embedder;
use crate::vector::manager::VectorIndex;
use crate::vector::provide_vector_searcher;

/// Factory for index managers. Each name is opened at most once per provider;
/// later calls return a handle to the same index. Opening one name never
/// waits on another.
pub struct IndexProvider {
    search: SearchConfig,
    vectors: Option<VectorsConfig>,
    metrics: Option<IndexMetrics>,
    opened: DashMap<IndexName, Arc<OnceCell<SearchIndex>>>,
}

impl IndexProvider {
    pub fn new(
        search: SearchConfig,
        vectors: Option<VectorsConfig>,
        metrics: Option<IndexMetrics>,
    ) -> Self {
        IndexProvider {
            search,
            vectors,
            metrics,
            opened: DashMap::new(),
        }
    }

    /// Provider whose indexes accept writes and find nothing.
    pub fn noop() -> Self {
        Self::new(SearchConfig::default(), None, None)
    }

    pub fn provider(&self) -> SearchProvider {
        self.search.provider
    }

    pub fn use_search_service(&self) -> bool {
        self.search.use_search_service
    }

    pub async fn provide(&self, name: IndexName) -> Result<SearchIndex> {
        // The map guard is dropped before any await; only the cell is held.
        let cell = Arc::clone(self.opened.entry(name.clone()).or_default().value());
        let index = cell.get_or_try_init(|| self.open(name)).await?;
        Ok(index.clone())
    }

    async fn open(&self, name: IndexName) -> Result<SearchIndex> {
        let index = match self.search.provider {
            SearchProvider::None => SearchIndex::Noop(name.clone()),
            SearchProvider::Embedded => {
                let path = self.search.index_path.join(name.as_str());
                let metrics = self.metrics.clone();
                let opened_name = name.clone();
                let text = tokio::task::spawn_blocking(move || {
                    TextIndex::open(&path, opened_name, metrics)
                })
                .await
                .map_err(|e| SearchError::backend("opening index", e))??;
                SearchIndex::Embedded(text)
            }
            SearchProvider::Vector => {
                let vectors = self.vectors.as_ref().ok_or(SearchError::NilConfig("vectors"))?;
                let searcher = provide_vector_searcher(vectors)?;
                let embedder_config = vectors.embedder.clone().unwrap_or_else(EmbedderConfig::default);
                let embedder = Embedder::new(&embedder_config, vectors.dimensions)?;
                SearchIndex::Vector(
                    VectorIndex::open(
                        name.clone(),
                        searcher,
                        Arc::new(embedder),
                        self.metrics.clone(),
                    )
                    .await?,
                )
            }
        };

        tracing::info!(index = %name, provider = self.search.provider.as_str(), "search index provided");
        Ok(index)
    }

    /// Every index handed out so far.
    pub fn opened(&self) -> Vec<SearchIndex> {
        self.opened
            .iter()
            .filter_map(|e| e.value().get().cloned())
            .collect()
    }

    /// Close every provided index once. Errors are logged and the first one is
    /// returned after all indexes have been attempted.
    pub async fn close_all(&self) -> Result<()> {
        let mut first_error = None;
        for index in self.opened() {
            if let Err(e) = index.close().await {
                tracing::error!(index = %index.name(), error = %e, "failed to close search index");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
