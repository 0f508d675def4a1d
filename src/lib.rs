//! Search and indexing core for the PrixFixe backend.
//!
//! Entity services bind to a [`SearchIndex`] per index name at startup (see
//! [`IndexProvider`]), push projections into it after every primary-store
//! mutation through an [`EntityIndexer`], and read through a [`Searcher`]
//! whose free-text queries are always pinned to the requester's household.
//!
//! ```rust,no_run
//! use prixfixe::{IndexName, IndexProvider, SearchConfig, SearchProvider};
//!
//! # async fn run() -> prixfixe::Result<()> {
//! let config = SearchConfig {
//!     provider: SearchProvider::Embedded,
//!     index_path: "./data/search".into(),
//!     use_search_service: false,
//! };
//! let provider = IndexProvider::new(config, None, None);
//! let index = provider.provide(IndexName::VALID_INGREDIENTS).await?;
//! let ids = index.searcher().search("onion", 42).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entities;
pub mod error;
pub mod events;
pub mod index;
pub mod indexing;
pub mod observability;
pub mod query;
pub mod store;
pub mod types;
pub mod vector;

pub use config::{Config, SearchConfig, SearchProvider};
pub use error::{Result, SearchError};
pub use events::{DataChangeEvent, EventPublisher};
pub use index::provider::IndexProvider;
pub use index::{SearchIndex, Searcher};
pub use indexing::{EntityIndexer, IndexRequest, Reconciler};
pub use query::rewrite::restrict_to_household;
pub use store::{RecordStore, StoreError};
pub use types::{DocId, Document, HouseholdId, IndexName};
