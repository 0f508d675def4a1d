//! Index managers and the read-only [`Searcher`] view over them.

pub mod mapping;
pub mod provider;
pub mod text;

use crate::entities::{subset_from_hit, SearchSubset};
use crate::error::Result;
use crate::types::{DocId, Document, HouseholdId, IndexName, SearchHit};
use crate::vector::manager::VectorIndex;
use text::TextIndex;

/// Live handle to one index. Enum dispatch because async fn in traits is not
/// dyn-safe.
#[derive(Debug, Clone)]
pub enum SearchIndex {
    Embedded(TextIndex),
    Vector(VectorIndex),
    /// Accepts every write, finds nothing, never fails.
    Noop(IndexName),
}

impl SearchIndex {
    pub fn name(&self) -> &IndexName {
        match self {
            SearchIndex::Embedded(i) => i.name(),
            SearchIndex::Vector(i) => i.name(),
            SearchIndex::Noop(name) => name,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, SearchIndex::Noop(_))
    }

    /// Insert or replace `doc` under its ID.
    pub async fn index(&self, doc: Document) -> Result<()> {
        match self {
            SearchIndex::Embedded(i) => i.index(doc).await,
            SearchIndex::Vector(i) => i.index(doc).await,
            SearchIndex::Noop(_) => Ok(()),
        }
    }

    pub async fn delete(&self, id: &DocId) -> Result<()> {
        match self {
            SearchIndex::Embedded(i) => i.delete(id).await,
            SearchIndex::Vector(i) => i.delete(id).await,
            SearchIndex::Noop(_) => Ok(()),
        }
    }

    pub async fn search_hits(&self, query: &str, household: HouseholdId) -> Result<Vec<SearchHit>> {
        match self {
            SearchIndex::Embedded(i) => i.search(query, household).await,
            SearchIndex::Vector(i) => i.search(query, household).await,
            SearchIndex::Noop(_) => Ok(Vec::new()),
        }
    }

    pub async fn search_for_admin_hits(&self, query: &str) -> Result<Vec<SearchHit>> {
        match self {
            SearchIndex::Embedded(i) => i.search_for_admin(query).await,
            SearchIndex::Vector(i) => i.search_for_admin(query).await,
            SearchIndex::Noop(_) => Ok(Vec::new()),
        }
    }

    pub async fn search_by_field_hits(
        &self,
        field: &str,
        query: &str,
        household: HouseholdId,
    ) -> Result<Vec<SearchHit>> {
        match self {
            SearchIndex::Embedded(i) => i.search_by_field(field, query, household).await,
            SearchIndex::Vector(i) => i.search_by_field(field, query, household).await,
            SearchIndex::Noop(_) => Ok(Vec::new()),
        }
    }

    /// IDs of documents matching `query` within `household`, best first.
    pub async fn search(&self, query: &str, household: HouseholdId) -> Result<Vec<DocId>> {
        Ok(ids(self.search_hits(query, household).await?))
    }

    /// Release the backing resources. Only the embedded index holds any.
    pub async fn close(&self) -> Result<()> {
        match self {
            SearchIndex::Embedded(i) => i.close().await,
            SearchIndex::Vector(_) | SearchIndex::Noop(_) => Ok(()),
        }
    }

    /// Read-only view for request handlers.
    pub fn searcher(&self) -> Searcher {
        Searcher {
            index: self.clone(),
        }
    }
}

fn ids(hits: Vec<SearchHit>) -> Vec<DocId> {
    hits.into_iter().map(|h| h.id).collect()
}

/// Search-only view over a [`SearchIndex`].
#[derive(Debug, Clone)]
pub struct Searcher {
    index: SearchIndex,
}

impl Searcher {
    pub fn index_name(&self) -> &IndexName {
        self.index.name()
    }

    /// True when search is switched off and callers should query the primary
    /// store instead.
    pub fn is_noop(&self) -> bool {
        self.index.is_noop()
    }

    pub async fn search(&self, query: &str, household: HouseholdId) -> Result<Vec<DocId>> {
        self.index.search(query, household).await
    }

    /// Search restricted to `field` when given, otherwise across all mapped
    /// fields.
    pub async fn search_by_field(
        &self,
        field: Option<&str>,
        query: &str,
        household: HouseholdId,
    ) -> Result<Vec<DocId>> {
        let hits = match field {
            Some(f) => self.index.search_by_field_hits(f, query, household).await?,
            None => self.index.search_hits(query, household).await?,
        };
        Ok(ids(hits))
    }

    /// Unrestricted search for service administrators.
    pub async fn search_for_admin(&self, query: &str) -> Result<Vec<DocId>> {
        Ok(ids(self.index.search_for_admin_hits(query).await?))
    }

    /// Typed projections rebuilt from the fields stored with each hit.
    pub async fn search_subsets<S: SearchSubset>(
        &self,
        query: &str,
        household: HouseholdId,
    ) -> Result<Vec<S>> {
        self.index
            .search_hits(query, household)
            .await?
            .iter()
            .map(subset_from_hit)
            .collect()
    }
}
