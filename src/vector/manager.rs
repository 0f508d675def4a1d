//! Index manager over a vector store: documents are embedded on write and
//! queries are embedded on read.

use std::sync::Arc;

use serde_json::json;

use super::embedder::Embedder;
use super::{UpsertVector, VectorSearcher};
use crate::error::{Result, SearchError};
use crate::index::mapping::{collect_strings, FieldMapping};
use crate::observability::{track, IndexMetrics};
use crate::types::{DocId, Document, Fields, HouseholdId, IndexName, SearchHit, HOUSEHOLD_FIELD};

#[derive(Debug, Clone)]
pub struct VectorIndex {
    name: IndexName,
    mapping: FieldMapping,
    searcher: VectorSearcher,
    embedder: Arc<Embedder>,
    metrics: Option<IndexMetrics>,
}

impl VectorIndex {
    /// Bind `name` to a vector store index, provisioning it if needed.
    pub async fn open(
        name: IndexName,
        searcher: VectorSearcher,
        embedder: Arc<Embedder>,
        metrics: Option<IndexMetrics>,
    ) -> Result<Self> {
        let mapping = FieldMapping::for_index(&name)?;
        searcher.create_index(name.as_str()).await?;
        tracing::info!(index = %name, provider = searcher.provider(), "[OPEN] vector index ready");
        Ok(VectorIndex {
            name,
            mapping,
            searcher,
            embedder,
            metrics,
        })
    }

    pub fn name(&self) -> &IndexName {
        &self.name
    }

    /// Text that represents `doc` in embedding space: its mapped text fields,
    /// in mapping order, joined by newlines.
    pub fn document_text(&self, doc: &Document) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if self.mapping.is_catch_all() {
            for (key, value) in &doc.fields {
                if key != HOUSEHOLD_FIELD {
                    collect_strings(value, &mut parts);
                }
            }
        } else {
            for field in self.mapping.text_fields() {
                if let Some(text) = doc.fields.get(field).and_then(|v| v.as_str()) {
                    parts.push(text);
                }
            }
        }
        parts.retain(|p| !p.trim().is_empty());
        if parts.is_empty() {
            doc.id.to_string()
        } else {
            parts.join("\n")
        }
    }

    pub async fn index(&self, doc: Document) -> Result<()> {
        track(self.metrics.as_ref(), self.name.as_str(), "index", async move {
            self.mapping.check(&doc)?;
            let values = self.embedder.embed_one(&self.document_text(&doc)).await?;
            self.searcher
                .upsert_vector(
                    self.name.as_str(),
                    UpsertVector {
                        id: doc.id.into_string(),
                        values,
                        metadata: doc.fields,
                    },
                )
                .await
        })
        .await
    }

    pub async fn delete(&self, id: &DocId) -> Result<()> {
        track(self.metrics.as_ref(), self.name.as_str(), "delete", async {
            self.searcher
                .delete_vector(self.name.as_str(), id.as_str())
                .await
        })
        .await
    }

    pub async fn search(&self, query: &str, household: HouseholdId) -> Result<Vec<SearchHit>> {
        let mut filter = Fields::new();
        filter.insert(HOUSEHOLD_FIELD.to_string(), json!(household));
        self.run(query, filter, "search").await
    }

    pub async fn search_for_admin(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.run(query, Fields::new(), "search_for_admin").await
    }

    /// Similarity is computed over the whole document; `field` is only
    /// checked against the mapping.
    pub async fn search_by_field(
        &self,
        field: &str,
        query: &str,
        household: HouseholdId,
    ) -> Result<Vec<SearchHit>> {
        if !self.mapping.is_text_field(field) {
            return Err(SearchError::InvalidQuery(format!(
                "field {field:?} is not searchable in {}",
                self.name
            )));
        }
        let mut filter = Fields::new();
        filter.insert(HOUSEHOLD_FIELD.to_string(), json!(household));
        self.run(query, filter, "search_by_field").await
    }

    async fn run(
        &self,
        query: &str,
        filter: Fields,
        operation: &'static str,
    ) -> Result<Vec<SearchHit>> {
        track(self.metrics.as_ref(), self.name.as_str(), operation, async {
            if query.trim().is_empty() {
                return Err(SearchError::EmptyQuery);
            }
            let vector = self.embedder.embed_one(query).await?;
            let results = self
                .searcher
                .query_vector(self.name.as_str(), &vector, &filter)
                .await?;
            Ok(results
                .into_iter()
                .map(|r| SearchHit {
                    id: DocId::new(r.id),
                    fields: r.metadata,
                })
                .collect())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::config::{EmbedderConfig, QdrantConfig};
    use crate::vector::qdrant::QdrantClient;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_embedder(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"index": 0, "embedding": [0.1, 0.2, 0.3]}]
            })))
            .mount(server)
            .await;
    }

    async fn open(server: &MockServer) -> VectorIndex {
        Mock::given(method("GET"))
            .and(path("/collections/valid_ingredients"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {}})))
            .mount(server)
            .await;
        mount_embedder(server).await;

        let uri = reqwest::Url::parse(&server.uri()).unwrap();
        let qdrant = QdrantClient::new(
            &QdrantConfig {
                host: format!("http://{}", uri.host_str().unwrap()),
                port: uri.port().unwrap(),
                api_key: None,
                collection_prefix: String::new(),
            },
            3,
            3,
        )
        .unwrap();
        let embedder = Embedder::new(
            &EmbedderConfig {
                url: format!("{}/v1/embeddings", server.uri()),
                ..Default::default()
            },
            3,
        )
        .unwrap();
        VectorIndex::open(
            IndexName::VALID_INGREDIENTS,
            VectorSearcher::Qdrant(qdrant),
            Arc::new(embedder),
            None,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn document_text_joins_mapped_fields() {
        let server = MockServer::start().await;
        let idx = open(&server).await;
        let doc = Document::new(1u64)
            .with("name", "onion")
            .with("pluralName", "onions")
            .with("description", "pungent bulb")
            .with(HOUSEHOLD_FIELD, 3u64);
        assert_eq!(idx.document_text(&doc), "onion\npungent bulb");
        assert_eq!(idx.document_text(&Document::new(9u64)), "9");
    }

    #[tokio::test]
    async fn index_upserts_embedding_with_fields() {
        let server = MockServer::start().await;
        let idx = open(&server).await;
        Mock::given(method("PUT"))
            .and(path("/collections/valid_ingredients/points"))
            .and(body_partial_json(json!({
                "points": [{"id": 5, "payload": {"name": "leek", "belongsToHousehold": 2, "_docId": "5"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {}})))
            .expect(1)
            .mount(&server)
            .await;

        idx.index(Document::new(5u64).with("name", "leek").with(HOUSEHOLD_FIELD, 2u64))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn search_filters_by_household() {
        let server = MockServer::start().await;
        let idx = open(&server).await;
        Mock::given(method("POST"))
            .and(path("/collections/valid_ingredients/points/search"))
            .and(body_partial_json(json!({
                "filter": {"must": [{"key": "belongsToHousehold", "match": {"value": 2}}]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [{"id": 5, "score": 0.9, "payload": {"_docId": "5", "name": "leek"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let hits = idx.search("leeks", 2).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id.as_str(), "5");
        assert_eq!(hits[0].fields["name"], json!("leek"));
    }

    #[tokio::test]
    async fn empty_query_is_rejected_before_embedding() {
        let server = MockServer::start().await;
        let idx = open(&server).await;
        assert!(matches!(idx.search("  ", 2).await, Err(SearchError::EmptyQuery)));
    }

    #[tokio::test]
    async fn unmapped_field_is_invalid() {
        let server = MockServer::start().await;
        let idx = open(&server).await;
        assert!(matches!(
            idx.search_by_field("slug", "x", 2).await,
            Err(SearchError::InvalidQuery(_))
        ));
    }
}
