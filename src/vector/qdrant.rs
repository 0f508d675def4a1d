//! Qdrant REST driver.

use serde_json::{json, Value};
use uuid::Uuid;

use super::config::QdrantConfig;
use super::metadata::qdrant_filter;
use super::{
    http_client, read_json, QueryResult, UpsertVector, OP_CREATE_INDEX, OP_DELETE, OP_QUERY,
    OP_UPSERT,
};
use crate::error::{Result, SearchError};
use crate::types::Fields;

/// Payload key holding the caller's document ID.
pub const DOC_ID_KEY: &str = "_docId";

#[derive(Debug, Clone)]
pub struct QdrantClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    config: QdrantConfig,
    dimensions: usize,
    top_k: usize,
}

/// Qdrant accepts unsigned integers and UUIDs as point IDs. Only IDs already
/// in canonical form are passed through, so two distinct IDs never share a
/// point; anything else is mapped to a stable UUIDv5.
pub fn point_id(id: &str) -> Value {
    if let Ok(n) = id.parse::<u64>() {
        if n.to_string() == id {
            return json!(n);
        }
    }
    if let Ok(uuid) = Uuid::parse_str(id) {
        if uuid.to_string() == id {
            return json!(id);
        }
    }
    json!(Uuid::new_v5(&Uuid::NAMESPACE_OID, id.as_bytes()).to_string())
}

impl QdrantClient {
    pub fn new(config: &QdrantConfig, dimensions: usize, top_k: usize) -> Result<Self> {
        Ok(QdrantClient {
            http: http_client(OP_CREATE_INDEX)?,
            base_url: config.base_url(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            config: config.clone(),
            dimensions,
            top_k,
        })
    }

    fn url(&self, collection: &str, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, collection, suffix)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    pub async fn create_index(&self, index: &str) -> Result<()> {
        let collection = self.config.collection_name(index);
        let url = self.url(&collection, "");
        let existing = self
            .request(reqwest::Method::GET, url.clone())
            .send()
            .await
            .map_err(|e| SearchError::backend(OP_CREATE_INDEX, e))?;
        match existing.status() {
            s if s.is_success() => {
                tracing::debug!(collection = %collection, "qdrant collection already exists");
                return Ok(());
            }
            reqwest::StatusCode::NOT_FOUND => {}
            _ => {
                read_json(existing, OP_CREATE_INDEX).await?;
            }
        }

        let body = json!({
            "vectors": {"size": self.dimensions, "distance": "Cosine"}
        });
        let resp = self
            .request(reqwest::Method::PUT, url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::backend(OP_CREATE_INDEX, e))?;
        if resp.status() == reqwest::StatusCode::CONFLICT {
            return Ok(());
        }
        read_json(resp, OP_CREATE_INDEX).await?;
        tracing::info!(collection = %collection, dimensions = self.dimensions, "created qdrant collection");
        Ok(())
    }

    pub async fn upsert_vector(&self, index: &str, vector: UpsertVector) -> Result<()> {
        let collection = self.config.collection_name(index);
        let mut payload = vector.metadata;
        payload.insert(DOC_ID_KEY.to_string(), json!(vector.id));
        let body = json!({
            "points": [{
                "id": point_id(&vector.id),
                "vector": vector.values,
                "payload": payload,
            }]
        });
        let resp = self
            .request(
                reqwest::Method::PUT,
                self.url(&collection, "/points?wait=true"),
            )
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
        let collection = self.config.collection_name(index);
        let mut body = json!({
            "vector": vector,
            "limit": self.top_k,
            "with_payload": true,
            "with_vector": true,
        });
        if let Some(f) = qdrant_filter(filter) {
            body["filter"] = f;
        }
        let resp = self
            .request(
                reqwest::Method::POST,
                self.url(&collection, "/points/search"),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::backend(OP_QUERY, e))?;
        let parsed = read_json(resp, OP_QUERY).await?;

        let points = parsed["result"]
            .as_array()
            .ok_or_else(|| SearchError::backend(OP_QUERY, "response has no result array"))?;
        points.iter().map(decode_point).collect()
    }

    pub async fn delete_vector(&self, index: &str, id: &str) -> Result<()> {
        let collection = self.config.collection_name(index);
        let body = json!({"points": [point_id(id)]});
        let resp = self
            .request(
                reqwest::Method::POST,
                self.url(&collection, "/points/delete?wait=true"),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::backend(OP_DELETE, e))?;
        read_json(resp, OP_DELETE).await?;
        Ok(())
    }
}

fn decode_point(point: &Value) -> Result<QueryResult> {
    let mut metadata: Fields = match &point["payload"] {
        Value::Object(map) => map.clone(),
        _ => Fields::new(),
    };
    let id = match metadata.remove(DOC_ID_KEY) {
        Some(Value::String(s)) => s,
        _ => match &point["id"] {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => {
                return Err(SearchError::Decode(format!(
                    "qdrant point without id: {point}"
                )))
            }
        },
    };
    let score = point["score"].as_f64().unwrap_or_default() as f32;
    let vectors = match &point["vector"] {
        Value::Array(values) => values
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| SearchError::Decode(format!("non-numeric vector for point {id}")))?,
        _ => Vec::new(),
    };
    Ok(QueryResult {
        id,
        vectors,
        score,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, prefix: &str, api_key: Option<&str>) -> QdrantClient {
        let uri = reqwest::Url::parse(&server.uri()).unwrap();
        let config = QdrantConfig {
            host: format!("http://{}", uri.host_str().unwrap()),
            port: uri.port().unwrap(),
            api_key: api_key.map(String::from),
            collection_prefix: prefix.into(),
        };
        QdrantClient::new(&config, 3, 3).unwrap()
    }

    #[test]
    fn point_ids() {
        assert_eq!(point_id("123"), json!(123));
        let u = "550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(point_id(u), json!(u));
        let mapped = point_id("cn1abc");
        assert_eq!(mapped, point_id("cn1abc"));
        assert!(Uuid::parse_str(mapped.as_str().unwrap()).is_ok());
    }

    #[test]
    fn non_canonical_ids_get_their_own_point() {
        assert_ne!(point_id("007"), point_id("7"));
        assert!(point_id("007").is_string());
        assert_ne!(point_id("+7"), point_id("7"));

        let upper = "550E8400-E29B-41D4-A716-446655440000";
        assert_ne!(point_id(upper), point_id(&upper.to_lowercase()));
    }

    #[tokio::test]
    async fn create_index_skips_existing_collection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/recipes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {}})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        client(&server, "", None).create_index("recipes").await.unwrap();
    }

    #[tokio::test]
    async fn create_index_creates_missing_collection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/pf_recipes"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "status": {"error": "Not found: Collection `pf_recipes` doesn't exist!"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/collections/pf_recipes"))
            .and(header("api-key", "secret"))
            .and(body_json(json!({"vectors": {"size": 3, "distance": "Cosine"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": true})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server, "pf", Some("secret"))
            .create_index("recipes")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_index_failure_names_operation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client(&server, "", None)
            .create_index("recipes")
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("creating index"), "{err}");
    }

    #[tokio::test]
    async fn upsert_keeps_original_id_in_payload() {
        let server = MockServer::start().await;
        let expected_id = point_id("cn1abc");
        Mock::given(method("PUT"))
            .and(path("/collections/recipes/points"))
            .and(query_param("wait", "true"))
            .and(body_partial_json(json!({
                "points": [{
                    "id": expected_id,
                    "payload": {"_docId": "cn1abc", "meta": {"kind": "soup"}}
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {"status": "completed"}})))
            .expect(1)
            .mount(&server)
            .await;

        let mut metadata = Fields::new();
        metadata.insert("meta".into(), json!({"kind": "soup"}));
        client(&server, "", None)
            .upsert_vector(
                "recipes",
                UpsertVector {
                    id: "cn1abc".into(),
                    values: vec![0.1, 0.2, 0.3],
                    metadata,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn query_sends_filter_and_decodes_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/recipes/points/search"))
            .and(body_partial_json(json!({
                "limit": 3,
                "with_payload": true,
                "with_vector": true,
                "filter": {"must": [{"key": "belongsToHousehold", "match": {"value": 42}}]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [
                    {"id": 7, "score": 0.93, "vector": [0.1, 0.2, 0.3],
                     "payload": {"_docId": "7", "belongsToHousehold": 42, "meta": {"kind": "soup"}}},
                    {"id": "8f14e45f-ceea-467f-a0e6-2b0b1e9e3d1b", "score": 0.5,
                     "payload": {"_docId": "cn1abc", "belongsToHousehold": 42}}
                ],
                "status": "ok"
            })))
            .mount(&server)
            .await;

        let mut filter = Fields::new();
        filter.insert("belongsToHousehold".into(), json!(42));
        let results = client(&server, "", None)
            .query_vector("recipes", &[0.1, 0.2, 0.3], &filter)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "7");
        assert_eq!(results[0].vectors, vec![0.1, 0.2, 0.3]);
        assert_eq!(results[0].metadata["meta"], json!({"kind": "soup"}));
        assert!(!results[0].metadata.contains_key(DOC_ID_KEY));
        assert_eq!(results[1].id, "cn1abc");
        assert!(results[1].vectors.is_empty());
    }

    #[tokio::test]
    async fn delete_posts_point_selector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/recipes/points/delete"))
            .and(query_param("wait", "true"))
            .and(body_json(json!({"points": [123]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {}})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server, "", None)
            .delete_vector("recipes", "123")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_failure_names_operation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "status": {"error": "Not found"}
            })))
            .mount(&server)
            .await;

        let err = client(&server, "", None)
            .delete_vector("recipes", "1")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "deleting vector: 404 Not Found: Not found");
    }
}
