use serde::Deserialize;

use super::config::EmbedderConfig;
use crate::error::{Result, SearchError};

const OPERATION: &str = "embedding text";

/// OpenAI-compatible embedder (works with OpenAI, Azure, and local proxies
/// that speak the same `/v1/embeddings` shape).
#[derive(Debug, Clone)]
pub struct Embedder {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl Embedder {
    pub fn new(config: &EmbedderConfig, dimensions: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| SearchError::backend(OPERATION, format!("building HTTP client: {e}")))?;
        Ok(Embedder {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dimensions: config.dimensions.unwrap_or(dimensions),
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed each text, preserving input order.
    pub async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "input": texts,
            "model": self.model,
        });
        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| SearchError::backend(OPERATION, e))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(String::from))
                .unwrap_or(text);
            return Err(SearchError::backend(OPERATION, format!("{status}: {message}")));
        }

        let parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| SearchError::backend(OPERATION, format!("decoding response: {e}")))?;
        if parsed.data.len() != texts.len() {
            return Err(SearchError::backend(
                OPERATION,
                format!("expected {} embeddings, got {}", texts.len(), parsed.data.len()),
            ));
        }

        let mut indexed: Vec<(usize, Vec<f32>)> = parsed
            .data
            .into_iter()
            .enumerate()
            .map(|(pos, item)| (item.index.unwrap_or(pos), item.embedding))
            .collect();
        indexed.sort_by_key(|(i, _)| *i);

        let mut vectors = Vec::with_capacity(indexed.len());
        for (_, v) in indexed {
            if v.len() != self.dimensions {
                return Err(SearchError::DimensionMismatch {
                    expected: self.dimensions,
                    got: v.len(),
                });
            }
            vectors.push(v);
        }
        Ok(vectors)
    }

    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SearchError::backend(OPERATION, "empty response from embedder"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> EmbedderConfig {
        EmbedderConfig {
            url: format!("{}/v1/embeddings", server.uri()),
            api_key: Some("sk-test".into()),
            model: "tiny".into(),
            dimensions: None,
        }
    }

    #[tokio::test]
    async fn sends_openai_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_json(json!({"input": ["garlic"], "model": "tiny"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"index": 0, "embedding": [0.1, 0.2, 0.3]}]
            })))
            .mount(&server)
            .await;

        let e = Embedder::new(&config(&server), 3).unwrap();
        let v = e.embed_one("garlic").await.unwrap();
        assert_eq!(v.len(), 3);
        assert!((v[1] - 0.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn batch_results_follow_index_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"index": 1, "embedding": [2.0, 2.0]},
                    {"index": 0, "embedding": [1.0, 1.0]}
                ]
            })))
            .mount(&server)
            .await;

        let e = Embedder::new(&config(&server), 2).unwrap();
        let vs = e.embed(&["a", "b"]).await.unwrap();
        assert_eq!(vs, vec![vec![1.0, 1.0], vec![2.0, 2.0]]);
    }

    #[tokio::test]
    async fn wrong_dimensions_are_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"index": 0, "embedding": [1.0, 2.0]}]
            })))
            .mount(&server)
            .await;

        let e = Embedder::new(&config(&server), 3).unwrap();
        assert!(matches!(
            e.embed_one("x").await,
            Err(SearchError::DimensionMismatch { expected: 3, got: 2 })
        ));
    }

    #[tokio::test]
    async fn api_error_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "invalid api key"}
            })))
            .mount(&server)
            .await;

        let e = Embedder::new(&config(&server), 3).unwrap();
        let err = e.embed_one("x").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("embedding text"), "{msg}");
        assert!(msg.contains("invalid api key"), "{msg}");
    }

    #[tokio::test]
    async fn empty_input_makes_no_request() {
        let server = MockServer::start().await;
        let e = Embedder::new(&config(&server), 3).unwrap();
        assert!(e.embed(&[]).await.unwrap().is_empty());
    }
}
