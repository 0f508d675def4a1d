//! Prometheus `/metrics` endpoint.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;

use super::AppState;

/// GET /metrics: the shared registry in text exposition format.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&state.registry.gather(), &mut buffer) {
        tracing::error!(error = %e, "failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use prixfixe::observability::IndexMetrics;
    use prixfixe::SearchProvider;
    use tower::ServiceExt;

    #[tokio::test]
    async fn renders_index_operation_counters() {
        let registry = prometheus::Registry::new();
        let metrics = IndexMetrics::register(&registry).unwrap();
        metrics.record("recipes", "search", true, 0.002);

        let state = Arc::new(AppState {
            provider: SearchProvider::Embedded,
            registry: Arc::new(registry),
            start_time: std::time::Instant::now(),
        });
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .with_state(state);

        let resp = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("prixfixe_search_operations_total"));
        assert!(text.contains("index=\"recipes\""));
    }
}
