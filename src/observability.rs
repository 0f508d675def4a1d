//! Prometheus counters and latency histograms for index operations.
//!
//! An [`IndexMetrics`] handle is registered into a caller-owned
//! [`prometheus::Registry`] and cloned into every index at construction.

use std::future::Future;
use std::time::Instant;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

use crate::error::{Result, SearchError};

const LABELS: &[&str] = &["index", "operation", "outcome"];

#[derive(Clone)]
pub struct IndexMetrics {
    operations: IntCounterVec,
    latency: HistogramVec,
}

impl std::fmt::Debug for IndexMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexMetrics").finish_non_exhaustive()
    }
}

impl IndexMetrics {
    pub fn register(registry: &Registry) -> Result<Self> {
        let operations = IntCounterVec::new(
            Opts::new(
                "prixfixe_search_operations_total",
                "Search index operations by index, operation and outcome",
            ),
            LABELS,
        )
        .map_err(metrics_error)?;
        let latency = HistogramVec::new(
            HistogramOpts::new(
                "prixfixe_search_operation_seconds",
                "Latency of search index operations",
            ),
            LABELS,
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(operations.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(latency.clone()))
            .map_err(metrics_error)?;

        Ok(IndexMetrics {
            operations,
            latency,
        })
    }

    pub fn record(&self, index: &str, operation: &str, ok: bool, seconds: f64) {
        let outcome = if ok { "ok" } else { "error" };
        let labels = [index, operation, outcome];
        self.operations.with_label_values(&labels).inc();
        self.latency.with_label_values(&labels).observe(seconds);
    }

    #[cfg(test)]
    pub(crate) fn count(&self, index: &str, operation: &str, outcome: &str) -> u64 {
        self.operations
            .with_label_values(&[index, operation, outcome])
            .get()
    }
}

fn metrics_error(e: prometheus::Error) -> SearchError {
    SearchError::Config(format!("registering metrics: {e}"))
}

/// Run one index operation, recording its outcome and logging failures with
/// the operation tag.
pub(crate) async fn track<T, F>(
    metrics: Option<&IndexMetrics>,
    index: &str,
    operation: &'static str,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let result = fut.await;
    if let Some(m) = metrics {
        m.record(
            index,
            operation,
            result.is_ok(),
            started.elapsed().as_secs_f64(),
        );
    }
    if let Err(e) = &result {
        // Caller mistakes are not backend failures.
        if e.status_code().is_server_error() {
            tracing::error!(index, operation, error = %e, "search index operation failed");
        } else {
            tracing::debug!(index, operation, error = %e, "search index operation rejected");
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, TextEncoder};

    #[test]
    fn register_twice_into_same_registry_fails() {
        let registry = Registry::new();
        IndexMetrics::register(&registry).unwrap();
        assert!(matches!(
            IndexMetrics::register(&registry),
            Err(SearchError::Config(_))
        ));
    }

    #[tokio::test]
    async fn track_counts_ok_and_error_outcomes() {
        let registry = Registry::new();
        let metrics = IndexMetrics::register(&registry).unwrap();

        let ok: Result<u32> = track(Some(&metrics), "recipes", "search", async { Ok(1) }).await;
        assert_eq!(ok.unwrap(), 1);
        let err: Result<u32> = track(Some(&metrics), "recipes", "search", async {
            Err(SearchError::backend("querying by vector", "boom"))
        })
        .await;
        assert!(err.is_err());

        assert_eq!(metrics.count("recipes", "search", "ok"), 1);
        assert_eq!(metrics.count("recipes", "search", "error"), 1);

        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buf)
            .unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("prixfixe_search_operations_total"));
        assert!(text.contains("prixfixe_search_operation_seconds"));
    }

    #[tokio::test]
    async fn track_without_metrics_passes_result_through() {
        let r: Result<&str> = track(None, "recipes", "index", async { Ok("done") }).await;
        assert_eq!(r.unwrap(), "done");
    }
}
