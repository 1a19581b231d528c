//! Metrics persistence.
//!
//! The wrapper hands each request's frozen metric batch to a [`MetricsSink`]
//! from a spawned task. Sinks are shared by every request and must be safe
//! for concurrent use. A failed write is logged and dropped; there are no
//! retries.

use async_trait::async_trait;
use metrics::Label;
use thiserror::Error;
use tracing::debug;

use crate::buffer::{Metric, MetricValue};

/// Why a sink could not persist a batch.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Persists one request's metrics.
#[async_trait]
pub trait MetricsSink: Send + Sync + 'static {
    async fn write(&self, metrics: &[Metric]) -> Result<(), SinkError>;
}

/// Default sink: one `DEBUG` event per request with the batch as JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

#[async_trait]
impl MetricsSink for LogSink {
    async fn write(&self, metrics: &[Metric]) -> Result<(), SinkError> {
        let batch = serde_json::to_string(metrics)?;
        debug!(metrics = %batch, "request metrics");
        Ok(())
    }
}

/// Forwards batches to the [`metrics`] facade.
///
/// Every batch increments `http_requests_total` and records `total_time`
/// into the `http_request_duration_ms` histogram. Indexed metrics become
/// labels on both. Install a recorder (e.g. the Prometheus exporter) in
/// the application to collect them.
#[derive(Clone, Copy, Debug, Default)]
pub struct RecorderSink;

pub(crate) const REQUESTS_TOTAL: &str = "http_requests_total";
pub(crate) const REQUEST_DURATION_MS: &str = "http_request_duration_ms";

#[async_trait]
impl MetricsSink for RecorderSink {
    async fn write(&self, batch: &[Metric]) -> Result<(), SinkError> {
        let labels = labels(batch);

        metrics::counter!(REQUESTS_TOTAL, labels.clone()).increment(1);

        let elapsed = batch.iter().find_map(|m| match (&*m.name, &m.value) {
            ("total_time", MetricValue::Int(ms)) => Some(*ms),
            _ => None,
        });
        if let Some(ms) = elapsed {
            metrics::histogram!(REQUEST_DURATION_MS, labels).record(ms as f64);
        }
        Ok(())
    }
}

fn labels(batch: &[Metric]) -> Vec<Label> {
    batch
        .iter()
        .filter(|m| m.index)
        .map(|m| Label::new(m.name.clone(), m.value.to_string()))
        .collect()
}
