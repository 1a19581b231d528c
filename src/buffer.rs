//! Per-request metric buffer.
//!
//! Every request gets one [`MetricBuffer`]. Handlers append to it through
//! their [`Context`](crate::Context); the wrapper appends the timing and
//! request metadata at the end and hands the whole batch to a
//! [`MetricsSink`](crate::MetricsSink) exactly once.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

/// A metric value. The store decides how to encode it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    Str(String),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(n: i64) -> Self { Self::Int(n) }
}

impl From<String> for MetricValue {
    fn from(s: String) -> Self { Self::Str(s) }
}

impl From<&str> for MetricValue {
    fn from(s: &str) -> Self { Self::Str(s.to_owned()) }
}

/// One named measurement.
///
/// `index` marks the metric as a dimension the store should index for
/// queries (a tag in InfluxDB terms, a label in Prometheus terms).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Metric {
    pub name: String,
    pub value: MetricValue,
    pub index: bool,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        Self { name: name.into(), value: value.into(), index: false }
    }

    pub fn indexed(name: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        Self { name: name.into(), value: value.into(), index: true }
    }
}

#[derive(Default)]
struct Inner {
    metrics: Vec<Metric>,
    frozen: bool,
}

/// Append-only, request-scoped metric accumulator.
///
/// Cloning yields another handle to the same buffer. Once the buffer is
/// taken for flushing it is frozen: further appends are dropped.
#[derive(Clone, Default)]
pub struct MetricBuffer {
    inner: Arc<Mutex<Inner>>,
}

impl MetricBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one metric.
    pub fn add(&self, metric: Metric) {
        self.extend([metric]);
    }

    /// Append several metrics, preserving their order.
    pub fn extend(&self, metrics: impl IntoIterator<Item = Metric>) {
        let mut inner = self.lock();
        if inner.frozen {
            tracing::debug!("metric buffer already flushed, dropping late metrics");
            return;
        }
        inner.metrics.extend(metrics);
    }

    /// A copy of everything recorded so far.
    pub fn snapshot(&self) -> Vec<Metric> {
        self.lock().metrics.clone()
    }

    /// Freeze the buffer and move its contents out.
    pub(crate) fn take(&self) -> Vec<Metric> {
        let mut inner = self.lock();
        inner.frozen = true;
        std::mem::take(&mut inner.metrics)
    }

    // A panicking handler cannot leave the Vec half-written, so a poisoned
    // lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for MetricBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.lock().metrics.iter()).finish()
    }
}
