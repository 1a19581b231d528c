//! Shared test doubles: a tracer that records every span and a sink that
//! forwards batches over a channel.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracewrap::{Metric, MetricsSink, Request, SinkError, TraceSpan, Tracer};

// ── Tracer ────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordedSpan {
    pub name: String,
    pub tags: Mutex<Vec<(String, String)>>,
    pub finished: AtomicUsize,
}

impl RecordedSpan {
    pub fn tag(&self, key: &str) -> Option<String> {
        self.tags
            .lock()
            .expect("tags lock")
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn finish_count(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

impl TraceSpan for RecordedSpan {
    fn set_tag(&self, key: &str, value: &str) {
        self.tags
            .lock()
            .expect("tags lock")
            .push((key.to_owned(), value.to_owned()));
    }

    fn finish(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

/// Keeps every span it ever opened.
#[derive(Clone, Default)]
pub struct RecordingTracer {
    spans: Arc<Mutex<Vec<Arc<RecordedSpan>>>>,
}

impl RecordingTracer {
    pub fn spans(&self) -> Vec<Arc<RecordedSpan>> {
        self.spans.lock().expect("spans lock").clone()
    }

    pub fn only_span(&self) -> Arc<RecordedSpan> {
        let spans = self.spans();
        assert_eq!(spans.len(), 1, "expected exactly one span");
        Arc::clone(&spans[0])
    }
}

impl Tracer for RecordingTracer {
    fn start_span(&self, name: &str) -> Arc<dyn TraceSpan> {
        let span = Arc::new(RecordedSpan { name: name.to_owned(), ..Default::default() });
        self.spans.lock().expect("spans lock").push(Arc::clone(&span));
        span
    }
}

// ── Sink ──────────────────────────────────────────────────────────────────────

/// Sends every batch to the test; optionally fails the write afterwards.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Vec<Metric>>,
    fail: bool,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Vec<Metric>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, fail: false }, rx)
    }

    pub fn failing() -> (Self, mpsc::UnboundedReceiver<Vec<Metric>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, fail: true }, rx)
    }
}

#[async_trait]
impl MetricsSink for ChannelSink {
    async fn write(&self, metrics: &[Metric]) -> Result<(), SinkError> {
        let _ = self.tx.send(metrics.to_vec());
        if self.fail {
            return Err(SinkError::Unavailable("influx is down".to_owned()));
        }
        Ok(())
    }
}

/// Waits for the next flushed batch.
pub async fn next_batch(rx: &mut mpsc::UnboundedReceiver<Vec<Metric>>) -> Vec<Metric> {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("metrics flush timed out")
        .expect("sink channel closed")
}

pub fn names(batch: &[Metric]) -> Vec<&str> {
    batch.iter().map(|m| m.name.as_str()).collect()
}

pub fn find<'a>(batch: &'a [Metric], name: &str) -> Option<&'a Metric> {
    batch.iter().find(|m| m.name == name)
}

// ── Requests ──────────────────────────────────────────────────────────────────

pub fn remote() -> SocketAddr {
    "203.0.113.7:40123".parse().expect("valid socket address")
}

pub fn request(method: &str, uri: &str, body: &'static str) -> Request {
    let req = http::Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", "secret123")
        .header("accept", "application/json")
        .body(Bytes::from_static(body.as_bytes()))
        .expect("request builder should succeed");
    Request::from_http(req, remote())
}
