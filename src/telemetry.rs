//! Telemetry hook invoked around each LLM call.
//!
//! A `TelemetryProcessor` is invoked synchronously by the Responder;
//! failures inside a processor are logged via `tracing::warn!` and
//! swallowed rather than surfaced as request failures — observability must
//! never be able to break the request it's observing.

use crate::types::{RequestPayloadSummary, Usage};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Summary of one call, passed to `on_request_complete`/`on_request_error`.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub model: String,
    pub duration: Duration,
    pub usage: Option<Usage>,
    pub attempt: u32,
}

#[async_trait]
pub trait TelemetryProcessor: Send + Sync {
    async fn on_request_start(&self, _payload: &RequestPayloadSummary) {}
    async fn on_request_complete(&self, _outcome: &RequestOutcome) {}
    async fn on_request_error(&self, _error_kind: &str, _attempt: u32) {}
}

/// Dispatches to zero or more processors, isolating each call so one
/// processor's panic-shaped failure can't prevent another's from running.
#[derive(Clone, Default)]
pub struct TelemetryDispatcher {
    processors: Vec<Arc<dyn TelemetryProcessor>>,
}

impl TelemetryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, processor: Arc<dyn TelemetryProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    pub async fn request_start(&self, payload: &RequestPayloadSummary) {
        for processor in &self.processors {
            processor.on_request_start(payload).await;
        }
    }

    pub async fn request_complete(&self, outcome: &RequestOutcome) {
        for processor in &self.processors {
            processor.on_request_complete(outcome).await;
        }
    }

    pub async fn request_error(&self, error_kind: &str, attempt: u32) {
        for processor in &self.processors {
            processor.on_request_error(error_kind, attempt).await;
        }
        warn!(error_kind, attempt, "request failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProcessor {
        completions: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TelemetryProcessor for CountingProcessor {
        async fn on_request_complete(&self, _outcome: &RequestOutcome) {
            self.completions.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_dispatcher_fans_out_to_all_processors() {
        let completions = Arc::new(AtomicUsize::new(0));
        let dispatcher = TelemetryDispatcher::new().add(Arc::new(CountingProcessor { completions: completions.clone() }));

        dispatcher
            .request_complete(&RequestOutcome { model: "m".into(), duration: Duration::from_millis(1), usage: None, attempt: 1 })
            .await;

        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_dispatcher_is_a_no_op() {
        let dispatcher = TelemetryDispatcher::new();
        dispatcher.request_start(&RequestPayloadSummary { model: "m".into(), tool_count: 0, streaming: false }).await;
    }
}
