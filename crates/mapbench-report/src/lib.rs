//! Reporting facade for run progress and results.

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use mapbench_types::{
    events::{ReportEvent, ReportPayload},
    BenchError, Result,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn publish(&self, event: ReportEvent) -> Result<()>;
    fn subscribe(&self) -> BoxStream<'static, ReportEvent>;
}

/// In-process sink backed by a broadcast channel; every event is also logged.
#[derive(Clone)]
pub struct LocalReporter {
    tx: broadcast::Sender<ReportEvent>,
}

impl LocalReporter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
}

#[async_trait]
impl ReportSink for LocalReporter {
    async fn publish(&self, event: ReportEvent) -> Result<()> {
        match &event.payload {
            ReportPayload::Log { msg } => info!("{msg}"),
            ReportPayload::Finish { success, results } => {
                let body = serde_json::to_string(results)
                    .map_err(|err| report_error(format!("failed to encode results: {err}")))?;
                if *success {
                    info!(success, "finish {body}");
                } else {
                    warn!(success, "finish {body}");
                }
            }
            ReportPayload::Lifecycle { state, details } => {
                info!(?state, "{}", details.as_deref().unwrap_or_default())
            }
        }
        // No subscribers is fine: the log line above is the record of last resort.
        let _ = self.tx.send(event);
        Ok(())
    }

    fn subscribe(&self) -> BoxStream<'static, ReportEvent> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|event| async move { event.ok() })
            .boxed()
    }
}

pub fn report_error(message: impl Into<String>) -> BenchError {
    BenchError::Report(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let reporter = LocalReporter::new(8);
        let mut events = reporter.subscribe();

        reporter
            .publish(ReportEvent::log("Testing production"))
            .await
            .expect("publish log");
        reporter
            .publish(ReportEvent::finish(true, None))
            .await
            .expect("publish finish");

        let first = events.next().await.expect("first event");
        assert!(matches!(first.payload, ReportPayload::Log { ref msg } if msg == "Testing production"));
        let second = events.next().await.expect("second event");
        assert!(matches!(
            second.payload,
            ReportPayload::Finish { success: true, .. }
        ));
    }

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let reporter = LocalReporter::new(1);
        reporter
            .publish(ReportEvent::log("nobody listening"))
            .await
            .expect("publish");
    }
}
