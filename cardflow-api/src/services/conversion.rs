//! Drives a crypto-to-fiat conversion with completion events from an executor

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use cardflow::conversion::{ConversionEvent, ConversionFlow, ConversionQuote, ConversionStep};

use crate::error::{Result, ServiceError};

/// Performs the work behind one conversion step
#[async_trait]
pub trait ConversionExecutor: Send + Sync {
    /// Run `step`; `Err` carries the failure reason shown to the user
    async fn execute(&self, step: &ConversionStep, quote: &ConversionQuote) -> std::result::Result<(), String>;
}

/// Executor that completes every step after a fixed delay
pub struct TimedExecutor {
    delay: Duration,
}

impl TimedExecutor {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl ConversionExecutor for TimedExecutor {
    async fn execute(&self, step: &ConversionStep, _quote: &ConversionQuote) -> std::result::Result<(), String> {
        debug!(%step, "running conversion step");
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

/// Running conversion. Dropping the handle cancels it.
pub struct ConversionHandle {
    progress: watch::Receiver<ConversionFlow>,
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<ConversionFlow>,
}

impl ConversionHandle {
    /// Flow snapshots, one per step reached
    pub fn progress(&self) -> watch::Receiver<ConversionFlow> {
        self.progress.clone()
    }

    pub fn current(&self) -> ConversionFlow {
        self.progress.borrow().clone()
    }

    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    /// Wait for the flow to reach a terminal step
    pub async fn wait(self) -> Result<ConversionFlow> {
        let ConversionHandle { task, cancel, .. } = self;
        let flow = task
            .await
            .map_err(|e| ServiceError::Internal(format!("conversion task failed: {}", e)));
        drop(cancel);
        flow
    }
}

pub struct ConversionRunner;

impl ConversionRunner {
    pub fn start(flow: ConversionFlow, executor: Arc<dyn ConversionExecutor>) -> ConversionHandle {
        let (progress_tx, progress_rx) = watch::channel(flow.clone());
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut flow = flow;
            info!(asset = %flow.quote().asset, fiat = %flow.quote().fiat, "conversion started");

            while !flow.is_finished() {
                let step = flow.step().clone();
                let event = tokio::select! {
                    biased;
                    // Fires on an explicit cancel and when the handle is dropped
                    _ = &mut cancel_rx => ConversionEvent::Cancel,
                    result = executor.execute(&step, flow.quote()) => match result {
                        Ok(()) => ConversionEvent::StepCompleted,
                        Err(reason) => ConversionEvent::StepFailed(reason),
                    },
                };

                if let Err(error) = flow.apply(event) {
                    warn!(%error, "conversion event rejected");
                    break;
                }
                progress_tx.send_replace(flow.clone());
            }

            info!(step = %flow.step(), progress = flow.progress_percent(), "conversion finished");
            flow
        });

        ConversionHandle {
            progress: progress_rx,
            cancel: Some(cancel_tx),
            task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardflow::conversion::RateTable;
    use rust_decimal::Decimal;

    struct FailAt(ConversionStep);

    #[async_trait]
    impl ConversionExecutor for FailAt {
        async fn execute(&self, step: &ConversionStep, _quote: &ConversionQuote) -> std::result::Result<(), String> {
            if *step == self.0 {
                Err("settlement rejected".to_string())
            } else {
                Ok(())
            }
        }
    }

    fn flow() -> ConversionFlow {
        ConversionFlow::new(RateTable::default().quote("BTC", Decimal::ONE, "USD").unwrap())
    }

    #[tokio::test]
    async fn completes_every_step() {
        let handle = ConversionRunner::start(flow(), Arc::new(TimedExecutor::new(Duration::from_millis(1))));
        let done = handle.wait().await.unwrap();
        assert_eq!(done.step(), &ConversionStep::Completed);
        assert_eq!(done.progress_percent(), 100);
    }

    #[tokio::test]
    async fn executor_failure_stops_the_flow() {
        let handle = ConversionRunner::start(flow(), Arc::new(FailAt(ConversionStep::Settling)));
        let done = handle.wait().await.unwrap();
        assert_eq!(done.step(), &ConversionStep::Failed("settlement rejected".to_string()));
        assert_eq!(done.progress_percent(), 75);
    }
}
