//! Interval polling published through a watch channel

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::providers::ProviderError;

/// Latest outcome of a polled fetch
#[derive(Debug, Clone, PartialEq)]
pub struct PollState<T> {
    /// Last successful value; kept when a later fetch fails
    pub value: Option<T>,
    pub is_loading: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl<T> Default for PollState<T> {
    fn default() -> Self {
        Self {
            value: None,
            is_loading: false,
            last_updated: None,
            error: None,
        }
    }
}

/// Handle to a running poller. Dropping it stops the task.
pub struct PollHandle<T> {
    receiver: watch::Receiver<PollState<T>>,
    task: JoinHandle<()>,
}

impl<T: Clone> PollHandle<T> {
    pub fn latest(&self) -> PollState<T> {
        self.receiver.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState<T>> {
        self.receiver.clone()
    }

    /// Wait until a fetch has either produced a value or failed
    pub async fn first_result(&self) -> PollState<T> {
        let mut receiver = self.receiver.clone();
        loop {
            {
                let state = receiver.borrow_and_update();
                if state.last_updated.is_some() || state.error.is_some() {
                    return state.clone();
                }
            }
            if receiver.changed().await.is_err() {
                return self.latest();
            }
        }
    }
}

impl<T> PollHandle<T> {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl<T> Drop for PollHandle<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Fetch immediately and then every `interval` until the handle is dropped
pub fn spawn_poller<T, F, Fut>(name: &'static str, interval: Duration, fetch: F) -> PollHandle<T>
where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ProviderError>> + Send + 'static,
{
    let (sender, receiver) = watch::channel(PollState::default());

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            sender.send_modify(|state| state.is_loading = true);

            match fetch().await {
                Ok(value) => {
                    debug!(poller = name, "poll succeeded");
                    sender.send_modify(|state| {
                        state.value = Some(value);
                        state.error = None;
                        state.last_updated = Some(Utc::now());
                        state.is_loading = false;
                    });
                }
                Err(error) => {
                    warn!(poller = name, %error, "poll failed");
                    sender.send_modify(|state| {
                        state.error = Some(error.to_string());
                        state.is_loading = false;
                    });
                }
            }
        }
    });

    PollHandle { receiver, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn publishes_values_and_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handle = spawn_poller("test", Duration::from_millis(50), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 1 {
                    Err(ProviderError::Unavailable)
                } else {
                    Ok(n)
                }
            }
        });

        let first = handle.first_result().await;
        assert_eq!(first.value, Some(0));
        assert!(first.last_updated.is_some());

        let mut receiver = handle.subscribe();
        let failed = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let state = receiver.borrow_and_update().clone();
                if state.error.is_some() {
                    return state;
                }
                receiver.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        // The last good value survives a failed poll
        assert_eq!(failed.value, Some(0));
    }

    #[tokio::test]
    async fn dropping_handle_stops_polling() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handle = spawn_poller("test", Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });
        handle.first_result().await;
        drop(handle);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_drop = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_drop);
    }
}
