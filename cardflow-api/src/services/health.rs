//! Periodic card provider health checks

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::providers::{CardProvider, HealthReport};
use crate::services::polling::{spawn_poller, PollHandle, PollState};

/// Polls the card provider's health endpoint until dropped
pub struct HealthMonitor {
    poller: PollHandle<HealthReport>,
}

impl HealthMonitor {
    pub fn start(provider: Arc<dyn CardProvider>, interval: Duration) -> Self {
        info!(?interval, "starting provider health monitor");
        let poller = spawn_poller("provider-health", interval, move || {
            let provider = provider.clone();
            async move { provider.health_check().await }
        });
        Self { poller }
    }

    pub fn latest(&self) -> PollState<HealthReport> {
        self.poller.latest()
    }

    pub async fn first_report(&self) -> PollState<HealthReport> {
        self.poller.first_result().await
    }

    /// Healthy only when the last check succeeded and reported ok
    pub fn is_healthy(&self) -> bool {
        let state = self.latest();
        state.error.is_none() && state.value.map_or(false, |report| report.ok)
    }
}
