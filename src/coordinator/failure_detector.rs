//! Failure Detector
//!
//! Periodically scans the registry for subscribers whose last heartbeat is
//! older than `failure_timeout` and evicts them. Eviction re-checks the
//! deadline under the subscriber's entry lock, so a heartbeat racing with the
//! scan always wins.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::service::StateStore;
use crate::subscribers::types::SubscriberId;

pub struct FailureDetector {
    store: Arc<StateStore>,
    timeout: Duration,
    period: Duration,
}

impl FailureDetector {
    pub fn new(store: Arc<StateStore>) -> Self {
        let timeout = store.config().failure_timeout;
        let period = store.config().failure_check_period;

        Self { store, timeout, period }
    }

    /// Evicts every subscriber silent for longer than the timeout at `now`
    /// and returns their ids.
    pub fn check(&self, now: Instant) -> Vec<SubscriberId> {
        self.store
            .registry()
            .expired(now, self.timeout)
            .into_iter()
            .filter(|id| self.store.evict_if_expired(id, now, self.timeout).is_some())
            .collect()
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            "Failure detector started (timeout {:?}, period {:?})",
            self.timeout,
            self.period
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Failure detector shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let evicted = self.check(Instant::now());
                    if !evicted.is_empty() {
                        tracing::info!("Failure detector evicted {} subscriber(s)", evicted.len());
                    }
                }
            }
        }
    }
}
