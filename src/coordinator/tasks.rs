//! Background task supervision.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::dispatcher::{UpdateDispatcher, UpdateSink};
use super::failure_detector::FailureDetector;
use super::service::StateStore;

/// Handles to the coordinator's periodic loops.
pub struct BackgroundTasks {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancels every loop and waits for them to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();

        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!("Background task failed during shutdown: {}", e);
            }
        }

        tracing::info!("All background tasks stopped");
    }
}

/// Starts the failure detector, the update dispatcher and the stats reporter.
pub fn spawn(store: Arc<StateStore>, sink: Arc<dyn UpdateSink>) -> BackgroundTasks {
    let cancel = CancellationToken::new();

    let failure_detector = FailureDetector::new(store.clone());
    let dispatcher = UpdateDispatcher::new(store.clone(), sink);
    let stats_interval = store.config().stats_interval;

    let handles = vec![
        tokio::spawn(failure_detector.run(cancel.child_token())),
        tokio::spawn(dispatcher.run(cancel.child_token())),
        tokio::spawn(report_stats(store, stats_interval, cancel.child_token())),
    ];

    tracing::info!("All background tasks started");

    BackgroundTasks { cancel, handles }
}

async fn report_stats(store: Arc<StateStore>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let stats = store.stats();
                tracing::info!(
                    "State store stats: {} live subscriber(s), {} topic(s), {} entries, {} tombstone(s)",
                    stats.live_subscribers,
                    stats.topics,
                    stats.entries,
                    stats.tombstones
                );
            }
        }
    }
}
