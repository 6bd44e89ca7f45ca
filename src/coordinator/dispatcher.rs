//! Update Dispatcher
//!
//! Each cycle snapshots the live subscribers, computes what every one of them
//! is missing, and delivers those updates concurrently. A subscriber's cursors
//! move only after its sink confirms delivery; a failed or timed-out delivery
//! leaves them in place, so the next cycle resends a superset. Delivery
//! failures never evict anybody: liveness is the failure detector's call.

use anyhow::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::service::StateStore;
use super::types::{DispatchReport, SubscriberUpdate};
use crate::subscribers::types::Subscriber;
use crate::topics::types::{TopicDelta, Version};

pub type DeliveryFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Transport used to push updates to subscribers.
///
/// Returning `Ok` means the subscriber has applied the update.
pub trait UpdateSink: Send + Sync {
    fn deliver<'a>(&'a self, address: &'a str, update: SubscriberUpdate) -> DeliveryFuture<'a>;
}

enum Outcome {
    Delivered,
    Failed(anyhow::Error),
    TimedOut,
}

pub struct UpdateDispatcher {
    store: Arc<StateStore>,
    sink: Arc<dyn UpdateSink>,
    delivery_timeout: Duration,
    period: Duration,
}

impl UpdateDispatcher {
    pub fn new(store: Arc<StateStore>, sink: Arc<dyn UpdateSink>) -> Self {
        let delivery_timeout = store.config().delivery_timeout;
        let period = store.config().dispatch_period;

        Self {
            store,
            sink,
            delivery_timeout,
            period,
        }
    }

    /// What `subscriber` has not seen yet, or `None` if it is up to date.
    ///
    /// Until its first confirmed delivery a subscriber is sent every topic,
    /// even empty ones, so it learns the starting version of each.
    pub fn build_update(&self, subscriber: &Subscriber) -> Option<SubscriberUpdate> {
        let first_delivery = subscriber.last_delivery_time.is_none();

        let topic_deltas: Vec<TopicDelta> = subscriber
            .subscribed_topics
            .keys()
            .map(|topic_name| {
                let cursor = subscriber.cursor(topic_name);
                (cursor, self.store.topics().compute_delta(topic_name, cursor))
            })
            .filter(|(cursor, delta)| {
                // A snapshot replaces the replica, so even an empty one matters
                // to a subscriber that already holds entries.
                first_delivery || !delta.is_empty() || (!delta.is_delta && *cursor > 0)
            })
            .map(|(_, delta)| delta)
            .collect();

        if topic_deltas.is_empty() {
            return None;
        }

        Some(SubscriberUpdate {
            subscriber_id: subscriber.id.clone(),
            registration_id: subscriber.registration_id,
            topic_deltas,
        })
    }

    /// Runs one dispatch cycle and waits for every delivery to finish or time out.
    pub async fn dispatch_once(&self) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut deliveries = JoinSet::new();

        for subscriber in self.store.registry().list_live() {
            let Some(update) = self.build_update(&subscriber) else {
                report.up_to_date += 1;
                continue;
            };

            let store = self.store.clone();
            let sink = self.sink.clone();
            let delivery_timeout = self.delivery_timeout;

            deliveries.spawn(async move {
                let versions: Vec<(String, Version)> = update
                    .topic_deltas
                    .iter()
                    .map(|delta| (delta.topic_name.clone(), delta.to_version))
                    .collect();

                let outcome =
                    match tokio::time::timeout(delivery_timeout, sink.deliver(&subscriber.address, update)).await {
                        Ok(Ok(())) => Outcome::Delivered,
                        Ok(Err(e)) => Outcome::Failed(e),
                        Err(_) => Outcome::TimedOut,
                    };

                if let Outcome::Delivered = outcome {
                    let acked = store.registry().advance_cursors(
                        &subscriber.id,
                        subscriber.registration_id,
                        &versions,
                        Instant::now(),
                    );
                    if let Err(e) = acked {
                        tracing::debug!("Delivered update to {} but did not advance cursors: {}", subscriber.id, e);
                    }
                }

                (subscriber, outcome)
            });
        }

        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok((_, Outcome::Delivered)) => report.delivered += 1,
                Ok((subscriber, Outcome::Failed(e))) => {
                    tracing::warn!("Failed to deliver update to {} at {}: {}", subscriber.id, subscriber.address, e);
                    report.failed += 1;
                }
                Ok((subscriber, Outcome::TimedOut)) => {
                    tracing::warn!(
                        "Delivery to {} at {} timed out after {:?}",
                        subscriber.id,
                        subscriber.address,
                        self.delivery_timeout
                    );
                    report.timed_out += 1;
                }
                Err(e) => {
                    tracing::error!("Delivery task panicked: {}", e);
                    report.failed += 1;
                }
            }
        }

        self.store.compact();

        if report.attempted() > 0 {
            tracing::debug!(
                "Dispatch cycle: {} delivered, {} failed, {} timed out, {} up to date",
                report.delivered,
                report.failed,
                report.timed_out,
                report.up_to_date
            );
        }

        report
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            "Update dispatcher started (period {:?}, delivery timeout {:?})",
            self.period,
            self.delivery_timeout
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Update dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.dispatch_once().await;
                }
            }
        }
    }
}
