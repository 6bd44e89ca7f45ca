//! State Store Facade
//!
//! The single entry point for subscriber-facing operations. It owns the topic
//! store and the subscriber registry and keeps the two consistent: whenever a
//! session ends (unregistration, eviction or takeover by a new incarnation) its
//! transient entries are retracted and the membership topic records the change.
//!
//! Lock order is always registry entry first, then topic. Every change to a
//! session (registration, takeover, heartbeat, unregistration, eviction)
//! touches the topics while holding the registry's entry lock for that id, so
//! the membership topic always agrees with the registry and a new incarnation
//! can never publish entries that the cleanup of the old one would then remove.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::types::{Session, StoreStats};
use crate::config::StateStoreConfig;
use crate::error::{Result, StateStoreError};
use crate::subscribers::registry::SubscriberRegistry;
use crate::subscribers::types::{Subscriber, SubscriberId, TopicRegistration};
use crate::topics::store::TopicStore;
use crate::topics::types::{EntryUpdate, MEMBERSHIP_TOPIC, TopicContribution, validate_topic_name};

pub struct StateStore {
    config: StateStoreConfig,
    topics: TopicStore,
    registry: SubscriberRegistry,
}

impl StateStore {
    pub fn new(config: StateStoreConfig) -> Arc<Self> {
        let registry = SubscriberRegistry::new(config.stale_session_after());
        let topics = TopicStore::new();
        topics.ensure_topic(MEMBERSHIP_TOPIC);

        Arc::new(Self {
            config,
            topics,
            registry,
        })
    }

    pub fn config(&self) -> &StateStoreConfig {
        &self.config
    }

    pub fn topics(&self) -> &TopicStore {
        &self.topics
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    /// Registers a subscriber and returns its new session.
    ///
    /// Without a caller-supplied id one is generated. Every subscriber is also
    /// subscribed to the membership topic, which gains an entry `id -> address`.
    pub fn register(
        &self,
        subscriber_id: Option<&str>,
        address: &str,
        topics: Vec<TopicRegistration>,
    ) -> Result<Session> {
        let id = match subscriber_id {
            Some(raw) => SubscriberId::parse(raw)?,
            None => SubscriberId::new(),
        };
        validate_address(address)?;
        for registration in &topics {
            validate_topic_name(&registration.topic_name)?;
        }

        let topics = with_membership_topic(topics);
        let topic_count = topics.len();
        let registered = self.registry.register_with(
            id.clone(),
            address.to_string(),
            topics,
            Instant::now(),
            |previous, current| {
                if let Some(previous) = previous {
                    self.retract_session(previous);
                }
                for topic_name in current.subscribed_topics.keys() {
                    self.topics.ensure_topic(topic_name);
                }
                self.topics.apply_delta(
                    MEMBERSHIP_TOPIC,
                    &[EntryUpdate::put(current.id.as_str(), current.address.as_str())],
                    None,
                );
            },
        )?;

        tracing::info!(
            "Registered subscriber {} at {} with {} topic(s) (registration {})",
            id,
            address,
            topic_count,
            registered.registration_id
        );

        Ok(Session {
            subscriber_id: id,
            registration_id: registered.registration_id,
        })
    }

    /// Ends the subscriber's session. Returns `false` if it was not registered.
    pub fn unregister(&self, subscriber_id: &str) -> Result<bool> {
        let id = SubscriberId::parse(subscriber_id)?;

        let removed = self.registry.unregister_with(&id, |subscriber| {
            self.retract_session(subscriber);
            self.publish_departure(&subscriber.id);
        });

        match removed {
            Some(subscriber) => {
                tracing::info!("Unregistered subscriber {} at {}", subscriber.id, subscriber.address);
                Ok(true)
            }
            None => {
                tracing::debug!("Unregister for unknown subscriber {}", id);
                Ok(false)
            }
        }
    }

    /// Refreshes liveness and applies the subscriber's contributions.
    ///
    /// A heartbeat for an unknown id or a previous incarnation fails with
    /// `StaleSession` and changes nothing. Contributions to topics the
    /// subscriber did not register for are skipped.
    pub fn heartbeat(&self, session: &Session, contributions: &[TopicContribution]) -> Result<()> {
        for contribution in contributions {
            validate_topic_name(&contribution.topic_name)?;
        }

        let now = Instant::now();
        self.registry
            .record_heartbeat(&session.subscriber_id, session.registration_id, now, |subscriber| {
                for contribution in contributions {
                    self.apply_contribution(subscriber, contribution);
                }
            })
            .inspect_err(|_| {
                tracing::debug!(
                    "Rejected heartbeat from {} (registration {})",
                    session.subscriber_id,
                    session.registration_id
                );
            })
    }

    fn apply_contribution(&self, subscriber: &mut Subscriber, contribution: &TopicContribution) {
        let topic_name = contribution.topic_name.as_str();

        if topic_name == MEMBERSHIP_TOPIC {
            tracing::warn!("Subscriber {} tried to write to {}; ignored", subscriber.id, MEMBERSHIP_TOPIC);
            return;
        }
        if !subscriber.is_subscribed(topic_name) {
            tracing::warn!(
                "Subscriber {} contributed to unsubscribed topic {}; ignored",
                subscriber.id,
                topic_name
            );
            return;
        }
        if contribution.entries.is_empty() {
            return;
        }

        let applied = self
            .topics
            .apply_delta_tracked(topic_name, &contribution.entries, Some(&subscriber.id));

        // The writer already holds its own changes. If nothing else happened in
        // between, skip echoing them back.
        if subscriber.cursor(topic_name) == applied.previous_version {
            subscriber.advance_cursor(topic_name, applied.version);
        }
    }

    /// Evicts `id` if it has been silent for longer than `timeout` at `now`.
    pub fn evict_if_expired(&self, id: &SubscriberId, now: Instant, timeout: Duration) -> Option<Subscriber> {
        let evicted = self.registry.remove_if_expired(id, now, timeout, |subscriber| {
            self.retract_session(subscriber);
            self.publish_departure(&subscriber.id);
        })?;

        tracing::warn!(
            "Evicted subscriber {} at {}: no heartbeat for {:?}",
            evicted.id,
            evicted.address,
            now.saturating_duration_since(evicted.last_contact_time)
        );

        Some(evicted)
    }

    /// Tombstones the entries the session wrote to topics it declared transient.
    /// Its writes to topics it registered for without the flag persist.
    fn retract_session(&self, subscriber: &Subscriber) {
        for registration in subscriber.subscribed_topics.values().filter(|r| r.is_transient) {
            self.topics.purge_entries_from(&registration.topic_name, &subscriber.id);
        }
    }

    fn publish_departure(&self, id: &SubscriberId) {
        self.topics
            .apply_delta(MEMBERSHIP_TOPIC, &[EntryUpdate::delete(id.as_str())], None);
    }

    /// Discards tombstones that every live subscriber has already received.
    pub fn compact(&self) -> usize {
        self.topics.compact(&self.registry.cursor_horizons())
    }

    pub fn stats(&self) -> StoreStats {
        let topics = self.topics.stats();

        StoreStats {
            live_subscribers: self.registry.len(),
            topics: topics.topics,
            entries: topics.entries,
            tombstones: topics.tombstones,
        }
    }
}

/// Addresses must look like `host:port`.
fn validate_address(address: &str) -> Result<()> {
    let well_formed = match address.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty() && !host.chars().any(char::is_whitespace) && port.parse::<u16>().is_ok()
        }
        None => false,
    };

    if well_formed {
        Ok(())
    } else {
        Err(StateStoreError::InvalidAddress(address.to_string()))
    }
}

/// Adds the membership topic to a registration, never as transient.
fn with_membership_topic(topics: Vec<TopicRegistration>) -> Vec<TopicRegistration> {
    let mut topics: Vec<TopicRegistration> = topics
        .into_iter()
        .filter(|registration| registration.topic_name != MEMBERSHIP_TOPIC)
        .collect();
    topics.push(TopicRegistration::new(MEMBERSHIP_TOPIC));
    topics
}
