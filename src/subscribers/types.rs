use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tokio::time::Instant;

use crate::error::{Result, StateStoreError};
use crate::topics::types::Version;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub String);

impl SubscriberId {
    /// Generates an id for callers that did not bring their own.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Caller-supplied ids must be non-empty and contain no whitespace.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() || raw.chars().any(char::is_whitespace) {
            return Err(StateStoreError::InvalidSubscriberId);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one incarnation of a subscriber.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RegistrationId(pub uuid::Uuid);

impl RegistrationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RegistrationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Interest in one topic, as declared at registration.
///
/// `is_transient` marks the topic's entries as owned by their writers: when
/// a writer goes away its entries go with it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicRegistration {
    pub topic_name: String,
    #[serde(default)]
    pub is_transient: bool,
}

impl TopicRegistration {
    pub fn new(topic_name: impl Into<String>) -> Self {
        Self {
            topic_name: topic_name.into(),
            is_transient: false,
        }
    }

    pub fn transient(topic_name: impl Into<String>) -> Self {
        Self {
            topic_name: topic_name.into(),
            is_transient: true,
        }
    }
}

/// A registered subscriber.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub id: SubscriberId,
    /// Opaque locator handed to the update sink.
    pub address: String,
    pub registration_id: RegistrationId,
    /// Keyed by topic name.
    pub subscribed_topics: BTreeMap<String, TopicRegistration>,
    /// Highest version delivered per subscribed topic; 0 until the first
    /// successful delivery.
    pub last_sent_version: BTreeMap<String, Version>,
    pub last_contact_time: Instant,
    /// Set by the first confirmed delivery. Until then the subscriber is owed
    /// a snapshot of every subscribed topic, even empty ones.
    pub last_delivery_time: Option<Instant>,
}

impl Subscriber {
    pub fn new(
        id: SubscriberId,
        address: String,
        topics: Vec<TopicRegistration>,
        now: Instant,
    ) -> Self {
        let mut subscribed_topics = BTreeMap::new();
        for registration in topics {
            let is_transient = registration.is_transient;
            subscribed_topics
                .entry(registration.topic_name.clone())
                .and_modify(|existing: &mut TopicRegistration| existing.is_transient |= is_transient)
                .or_insert(registration);
        }

        let last_sent_version = subscribed_topics.keys().map(|name| (name.clone(), 0)).collect();

        Self {
            id,
            address,
            registration_id: RegistrationId::new(),
            subscribed_topics,
            last_sent_version,
            last_contact_time: now,
            last_delivery_time: None,
        }
    }

    pub fn is_subscribed(&self, topic_name: &str) -> bool {
        self.subscribed_topics.contains_key(topic_name)
    }

    pub fn cursor(&self, topic_name: &str) -> Version {
        self.last_sent_version.get(topic_name).copied().unwrap_or(0)
    }

    /// Moves a cursor forward; never backwards.
    pub fn advance_cursor(&mut self, topic_name: &str, version: Version) {
        if let Some(cursor) = self.last_sent_version.get_mut(topic_name) {
            *cursor = (*cursor).max(version);
        }
    }
}
