use serde::{Deserialize, Serialize};

use crate::error::{Result, StateStoreError};

/// Position in a topic's history. Every mutation to any entry of a topic
/// takes the next value, so versions are unique within a topic.
pub type Version = u64;

/// Well-known topic recording which subscribers are currently registered.
///
/// Keys are subscriber ids, values are their addresses. An eviction or an
/// explicit unregistration appears here as a tombstone for that key.
pub const MEMBERSHIP_TOPIC: &str = "statestore.membership";

const MAX_TOPIC_NAME_LEN: usize = 255;

/// Topic names are non-empty, bounded, and limited to a path-like alphabet.
pub fn validate_topic_name(name: &str) -> Result<()> {
    let well_formed = !name.is_empty()
        && name.len() <= MAX_TOPIC_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '/' | ':'));

    if well_formed {
        Ok(())
    } else {
        Err(StateStoreError::InvalidTopicName(name.to_string()))
    }
}

/// A single change a writer wants to make to a topic.
///
/// `value: None` deletes the key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryUpdate {
    pub key: String,
    pub value: Option<Vec<u8>>,
}

impl EntryUpdate {
    pub fn put(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }
}

/// An entry as seen by subscribers.
///
/// Deleted entries are kept as tombstones (`deleted = true`, empty value)
/// until every live subscriber of the topic has moved past their version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub version: Version,
    pub deleted: bool,
}

/// Changes to one topic between two versions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicDelta {
    pub topic_name: String,
    /// Entries ordered by ascending version.
    pub entries: Vec<TopicEntry>,
    /// The cursor this delta was computed from.
    pub from_version: Version,
    /// The topic version the receiver is at after applying the delta.
    pub to_version: Version,
    /// `false` means the entries are a full snapshot and the receiver must
    /// replace its replica instead of merging into it.
    pub is_delta: bool,
}

impl TopicDelta {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Entries a subscriber pushes into one of its topics along with a heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicContribution {
    pub topic_name: String,
    pub entries: Vec<EntryUpdate>,
}

/// Result of applying a batch of updates to a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedDelta {
    /// Topic version before the batch.
    pub previous_version: Version,
    /// Topic version after the batch; equal to `previous_version` when every
    /// update was a no-op.
    pub version: Version,
}
