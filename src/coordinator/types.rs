use serde::{Deserialize, Serialize};

use crate::subscribers::types::{RegistrationId, SubscriberId};
use crate::topics::types::TopicDelta;

/// Identifies one incarnation of a subscriber. Returned by registration and
/// presented with every heartbeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub subscriber_id: SubscriberId,
    pub registration_id: RegistrationId,
}

/// Everything a subscriber is owed in one dispatch cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriberUpdate {
    pub subscriber_id: SubscriberId,
    /// Lets the receiver drop updates addressed to a previous incarnation.
    pub registration_id: RegistrationId,
    pub topic_deltas: Vec<TopicDelta>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub live_subscribers: usize,
    pub topics: usize,
    pub entries: usize,
    pub tombstones: usize,
}

/// What happened during one dispatch cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Subscribers that had nothing new.
    pub up_to_date: usize,
    pub delivered: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl DispatchReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed + self.timed_out
    }
}
