//! State Store Wire Protocol
//!
//! Endpoints and Data Transfer Objects exchanged between the coordinator and
//! its subscribers. Everything is JSON; entry values travel as byte arrays.

use serde::{Deserialize, Serialize};

use crate::subscribers::types::{RegistrationId, TopicRegistration};
use crate::topics::types::TopicContribution;

// --- Coordinator Endpoints ---

/// Starts a new subscriber session.
pub const ENDPOINT_REGISTER: &str = "/register";
/// Ends a session and retracts its transient entries.
pub const ENDPOINT_UNREGISTER: &str = "/unregister";
/// Liveness signal, optionally carrying topic contributions.
pub const ENDPOINT_HEARTBEAT: &str = "/heartbeat";
/// Counters for operators.
pub const ENDPOINT_STATS: &str = "/stats";

// --- Subscriber Endpoints ---

/// Served by every subscriber; receives a `SubscriberUpdate`.
pub const ENDPOINT_UPDATE: &str = "/update";

// --- Data Transfer Objects ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Omit to have the coordinator generate one.
    #[serde(default)]
    pub subscriber_id: Option<String>,
    /// `host:port` where the subscriber serves `/update`.
    pub address: String,
    #[serde(default)]
    pub topics: Vec<TopicRegistration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub subscriber_id: Option<String>,
    pub registration_id: Option<RegistrationId>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnregisterRequest {
    pub subscriber_id: String,
}

/// Sent every heartbeat interval by a registered subscriber.
///
/// A `410 Gone` reply means the session is no longer current and the
/// subscriber must register again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub subscriber_id: String,
    pub registration_id: RegistrationId,
    #[serde(default)]
    pub updates: Vec<TopicContribution>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    pub error: Option<String>,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}
