//! Subscriber Registry Module
//!
//! Tracks every process that has registered interest in topics.
//!
//! ## Core Concepts
//! - **Sessions**: each registration issues a fresh `RegistrationId`. Heartbeats and
//!   delivery acknowledgements carrying an older id belong to a dead incarnation and
//!   are rejected.
//! - **Cursors**: per subscribed topic, the highest version already delivered. The
//!   dispatcher computes deltas from these.
//! - **Liveness**: `last_contact_time` is refreshed by heartbeats and read by the
//!   failure detector.

pub mod registry;
pub mod types;

#[cfg(test)]
mod tests;
