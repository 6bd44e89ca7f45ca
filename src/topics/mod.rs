//! Topic Store Module
//!
//! Holds the authoritative, versioned content of every topic.
//!
//! ## Core Concepts
//! - **Versions**: each topic has its own counter; every put or delete stamps the
//!   touched entry with the next value, so a subscriber's progress through a topic
//!   is a single number (its cursor).
//! - **Tombstones**: deletes are recorded as entries so that deltas can carry them.
//!   They are compacted once all live subscribers have moved past them.
//! - **Transient topics**: entries are attributed to the subscriber that wrote them
//!   and are dropped when that subscriber goes away.

pub mod store;
pub mod types;
