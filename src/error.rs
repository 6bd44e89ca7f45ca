//! Error taxonomy for coordinator operations.
//!
//! None of these are fatal to the process: the worst outcome of any of them is
//! a single subscriber seeing stale data until it re-registers or is evicted.

use thiserror::Error;

use crate::subscribers::types::SubscriberId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateStoreError {
    /// Subscriber ids must be non-empty and free of whitespace.
    #[error("invalid subscriber id")]
    InvalidSubscriberId,

    /// Addresses are `host:port` pairs the coordinator can deliver updates to.
    #[error("invalid subscriber address: {0:?}")]
    InvalidAddress(String),

    #[error("invalid topic name: {0:?}")]
    InvalidTopicName(String),

    /// The id belongs to a live session from a different process.
    /// The caller should pick another id or wait for the old session to expire.
    #[error("subscriber {0} is already registered by a live session")]
    AlreadyRegistered(SubscriberId),

    /// The registration id does not match the current session; the caller
    /// was most likely evicted and must register again.
    #[error("stale session for subscriber {0}")]
    StaleSession(SubscriberId),

    #[error("unknown subscriber {0}")]
    UnknownSubscriber(SubscriberId),
}

pub type Result<T> = std::result::Result<T, StateStoreError>;
