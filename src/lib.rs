//! Centralized State Store
//!
//! A coordinator that keeps a set of named, versioned key-value topics and
//! replicates them to registered subscribers. Subscribers heartbeat to stay
//! alive, may contribute entries along with each heartbeat, and receive only
//! the entries they have not yet seen.
//!
//! ## Modules
//! - **`topics`**: versioned topic storage and delta computation.
//! - **`subscribers`**: subscriber sessions, cursors and liveness bookkeeping.
//! - **`coordinator`**: the `StateStore` facade plus the failure detector and
//!   update dispatcher loops.
//! - **`transport`**: the HTTP/JSON surface, inbound and outbound.
//! - **`config`** / **`error`**: runtime options and the error taxonomy.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod subscribers;
pub mod topics;
pub mod transport;
