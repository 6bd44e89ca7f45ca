//! Coordinator
//!
//! Ties the topic store and the subscriber registry together behind the
//! `StateStore` facade, and runs the two periodic loops that keep replicas
//! converging:
//!
//! - **Failure detector**: evicts subscribers that stop heartbeating and
//!   retracts whatever transient state they published.
//! - **Update dispatcher**: pushes each subscriber the entries it has not yet
//!   seen, advancing its cursors only on confirmed delivery.
//!
//! Both loops, plus a stats reporter, are started by [`tasks::spawn`] and stop
//! when their `CancellationToken` is cancelled.

pub mod dispatcher;
pub mod failure_detector;
pub mod service;
pub mod tasks;
pub mod types;
