//! HTTP Transport
//!
//! JSON over HTTP in both directions. Subscribers call the coordinator's
//! `/register`, `/heartbeat` and `/unregister` endpoints; the coordinator
//! pushes updates to each subscriber's `/update` endpoint via [`client::HttpUpdateSink`].

pub mod client;
pub mod handlers;
pub mod protocol;

#[cfg(test)]
mod tests;

use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use std::sync::Arc;

use crate::coordinator::service::StateStore;
use handlers::{handle_heartbeat, handle_register, handle_stats, handle_unregister};
use protocol::{ENDPOINT_HEARTBEAT, ENDPOINT_REGISTER, ENDPOINT_STATS, ENDPOINT_UNREGISTER};

/// Routes served by the coordinator.
pub fn router(store: Arc<StateStore>) -> Router {
    Router::new()
        .route(ENDPOINT_REGISTER, post(handle_register))
        .route(ENDPOINT_UNREGISTER, post(handle_unregister))
        .route(ENDPOINT_HEARTBEAT, post(handle_heartbeat))
        .route(ENDPOINT_STATS, get(handle_stats))
        .layer(Extension(store))
}
