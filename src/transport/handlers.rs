use axum::{Json, extract::Extension, http::StatusCode};
use std::sync::Arc;

use super::protocol::{
    HeartbeatRequest, RegisterRequest, RegisterResponse, StatusResponse, UnregisterRequest,
};
use crate::coordinator::service::StateStore;
use crate::coordinator::types::{Session, StoreStats};
use crate::error::StateStoreError;
use crate::subscribers::types::SubscriberId;

/// HTTP status for each failure a subscriber can act on.
fn status_for(error: &StateStoreError) -> StatusCode {
    match error {
        StateStoreError::InvalidSubscriberId
        | StateStoreError::InvalidAddress(_)
        | StateStoreError::InvalidTopicName(_) => StatusCode::BAD_REQUEST,
        StateStoreError::AlreadyRegistered(_) => StatusCode::CONFLICT,
        StateStoreError::StaleSession(_) | StateStoreError::UnknownSubscriber(_) => StatusCode::GONE,
    }
}

pub async fn handle_register(
    Extension(store): Extension<Arc<StateStore>>,
    Json(req): Json<RegisterRequest>,
) -> (StatusCode, Json<RegisterResponse>) {
    match store.register(req.subscriber_id.as_deref(), &req.address, req.topics) {
        Ok(session) => (
            StatusCode::OK,
            Json(RegisterResponse {
                success: true,
                subscriber_id: Some(session.subscriber_id.to_string()),
                registration_id: Some(session.registration_id),
                error: None,
            }),
        ),
        Err(e) => {
            tracing::warn!("Registration from {} failed: {}", req.address, e);
            (
                status_for(&e),
                Json(RegisterResponse {
                    success: false,
                    subscriber_id: None,
                    registration_id: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

pub async fn handle_unregister(
    Extension(store): Extension<Arc<StateStore>>,
    Json(req): Json<UnregisterRequest>,
) -> (StatusCode, Json<StatusResponse>) {
    match store.unregister(&req.subscriber_id) {
        Ok(_) => (StatusCode::OK, Json(StatusResponse::ok())),
        Err(e) => (status_for(&e), Json(StatusResponse::failed(e))),
    }
}

pub async fn handle_heartbeat(
    Extension(store): Extension<Arc<StateStore>>,
    Json(req): Json<HeartbeatRequest>,
) -> (StatusCode, Json<StatusResponse>) {
    let subscriber_id = match SubscriberId::parse(&req.subscriber_id) {
        Ok(id) => id,
        Err(e) => return (status_for(&e), Json(StatusResponse::failed(e))),
    };

    let session = Session {
        subscriber_id,
        registration_id: req.registration_id,
    };

    match store.heartbeat(&session, &req.updates) {
        Ok(()) => (StatusCode::OK, Json(StatusResponse::ok())),
        Err(e) => {
            tracing::warn!("Heartbeat from {} rejected: {}", session.subscriber_id, e);
            (status_for(&e), Json(StatusResponse::failed(e)))
        }
    }
}

pub async fn handle_stats(Extension(store): Extension<Arc<StateStore>>) -> (StatusCode, Json<StoreStats>) {
    (StatusCode::OK, Json(store.stats()))
}
