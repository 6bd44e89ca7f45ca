//! Transport Tests
//!
//! Serves the coordinator router and a fake subscriber on ephemeral ports and
//! talks to them over real HTTP.

#[cfg(test)]
mod tests {
    use crate::config::StateStoreConfig;
    use crate::coordinator::dispatcher::{UpdateDispatcher, UpdateSink};
    use crate::coordinator::service::StateStore;
    use crate::coordinator::types::{StoreStats, SubscriberUpdate};
    use crate::subscribers::types::{RegistrationId, SubscriberId, TopicRegistration};
    use crate::topics::types::{EntryUpdate, TopicContribution};
    use crate::transport::client::HttpUpdateSink;
    use crate::transport::protocol::*;
    use crate::transport::router;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use parking_lot::Mutex;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn start_coordinator() -> (Arc<StateStore>, SocketAddr) {
        let store = StateStore::new(StateStoreConfig::default());
        let addr = serve(router(store.clone())).await;
        (store, addr)
    }

    /// A subscriber endpoint that records every update and answers `status`.
    async fn start_subscriber(status: StatusCode) -> (Arc<Mutex<Vec<SubscriberUpdate>>>, SocketAddr) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();

        let app = Router::new().route(
            ENDPOINT_UPDATE,
            post(move |Json(update): Json<SubscriberUpdate>| async move {
                sink.lock().push(update);
                status
            }),
        );

        (received, serve(app).await)
    }

    async fn register(
        client: &reqwest::Client,
        coordinator: SocketAddr,
        id: &str,
        address: &str,
        topics: Vec<TopicRegistration>,
    ) -> (StatusCode, RegisterResponse) {
        let response = client
            .post(format!("http://{}{}", coordinator, ENDPOINT_REGISTER))
            .json(&RegisterRequest {
                subscriber_id: Some(id.to_string()),
                address: address.to_string(),
                topics,
            })
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    async fn heartbeat(
        client: &reqwest::Client,
        coordinator: SocketAddr,
        id: &str,
        registration_id: RegistrationId,
        updates: Vec<TopicContribution>,
    ) -> StatusCode {
        client
            .post(format!("http://{}{}", coordinator, ENDPOINT_HEARTBEAT))
            .json(&HeartbeatRequest {
                subscriber_id: id.to_string(),
                registration_id,
                updates,
            })
            .send()
            .await
            .unwrap()
            .status()
    }

    // ============================================================
    // COORDINATOR ENDPOINT TESTS
    // ============================================================

    #[tokio::test]
    async fn test_register_heartbeat_unregister_over_http() {
        let (store, coordinator) = start_coordinator().await;
        let client = reqwest::Client::new();

        let (status, registered) =
            register(&client, coordinator, "s1", "127.0.0.1:9", vec![TopicRegistration::new("T")]).await;
        assert_eq!(status, StatusCode::OK);
        assert!(registered.success);
        assert_eq!(registered.subscriber_id.as_deref(), Some("s1"));
        let registration_id = registered.registration_id.unwrap();

        let status = heartbeat(
            &client,
            coordinator,
            "s1",
            registration_id,
            vec![TopicContribution {
                topic_name: "T".to_string(),
                entries: vec![EntryUpdate::put("k", "v")],
            }],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(store.topics().snapshot("T").get("k").unwrap(), b"v");

        for _ in 0..2 {
            let response = client
                .post(format!("http://{}{}", coordinator, ENDPOINT_UNREGISTER))
                .json(&UnregisterRequest {
                    subscriber_id: "s1".to_string(),
                })
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert!(store.registry().is_empty());
    }

    #[tokio::test]
    async fn test_error_status_codes() {
        let (_store, coordinator) = start_coordinator().await;
        let client = reqwest::Client::new();

        let (status, _) = register(&client, coordinator, "s1", "127.0.0.1:9", vec![]).await;
        assert_eq!(status, StatusCode::OK);

        let (status, conflict) = register(&client, coordinator, "s1", "127.0.0.2:9", vec![]).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(!conflict.success);
        assert!(conflict.error.is_some());

        let (status, _) =
            register(&client, coordinator, "s2", "127.0.0.1:10", vec![TopicRegistration::new("bad topic")]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let status = heartbeat(&client, coordinator, "s1", RegistrationId::new(), vec![]).await;
        assert_eq!(status, StatusCode::GONE);

        let status = heartbeat(&client, coordinator, "nobody", RegistrationId::new(), vec![]).await;
        assert_eq!(status, StatusCode::GONE);
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let (_store, coordinator) = start_coordinator().await;
        let client = reqwest::Client::new();
        register(&client, coordinator, "s1", "127.0.0.1:9", vec![TopicRegistration::new("T")]).await;

        let response = client
            .get(format!("http://{}{}", coordinator, ENDPOINT_STATS))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let stats: serde_json::Value = response.json().await.unwrap();
        assert_eq!(stats["live_subscribers"], 1);
        assert_eq!(stats["topics"], 2);
        assert_eq!(stats["entries"], 1);
    }

    // ============================================================
    // UPDATE DELIVERY TESTS
    // ============================================================

    #[tokio::test]
    async fn test_http_sink_delivers_update() {
        let (received, subscriber) = start_subscriber(StatusCode::OK).await;
        let sink = HttpUpdateSink::new(Duration::from_secs(2)).unwrap();
        let update = SubscriberUpdate {
            subscriber_id: SubscriberId("s1".to_string()),
            registration_id: RegistrationId::new(),
            topic_deltas: vec![],
        };

        sink.deliver(&subscriber.to_string(), update.clone()).await.unwrap();

        assert_eq!(received.lock().as_slice(), &[update]);
    }

    #[tokio::test]
    async fn test_http_sink_treats_error_status_as_failure() {
        let (_received, subscriber) = start_subscriber(StatusCode::INTERNAL_SERVER_ERROR).await;
        let sink = HttpUpdateSink::new(Duration::from_secs(2)).unwrap();
        let update = SubscriberUpdate {
            subscriber_id: SubscriberId("s1".to_string()),
            registration_id: RegistrationId::new(),
            topic_deltas: vec![],
        };

        assert!(sink.deliver(&subscriber.to_string(), update).await.is_err());
    }

    #[tokio::test]
    async fn test_contribution_reaches_subscriber_over_http() {
        let (store, coordinator) = start_coordinator().await;
        let (received, subscriber) = start_subscriber(StatusCode::OK).await;
        let client = reqwest::Client::new();

        let (_, writer) =
            register(&client, coordinator, "writer", "127.0.0.1:9", vec![TopicRegistration::new("T")]).await;
        register(&client, coordinator, "reader", &subscriber.to_string(), vec![TopicRegistration::new("T")]).await;
        heartbeat(
            &client,
            coordinator,
            "writer",
            writer.registration_id.unwrap(),
            vec![TopicContribution {
                topic_name: "T".to_string(),
                entries: vec![EntryUpdate::put("k", "v")],
            }],
        )
        .await;

        let sink = Arc::new(HttpUpdateSink::new(Duration::from_secs(2)).unwrap());
        let report = UpdateDispatcher::new(store.clone(), sink).dispatch_once().await;

        // Nothing listens for the writer, so only the reader's delivery succeeds.
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);

        let received = received.lock();
        let delta = received[0]
            .topic_deltas
            .iter()
            .find(|delta| delta.topic_name == "T")
            .unwrap();
        assert_eq!(delta.entries.len(), 1);
        assert_eq!(delta.entries[0].key, "k");
        assert_eq!(delta.entries[0].value, b"v");
        assert_eq!(
            store.stats(),
            StoreStats {
                live_subscribers: 2,
                topics: 2,
                entries: 3,
                tombstones: 0,
            }
        );
    }
}
