//! Subscriber Registry Tests
//!
//! ## Test Scopes
//! - **Identity**: id validation and registration id freshness.
//! - **Sessions**: conflict detection, stale-session takeover, heartbeat rejection.
//! - **Cursors**: forward-only advancement guarded by the registration id.
//! - **Liveness**: expiry scans and the atomic remove-if-expired check.

#[cfg(test)]
mod tests {
    use crate::error::StateStoreError;
    use crate::subscribers::registry::SubscriberRegistry;
    use crate::subscribers::types::{RegistrationId, Subscriber, SubscriberId, TopicRegistration};
    use std::time::Duration;
    use tokio::time::Instant;

    const STALE_AFTER: Duration = Duration::from_secs(2);

    fn sid(id: &str) -> SubscriberId {
        SubscriberId(id.to_string())
    }

    fn topics(names: &[&str]) -> Vec<TopicRegistration> {
        names.iter().map(|name| TopicRegistration::new(*name)).collect()
    }

    // ============================================================
    // IDENTITY TESTS
    // ============================================================

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(SubscriberId::new(), SubscriberId::new());
        assert_ne!(RegistrationId::new(), RegistrationId::new());
    }

    #[test]
    fn test_subscriber_id_validation() {
        assert_eq!(SubscriberId::parse("impalad-1").unwrap(), sid("impalad-1"));
        assert_eq!(SubscriberId::parse(""), Err(StateStoreError::InvalidSubscriberId));
        assert_eq!(SubscriberId::parse("a b"), Err(StateStoreError::InvalidSubscriberId));
    }

    #[test]
    fn test_duplicate_topic_registrations_merge() {
        let subscriber = Subscriber::new(
            sid("s1"),
            "host:1".to_string(),
            vec![TopicRegistration::new("T"), TopicRegistration::transient("T")],
            Instant::now(),
        );

        assert_eq!(subscriber.subscribed_topics.len(), 1);
        assert!(subscriber.subscribed_topics["T"].is_transient);
        assert_eq!(subscriber.cursor("T"), 0);
    }

    // ============================================================
    // SESSION TESTS
    // ============================================================

    #[test]
    fn test_register_creates_fresh_session() {
        let registry = SubscriberRegistry::new(STALE_AFTER);
        let now = Instant::now();

        let registered = registry
            .register(sid("s1"), "host:1".to_string(), topics(&["A", "B"]), now)
            .unwrap();

        assert!(registered.previous.is_none());
        let subscriber = registry.get(&sid("s1")).unwrap();
        assert_eq!(subscriber.registration_id, registered.registration_id);
        assert_eq!(subscriber.last_contact_time, now);
        assert_eq!(subscriber.cursor("A"), 0);
        assert_eq!(subscriber.cursor("B"), 0);
    }

    #[test]
    fn test_register_conflicts_with_live_session() {
        let registry = SubscriberRegistry::new(STALE_AFTER);
        let now = Instant::now();
        registry.register(sid("s1"), "host:1".to_string(), topics(&["T"]), now).unwrap();

        let result = registry.register(sid("s1"), "host:2".to_string(), topics(&["T"]), now);

        assert_eq!(result.unwrap_err(), StateStoreError::AlreadyRegistered(sid("s1")));
        assert_eq!(registry.get(&sid("s1")).unwrap().address, "host:1");
    }

    #[test]
    fn test_same_address_reregistration_starts_new_incarnation() {
        let registry = SubscriberRegistry::new(STALE_AFTER);
        let now = Instant::now();
        let first = registry.register(sid("s1"), "host:1".to_string(), topics(&["T"]), now).unwrap();
        registry
            .advance_cursors(&sid("s1"), first.registration_id, &[("T".to_string(), 5)], Instant::now())
            .unwrap();

        let second = registry.register(sid("s1"), "host:1".to_string(), topics(&["T"]), now).unwrap();

        assert_ne!(first.registration_id, second.registration_id);
        assert_eq!(second.previous.unwrap().registration_id, first.registration_id);
        assert_eq!(registry.get(&sid("s1")).unwrap().cursor("T"), 0, "previous progress is discarded");
    }

    #[test]
    fn test_silent_session_can_be_taken_over() {
        let registry = SubscriberRegistry::new(STALE_AFTER);
        let start = Instant::now();
        registry.register(sid("s1"), "host:1".to_string(), topics(&["T"]), start).unwrap();

        let later = start + STALE_AFTER + Duration::from_millis(1);
        let registered = registry.register(sid("s1"), "host:2".to_string(), topics(&["T"]), later);

        assert!(registered.is_ok());
        assert_eq!(registry.get(&sid("s1")).unwrap().address, "host:2");
    }

    #[test]
    fn test_register_with_sees_previous_and_new_session() {
        let registry = SubscriberRegistry::new(STALE_AFTER);
        let now = Instant::now();
        let mut seen = Vec::new();

        let first = registry
            .register_with(sid("s1"), "host:1".to_string(), topics(&["T"]), now, |previous, current| {
                seen.push((previous.map(|p| p.registration_id), current.registration_id));
            })
            .unwrap();
        let second = registry
            .register_with(sid("s1"), "host:1".to_string(), topics(&["T"]), now, |previous, current| {
                seen.push((previous.map(|p| p.registration_id), current.registration_id));
            })
            .unwrap();

        assert_eq!(
            seen,
            vec![
                (None, first.registration_id),
                (Some(first.registration_id), second.registration_id),
            ]
        );
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = SubscriberRegistry::new(STALE_AFTER);
        registry
            .register(sid("s1"), "host:1".to_string(), topics(&["T"]), Instant::now())
            .unwrap();

        assert!(registry.unregister(&sid("s1")).is_some());
        assert!(registry.unregister(&sid("s1")).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_heartbeat_with_current_registration_refreshes_contact() {
        let registry = SubscriberRegistry::new(STALE_AFTER);
        let start = Instant::now();
        let registered = registry.register(sid("s1"), "host:1".to_string(), topics(&["T"]), start).unwrap();

        let later = start + Duration::from_secs(1);
        registry
            .record_heartbeat(&sid("s1"), registered.registration_id, later, |_| {})
            .unwrap();

        assert_eq!(registry.get(&sid("s1")).unwrap().last_contact_time, later);
    }

    #[test]
    fn test_heartbeat_with_stale_registration_is_rejected_without_mutation() {
        let registry = SubscriberRegistry::new(STALE_AFTER);
        let start = Instant::now();
        registry.register(sid("s1"), "host:1".to_string(), topics(&["T"]), start).unwrap();

        let result = registry.record_heartbeat(&sid("s1"), RegistrationId::new(), start + Duration::from_secs(1), |_| {});

        assert_eq!(result, Err(StateStoreError::StaleSession(sid("s1"))));
        assert_eq!(registry.get(&sid("s1")).unwrap().last_contact_time, start);
    }

    #[test]
    fn test_heartbeat_from_unknown_subscriber_is_stale() {
        let registry = SubscriberRegistry::new(STALE_AFTER);

        let result = registry.record_heartbeat(&sid("ghost"), RegistrationId::new(), Instant::now(), |_| {});

        assert_eq!(result, Err(StateStoreError::StaleSession(sid("ghost"))));
    }

    // ============================================================
    // CURSOR TESTS
    // ============================================================

    #[test]
    fn test_cursors_only_move_forward() {
        let registry = SubscriberRegistry::new(STALE_AFTER);
        let registered = registry
            .register(sid("s1"), "host:1".to_string(), topics(&["T"]), Instant::now())
            .unwrap();

        registry
            .advance_cursors(&sid("s1"), registered.registration_id, &[("T".to_string(), 7)], Instant::now())
            .unwrap();
        registry
            .advance_cursors(&sid("s1"), registered.registration_id, &[("T".to_string(), 3)], Instant::now())
            .unwrap();

        assert_eq!(registry.get(&sid("s1")).unwrap().cursor("T"), 7);
    }

    #[test]
    fn test_cursor_update_for_old_incarnation_is_rejected() {
        let registry = SubscriberRegistry::new(STALE_AFTER);
        let now = Instant::now();
        let old = registry.register(sid("s1"), "host:1".to_string(), topics(&["T"]), now).unwrap();
        registry.register(sid("s1"), "host:1".to_string(), topics(&["T"]), now).unwrap();

        let result = registry.advance_cursors(&sid("s1"), old.registration_id, &[("T".to_string(), 9)], Instant::now());

        assert_eq!(result, Err(StateStoreError::StaleSession(sid("s1"))));
        assert_eq!(registry.get(&sid("s1")).unwrap().cursor("T"), 0);
    }

    #[test]
    fn test_cursor_update_ignores_unsubscribed_topics() {
        let registry = SubscriberRegistry::new(STALE_AFTER);
        let registered = registry
            .register(sid("s1"), "host:1".to_string(), topics(&["T"]), Instant::now())
            .unwrap();

        registry
            .advance_cursors(&sid("s1"), registered.registration_id, &[("other".to_string(), 4)], Instant::now())
            .unwrap();

        assert!(!registry.get(&sid("s1")).unwrap().last_sent_version.contains_key("other"));
    }

    #[test]
    fn test_cursor_horizons_take_minimum() {
        let registry = SubscriberRegistry::new(STALE_AFTER);
        let now = Instant::now();
        let s1 = registry.register(sid("s1"), "host:1".to_string(), topics(&["A", "B"]), now).unwrap();
        let s2 = registry.register(sid("s2"), "host:2".to_string(), topics(&["A"]), now).unwrap();

        registry
            .advance_cursors(&sid("s1"), s1.registration_id, &[("A".to_string(), 10), ("B".to_string(), 4)], Instant::now())
            .unwrap();
        registry
            .advance_cursors(&sid("s2"), s2.registration_id, &[("A".to_string(), 6)], Instant::now())
            .unwrap();

        let horizons = registry.cursor_horizons();
        assert_eq!(horizons["A"], 6);
        assert_eq!(horizons["B"], 4);
        assert!(!horizons.contains_key("C"));
    }

    // ============================================================
    // LIVENESS TESTS
    // ============================================================

    #[test]
    fn test_expired_uses_strict_timeout() {
        let registry = SubscriberRegistry::new(STALE_AFTER);
        let start = Instant::now();
        let timeout = Duration::from_secs(5);
        registry.register(sid("s1"), "host:1".to_string(), topics(&["T"]), start).unwrap();

        assert!(registry.expired(start + timeout, timeout).is_empty());
        assert_eq!(
            registry.expired(start + timeout + Duration::from_millis(1), timeout),
            vec![sid("s1")]
        );
    }

    #[test]
    fn test_remove_if_expired_spares_refreshed_subscriber() {
        let registry = SubscriberRegistry::new(STALE_AFTER);
        let start = Instant::now();
        let timeout = Duration::from_secs(5);
        let registered = registry.register(sid("s1"), "host:1".to_string(), topics(&["T"]), start).unwrap();

        let scan_time = start + Duration::from_secs(6);
        assert_eq!(registry.expired(scan_time, timeout).len(), 1);

        // Heartbeat arrives after the scan but before removal.
        registry
            .record_heartbeat(&sid("s1"), registered.registration_id, scan_time, |_| {})
            .unwrap();

        assert!(registry.remove_if_expired(&sid("s1"), scan_time, timeout, |_| {}).is_none());
        assert!(registry.contains(&sid("s1")));
    }

    #[test]
    fn test_list_live_is_a_snapshot() {
        let registry = SubscriberRegistry::new(STALE_AFTER);
        let now = Instant::now();
        registry.register(sid("s1"), "host:1".to_string(), topics(&["T"]), now).unwrap();
        let s2 = registry.register(sid("s2"), "host:2".to_string(), topics(&["T"]), now).unwrap();

        let live = registry.list_live();
        registry.unregister(&sid("s1"));
        registry
            .advance_cursors(&sid("s2"), s2.registration_id, &[("T".to_string(), 5)], now)
            .unwrap();

        let snapshot: Vec<Subscriber> = live.collect();
        assert_eq!(snapshot.len(), 2);
        let s2_then = snapshot.iter().find(|subscriber| subscriber.id == sid("s2")).unwrap();
        assert_eq!(s2_then.cursor("T"), 0, "cursors are copied when the snapshot is taken");
        assert_eq!(registry.get(&sid("s2")).unwrap().cursor("T"), 5);
        assert_eq!(registry.list_live().count(), 1);
    }
}
