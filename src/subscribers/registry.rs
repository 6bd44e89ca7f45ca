//! Subscriber Registry
//!
//! A `DashMap` keyed by subscriber id. Every mutation goes through the map's
//! entry locks, so operations on one subscriber are serialized while different
//! subscribers proceed in parallel.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use super::types::{RegistrationId, Subscriber, SubscriberId, TopicRegistration};
use crate::error::{Result, StateStoreError};
use crate::topics::types::Version;

/// Outcome of a successful registration.
#[derive(Debug, Clone)]
pub struct Registered {
    pub registration_id: RegistrationId,
    /// The stale session this registration replaced, if any.
    pub previous: Option<Subscriber>,
}

pub struct SubscriberRegistry {
    subscribers: DashMap<SubscriberId, Subscriber>,
    /// Silence after which a session may be replaced by a registration from
    /// another address.
    stale_session_after: Duration,
}

impl SubscriberRegistry {
    pub fn new(stale_session_after: Duration) -> Self {
        Self {
            subscribers: DashMap::new(),
            stale_session_after,
        }
    }

    /// Creates a session for `id` with all cursors at zero.
    ///
    /// An existing session is replaced when it is stale: either the same
    /// address is registering again (the process restarted) or it has been
    /// silent for longer than `stale_session_after`. Otherwise the id is taken.
    pub fn register(
        &self,
        id: SubscriberId,
        address: String,
        topics: Vec<TopicRegistration>,
        now: Instant,
    ) -> Result<Registered> {
        self.register_with(id, address, topics, now, |_, _| {})
    }

    /// Like [`register`](Self::register); `on_registered` receives the replaced
    /// session (if any) and the new one while the entry is still locked, so
    /// nothing else can act on this id until it returns.
    pub fn register_with<F>(
        &self,
        id: SubscriberId,
        address: String,
        topics: Vec<TopicRegistration>,
        now: Instant,
        on_registered: F,
    ) -> Result<Registered>
    where
        F: FnOnce(Option<&Subscriber>, &Subscriber),
    {
        match self.subscribers.entry(id.clone()) {
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get();
                let silent_for = now.saturating_duration_since(existing.last_contact_time);
                let is_stale = existing.address == address || silent_for > self.stale_session_after;

                if !is_stale {
                    tracing::warn!(
                        "Rejected registration of {} from {}: live session at {} (last contact {:?} ago)",
                        id,
                        address,
                        existing.address,
                        silent_for
                    );
                    return Err(StateStoreError::AlreadyRegistered(id));
                }

                let subscriber = Subscriber::new(id, address, topics, now);
                let registration_id = subscriber.registration_id;
                let previous = occupied.insert(subscriber);
                on_registered(Some(&previous), occupied.get());

                tracing::info!(
                    "Subscriber {} re-registered (registration {} replaces {})",
                    previous.id,
                    registration_id,
                    previous.registration_id
                );

                Ok(Registered {
                    registration_id,
                    previous: Some(previous),
                })
            }
            Entry::Vacant(vacant) => {
                let subscriber = Subscriber::new(id, address, topics, now);
                let registration_id = subscriber.registration_id;
                let inserted = vacant.insert(subscriber);
                on_registered(None, inserted.value());

                Ok(Registered {
                    registration_id,
                    previous: None,
                })
            }
        }
    }

    /// Removes the subscriber. Absent ids are a no-op.
    pub fn unregister(&self, id: &SubscriberId) -> Option<Subscriber> {
        self.unregister_with(id, |_| {})
    }

    /// Removes the subscriber, running `on_remove` before the entry lock is released.
    pub fn unregister_with<F>(&self, id: &SubscriberId, on_remove: F) -> Option<Subscriber>
    where
        F: FnOnce(&Subscriber),
    {
        match self.subscribers.entry(id.clone()) {
            Entry::Occupied(occupied) => {
                on_remove(occupied.get());
                Some(occupied.remove())
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Refreshes liveness for the current session of `id`, then runs `f`
    /// against it while the entry lock is still held.
    ///
    /// Fails with `StaleSession` (without touching anything) if the subscriber
    /// is gone or `registration_id` belongs to an older incarnation.
    pub fn record_heartbeat<F, T>(
        &self,
        id: &SubscriberId,
        registration_id: RegistrationId,
        now: Instant,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut Subscriber) -> T,
    {
        match self.subscribers.get_mut(id) {
            Some(mut subscriber) if subscriber.registration_id == registration_id => {
                subscriber.last_contact_time = now;
                Ok(f(&mut subscriber))
            }
            _ => Err(StateStoreError::StaleSession(id.clone())),
        }
    }

    /// Records a confirmed delivery. Cursors only move forward, and only for
    /// the session the update was computed for.
    pub fn advance_cursors(
        &self,
        id: &SubscriberId,
        registration_id: RegistrationId,
        versions: &[(String, Version)],
        delivered_at: Instant,
    ) -> Result<()> {
        let mut subscriber = self
            .subscribers
            .get_mut(id)
            .ok_or_else(|| StateStoreError::UnknownSubscriber(id.clone()))?;

        if subscriber.registration_id != registration_id {
            return Err(StateStoreError::StaleSession(id.clone()));
        }

        for (topic_name, version) in versions {
            subscriber.advance_cursor(topic_name, *version);
        }
        subscriber.last_delivery_time = Some(delivered_at);

        Ok(())
    }

    /// Snapshot of every registered subscriber.
    ///
    /// The snapshot is taken eagerly: every subscriber, cursors included, is
    /// cloned before this returns. A dispatch cycle therefore never sees members
    /// removed before it started, and later changes wait for the next cycle.
    pub fn list_live(&self) -> LiveSubscribers {
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        LiveSubscribers {
            inner: subscribers.into_iter(),
        }
    }

    /// Ids whose last contact is more than `timeout` before `now`.
    pub fn expired(&self, now: Instant, timeout: Duration) -> Vec<SubscriberId> {
        self.subscribers
            .iter()
            .filter(|entry| now.saturating_duration_since(entry.value().last_contact_time) > timeout)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Removes `id` only if it is still expired; a heartbeat that lands between
    /// the scan and the removal keeps the subscriber alive. `on_evict` runs
    /// under the entry lock.
    pub fn remove_if_expired<F>(
        &self,
        id: &SubscriberId,
        now: Instant,
        timeout: Duration,
        on_evict: F,
    ) -> Option<Subscriber>
    where
        F: FnOnce(&Subscriber),
    {
        match self.subscribers.entry(id.clone()) {
            Entry::Occupied(occupied) => {
                let silent_for = now.saturating_duration_since(occupied.get().last_contact_time);
                if silent_for <= timeout {
                    return None;
                }
                on_evict(occupied.get());
                Some(occupied.remove())
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Lowest cursor per topic across all subscribers of that topic.
    pub fn cursor_horizons(&self) -> HashMap<String, Version> {
        let mut horizons: HashMap<String, Version> = HashMap::new();

        for entry in self.subscribers.iter() {
            for (topic_name, cursor) in &entry.value().last_sent_version {
                horizons
                    .entry(topic_name.clone())
                    .and_modify(|lowest| *lowest = (*lowest).min(*cursor))
                    .or_insert(*cursor);
            }
        }

        horizons
    }

    pub fn get(&self, id: &SubscriberId) -> Option<Subscriber> {
        self.subscribers.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.subscribers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

/// A finite, point-in-time sequence of subscribers.
pub struct LiveSubscribers {
    inner: std::vec::IntoIter<Subscriber>,
}

impl Iterator for LiveSubscribers {
    type Item = Subscriber;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for LiveSubscribers {}
