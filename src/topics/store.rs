//! Versioned Topic Storage
//!
//! Every topic sits behind its own `RwLock`, so writers to different topics never
//! contend and a reader computing a delta always sees a version-consistent view.
//! The outer `DashMap` is only touched to look a topic up or create it.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use super::types::{AppliedDelta, EntryUpdate, TopicDelta, TopicEntry, Version};
use crate::subscribers::types::SubscriberId;

#[derive(Debug, Clone)]
struct StoredEntry {
    value: Vec<u8>,
    version: Version,
    deleted: bool,
    contributor: Option<SubscriberId>,
}

/// One named, versioned key-value map.
#[derive(Debug)]
pub struct Topic {
    name: String,
    entries: HashMap<String, StoredEntry>,
    /// Version -> key. Each key appears once, under its latest version, which
    /// keeps delta computation proportional to the number of changed entries.
    by_version: BTreeMap<Version, String>,
    /// Keys last written by each contributor that are not yet deleted.
    contributions: HashMap<SubscriberId, HashSet<String>>,
    version: Version,
    /// Tombstones at or below this version have been discarded.
    compacted_through: Version,
}

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: HashMap::new(),
            by_version: BTreeMap::new(),
            contributions: HashMap::new(),
            version: 0,
            compacted_through: 0,
        }
    }

    /// Highest version ever assigned in this topic. Survives compaction, so it
    /// can be larger than any version still stored.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Number of live (non-deleted) entries.
    pub fn len(&self) -> usize {
        self.entries.values().filter(|entry| !entry.deleted).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tombstone_count(&self) -> usize {
        self.entries.values().filter(|entry| entry.deleted).count()
    }

    /// Applies a batch in order; later updates to the same key win.
    ///
    /// Deleting a key that is absent or already deleted does not consume a version.
    pub fn apply(&mut self, updates: &[EntryUpdate], contributor: Option<&SubscriberId>) -> AppliedDelta {
        let previous_version = self.version;

        for update in updates {
            let existing = self
                .entries
                .get(&update.key)
                .map(|entry| (entry.version, entry.deleted, entry.contributor.clone()));
            let deleted = update.value.is_none();

            if deleted && existing.as_ref().map(|(_, was_deleted, _)| *was_deleted).unwrap_or(true) {
                continue;
            }

            self.version += 1;

            if let Some((old_version, _, old_contributor)) = existing {
                self.by_version.remove(&old_version);
                if let Some(old_contributor) = old_contributor {
                    self.forget_contribution(&old_contributor, &update.key);
                }
            }

            let contributor = if deleted { None } else { contributor.cloned() };
            if let Some(id) = &contributor {
                self.contributions
                    .entry(id.clone())
                    .or_default()
                    .insert(update.key.clone());
            }

            self.by_version.insert(self.version, update.key.clone());
            self.entries.insert(
                update.key.clone(),
                StoredEntry {
                    value: update.value.clone().unwrap_or_default(),
                    version: self.version,
                    deleted,
                    contributor,
                },
            );
        }

        AppliedDelta {
            previous_version,
            version: self.version,
        }
    }

    fn forget_contribution(&mut self, contributor: &SubscriberId, key: &str) {
        if let Some(keys) = self.contributions.get_mut(contributor) {
            keys.remove(key);
            if keys.is_empty() {
                self.contributions.remove(contributor);
            }
        }
    }

    /// Entries with a version greater than `since`, in ascending version order.
    ///
    /// A cursor of 0, or one that predates the compaction horizon, gets a full
    /// snapshot flagged with `is_delta = false`.
    pub fn delta_since(&self, since: Version) -> TopicDelta {
        let is_delta = since > 0 && since >= self.compacted_through;
        let start = if is_delta { since + 1 } else { 0 };

        let entries = if start > self.version {
            Vec::new()
        } else {
            self.by_version
                .range(start..)
                .filter_map(|(_, key)| self.entry(key))
                .collect()
        };

        TopicDelta {
            topic_name: self.name.clone(),
            entries,
            from_version: if is_delta { since } else { 0 },
            to_version: self.version,
            is_delta,
        }
    }

    fn entry(&self, key: &str) -> Option<TopicEntry> {
        self.entries.get(key).map(|stored| TopicEntry {
            key: key.to_string(),
            value: stored.value.clone(),
            version: stored.version,
            deleted: stored.deleted,
        })
    }

    /// Tombstones every live entry last written by `contributor`. Returns the
    /// applied range when anything was removed.
    pub fn purge_contributor(&mut self, contributor: &SubscriberId) -> Option<AppliedDelta> {
        let mut keys: Vec<String> = self.contributions.remove(contributor)?.into_iter().collect();
        keys.sort();

        let deletes: Vec<EntryUpdate> = keys.into_iter().map(EntryUpdate::delete).collect();
        let applied = self.apply(&deletes, None);

        (applied.version > applied.previous_version).then_some(applied)
    }

    /// Drops tombstones at or below `horizon` and returns how many were removed.
    ///
    /// Callers must pass a horizon no greater than the lowest cursor of any
    /// live subscriber, otherwise that subscriber would miss a delete.
    pub fn compact(&mut self, horizon: Version) -> usize {
        let horizon = horizon.min(self.version);
        if horizon <= self.compacted_through {
            return 0;
        }

        let expired: Vec<(Version, String)> = self
            .by_version
            .range(..=horizon)
            .filter(|(_, key)| self.entries.get(*key).map(|e| e.deleted).unwrap_or(false))
            .map(|(version, key)| (*version, key.clone()))
            .collect();

        for (version, key) in &expired {
            self.by_version.remove(version);
            self.entries.remove(key);
        }

        self.compacted_through = horizon;
        expired.len()
    }

    /// Live key/value pairs, for inspection and tests.
    pub fn live_entries(&self) -> BTreeMap<String, Vec<u8>> {
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.deleted)
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }
}

/// Aggregate counters across all topics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopicStats {
    pub topics: usize,
    pub entries: usize,
    pub tombstones: usize,
}

/// Owner of every topic.
#[derive(Default)]
pub struct TopicStore {
    topics: DashMap<String, Arc<RwLock<Topic>>>,
}

impl TopicStore {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
        }
    }

    /// Returns the topic, creating it on first use. The map guard is released
    /// before the caller takes the topic lock.
    fn topic(&self, name: &str) -> Arc<RwLock<Topic>> {
        if let Some(topic) = self.topics.get(name) {
            return topic.value().clone();
        }

        self.topics
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!("Created topic {}", name);
                Arc::new(RwLock::new(Topic::new(name)))
            })
            .value()
            .clone()
    }

    fn existing(&self, name: &str) -> Option<Arc<RwLock<Topic>>> {
        self.topics.get(name).map(|topic| topic.value().clone())
    }

    pub fn ensure_topic(&self, name: &str) {
        self.topic(name);
    }

    /// Applies `updates` to `topic_name` and returns the new topic version.
    pub fn apply_delta(
        &self,
        topic_name: &str,
        updates: &[EntryUpdate],
        contributor: Option<&SubscriberId>,
    ) -> Version {
        self.apply_delta_tracked(topic_name, updates, contributor).version
    }

    /// Like [`apply_delta`](Self::apply_delta) but also reports the version the
    /// topic was at before the batch.
    pub fn apply_delta_tracked(
        &self,
        topic_name: &str,
        updates: &[EntryUpdate],
        contributor: Option<&SubscriberId>,
    ) -> AppliedDelta {
        let topic = self.topic(topic_name);
        let applied = topic.write().apply(updates, contributor);

        tracing::trace!(
            "Applied {} update(s) to {}: v{} -> v{}",
            updates.len(),
            topic_name,
            applied.previous_version,
            applied.version
        );

        applied
    }

    /// Everything in `topic_name` newer than `since_version`.
    ///
    /// Unknown topics yield an empty snapshot at version 0.
    pub fn compute_delta(&self, topic_name: &str, since_version: Version) -> TopicDelta {
        match self.existing(topic_name) {
            Some(topic) => topic.read().delta_since(since_version),
            None => TopicDelta {
                topic_name: topic_name.to_string(),
                entries: Vec::new(),
                from_version: 0,
                to_version: 0,
                is_delta: false,
            },
        }
    }

    /// Removes the live entries `contributor_id` was the last to write.
    pub fn purge_entries_from(
        &self,
        topic_name: &str,
        contributor_id: &SubscriberId,
    ) -> Option<AppliedDelta> {
        let topic = self.existing(topic_name)?;
        let purged = topic.write().purge_contributor(contributor_id);

        if let Some(applied) = purged {
            tracing::debug!(
                "Purged {} entries of {} from {}",
                applied.version - applied.previous_version,
                contributor_id,
                topic_name
            );
        }

        purged
    }

    pub fn current_version(&self, topic_name: &str) -> Version {
        self.existing(topic_name)
            .map(|topic| topic.read().version())
            .unwrap_or(0)
    }

    /// Compacts tombstones in every topic.
    ///
    /// `horizons` maps topic names to the lowest cursor among that topic's live
    /// subscribers. Topics nobody subscribes to are compacted up to their
    /// current version.
    pub fn compact(&self, horizons: &HashMap<String, Version>) -> usize {
        let topics: Vec<(String, Arc<RwLock<Topic>>)> = self
            .topics
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut removed = 0;
        for (name, topic) in topics {
            let mut topic = topic.write();
            let horizon = horizons.get(&name).copied().unwrap_or_else(|| topic.version());
            removed += topic.compact(horizon);
        }

        if removed > 0 {
            tracing::debug!("Compacted {} tombstone(s)", removed);
        }

        removed
    }

    /// Live entries of a topic (empty if the topic does not exist).
    pub fn snapshot(&self, topic_name: &str) -> BTreeMap<String, Vec<u8>> {
        self.existing(topic_name)
            .map(|topic| topic.read().live_entries())
            .unwrap_or_default()
    }

    pub fn contains(&self, topic_name: &str) -> bool {
        self.topics.contains_key(topic_name)
    }


    pub fn stats(&self) -> TopicStats {
        let topics: Vec<Arc<RwLock<Topic>>> =
            self.topics.iter().map(|entry| entry.value().clone()).collect();

        let mut stats = TopicStats {
            topics: topics.len(),
            ..Default::default()
        };
        for topic in topics {
            let topic = topic.read();
            stats.entries += topic.len();
            stats.tombstones += topic.tombstone_count();
        }
        stats
    }
}
