//! Bounded recency cache of recently processed readings.
//!
//! Radars retransmit the same observation several times within a second.
//! A reading is identified by `(radar, speed, detection second)`; the cache
//! remembers the most recent keys and evicts the oldest insertion once full.

use std::sync::Mutex;

use indexmap::IndexSet;

use crate::reading::NormalizedReading;
use crate::types::{RadarId, Timestamp};

/// Number of keys remembered when no capacity is configured.
pub const DEFAULT_DEDUP_CAPACITY: usize = 1000;

/// Identity of a reading for duplicate suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub radar_id: RadarId,
    pub speed: i32,
    /// Detection time in whole seconds since the Unix epoch.
    pub second: i64,
}

impl DedupKey {
    pub fn new(radar_id: RadarId, speed: i32, detected_at: Timestamp) -> Self {
        Self {
            radar_id,
            speed,
            second: detected_at.timestamp(),
        }
    }
}

impl From<&NormalizedReading> for DedupKey {
    fn from(reading: &NormalizedReading) -> Self {
        Self::new(reading.radar_id, reading.speed, reading.detected_at)
    }
}

/// Insertion-ordered set with a hard size bound.
///
/// Re-marking a key that is already present does not refresh its position;
/// eviction order is strictly first-inserted, first-evicted.
#[derive(Debug)]
pub struct Deduplicator {
    capacity: usize,
    seen: Mutex<IndexSet<DedupKey>>,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}

impl Deduplicator {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            seen: Mutex::new(IndexSet::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `false` when the key is currently remembered.
    pub fn should_process(&self, key: &DedupKey) -> bool {
        !self.lock().contains(key)
    }

    /// Remember `key`, evicting the oldest entry if the cache is full.
    pub fn mark_processed(&self, key: DedupKey) {
        let mut seen = self.lock();
        Self::insert_bounded(&mut seen, self.capacity, key);
    }

    /// Check and mark in one step.
    ///
    /// Returns `true` if the caller won the key and must process the
    /// reading. Concurrent workers racing on the same key see exactly one
    /// `true`.
    pub fn admit(&self, key: DedupKey) -> bool {
        let mut seen = self.lock();
        if seen.contains(&key) {
            return false;
        }
        Self::insert_bounded(&mut seen, self.capacity, key);
        true
    }

    /// Drop `key` so a later retransmission is processed again.
    pub fn forget(&self, key: &DedupKey) {
        self.lock().shift_remove(key);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn insert_bounded(seen: &mut IndexSet<DedupKey>, capacity: usize, key: DedupKey) {
        if seen.contains(&key) {
            return;
        }
        while seen.len() >= capacity {
            seen.shift_remove_index(0);
        }
        seen.insert(key);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IndexSet<DedupKey>> {
        // The set holds plain keys; a panic mid-update cannot leave it
        // logically broken, so a poisoned lock is still usable.
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
