//! Last-known remote versions per object
//!
//! The cache lets the engine attach a version to objects it has written or
//! read before, instead of re-fetching them. Versions only move forward: a
//! late observation of an older version never overwrites a newer one.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::trace;

use catsync_core::domain::{CatalogObject, ObjectId};

/// A cached version and when it was last confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionCacheEntry {
    pub version: i64,
    pub observed_at: DateTime<Utc>,
}

/// Concurrent map of object ID to last observed remote version
///
/// Updates are atomic per entry, so concurrent batches may record versions
/// for overlapping IDs without coordination.
#[derive(Debug, Default)]
pub struct VersionCache {
    entries: DashMap<ObjectId, VersionCacheEntry>,
}

impl VersionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an observed version, keeping the maximum
    ///
    /// Returns the version stored after the update. Placeholder IDs are
    /// never cached (they do not exist remotely) and yield `version` as-is.
    pub fn record_version(&self, id: &ObjectId, version: i64) -> i64 {
        if id.is_placeholder() {
            return version;
        }
        let now = Utc::now();
        let mut entry = self
            .entries
            .entry(id.clone())
            .or_insert(VersionCacheEntry {
                version,
                observed_at: now,
            });
        if version >= entry.version {
            entry.version = version;
            entry.observed_at = now;
        } else {
            trace!(id = %id, cached = entry.version, observed = version, "Ignoring stale version");
        }
        entry.version
    }

    /// Records the versions of every versioned object in `objects`
    pub fn record_objects(&self, objects: &[CatalogObject]) {
        for object in objects {
            if let Some(version) = object.version() {
                self.record_version(object.id(), version);
            }
        }
    }

    /// Returns the last known version, `None` if the object is unknown
    pub fn get_version(&self, id: &ObjectId) -> Option<i64> {
        self.entries.get(id).map(|e| e.version)
    }

    pub fn entry(&self, id: &ObjectId) -> Option<VersionCacheEntry> {
        self.entries.get(id).map(|e| *e)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
