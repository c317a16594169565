//! Live sprites keyed by [`SpriteKey`]; at most one entry per key.
//!
//! Entries displaced by `install` or removed here are handed back to the
//! caller, which decides whether to suspend or dispose them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::key::SpriteKey;
use crate::cache::sprite::{ResampledSprite, SpriteState};
use crate::core::geometry::Bounds;
use crate::source::SourceHandle;

#[derive(Debug, Default)]
pub struct ActiveMap {
    entries: Mutex<HashMap<SpriteKey, Arc<ResampledSprite>>>,
}

impl ActiveMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &SpriteKey) -> Option<Arc<ResampledSprite>> {
        self.entries.lock().get(key).cloned()
    }

    /// Insert `entry` unless the key is occupied. Returns the entry now under the key.
    pub fn get_or_insert(&self, key: SpriteKey, entry: &Arc<ResampledSprite>) -> Arc<ResampledSprite> {
        self.entries.lock().entry(key).or_insert_with(|| entry.clone()).clone()
    }

    /// Put `entry` under `key`, returning a different entry it displaced.
    pub fn install(&self, key: SpriteKey, entry: Arc<ResampledSprite>) -> Option<Arc<ResampledSprite>> {
        let displaced = self.entries.lock().insert(key, entry.clone())?;
        if Arc::ptr_eq(&displaced, &entry) {
            None
        } else {
            Some(displaced)
        }
    }

    pub fn remove(&self, key: &SpriteKey) -> Option<Arc<ResampledSprite>> {
        self.entries.lock().remove(key)
    }

    /// Remove the key only while it still maps to `entry`.
    pub fn remove_if_same(&self, key: &SpriteKey, entry: &Arc<ResampledSprite>) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(current) if Arc::ptr_eq(current, entry) => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Apply a change of `source` to `revision`.
    ///
    /// Entries intersecting `region` (all of them for `None`) are invalidated;
    /// ready entries elsewhere stay valid under the new revision. Returns the
    /// number invalidated.
    pub fn invalidate_overlapping(&self, source: SourceHandle, region: Option<Bounds>, revision: u64) -> usize {
        let entries = self.entries.lock();
        let mut invalidated = 0;
        for (key, entry) in entries.iter().filter(|(key, _)| key.source == source) {
            if region.is_none_or(|r| r.overlaps(&key.bounds)) {
                if entry.invalidate() {
                    invalidated += 1;
                }
            } else {
                entry.rebind_revision(revision);
            }
        }
        invalidated
    }

    /// Remove and return every entry of `source`.
    pub fn drain_source(&self, source: SourceHandle) -> Vec<Arc<ResampledSprite>> {
        let mut entries = self.entries.lock();
        let keys: Vec<SpriteKey> = entries.keys().filter(|k| k.source == source).copied().collect();
        keys.iter().filter_map(|k| entries.remove(k)).collect()
    }

    pub fn drain_all(&self) -> Vec<Arc<ResampledSprite>> {
        self.entries.lock().drain().map(|(_, entry)| entry).collect()
    }

    /// Remove least recently referenced entries until held bytes fit `max_bytes`.
    pub fn purge_to(&self, max_bytes: usize) -> Vec<Arc<ResampledSprite>> {
        let mut entries = self.entries.lock();
        let mut total: usize = entries.values().map(|e| e.byte_size()).sum();
        if total <= max_bytes {
            return Vec::new();
        }

        let mut candidates: Vec<(u64, SpriteKey, usize)> = entries
            .iter()
            .filter(|(_, e)| !matches!(e.state(), SpriteState::Pending))
            .map(|(k, e)| (e.last_referenced_frame(), *k, e.byte_size()))
            .collect();
        candidates.sort_by_key(|(frame, _, _)| *frame);

        let mut purged = Vec::new();
        for (_, key, bytes) in candidates {
            if total <= max_bytes {
                break;
            }
            if let Some(entry) = entries.remove(&key) {
                total = total.saturating_sub(bytes);
                purged.push(entry);
            }
        }
        purged
    }

    pub fn total_bytes(&self) -> usize {
        self.entries.lock().values().map(|e| e.byte_size()).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
