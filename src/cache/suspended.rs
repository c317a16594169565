//! # Suspended Cache
//!
//! Holds sprites whose source image went away, keyed by content hash, so an
//! identical image loaded later can take them back without recomputing.
//!
//! Bounded by a byte ceiling and a count ceiling; the least recently
//! referenced entries are evicted first. Suspending counts as a reference,
//! so insertion order is reference order.

use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::cache::sprite::ResampledSprite;
use crate::core::hash::ContentHash;

struct Inner {
    entries: LruCache<ContentHash, Arc<ResampledSprite>>,
    bytes: usize,
    max_bytes: usize,
    max_count: usize,
}

impl Inner {
    fn over_limit(&self) -> bool {
        self.entries.len() > self.max_count || self.bytes > self.max_bytes
    }

    /// Pop LRU entries until within limits.
    fn evict(&mut self) -> Vec<Arc<ResampledSprite>> {
        let mut evicted = Vec::new();
        while self.over_limit() {
            let Some((_, entry)) = self.entries.pop_lru() else {
                break;
            };
            self.bytes = self.bytes.saturating_sub(entry.byte_size());
            evicted.push(entry);
        }
        evicted
    }
}

pub struct SuspendedCache {
    inner: Mutex<Inner>,
}

impl SuspendedCache {
    pub fn new(max_bytes: usize, max_count: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                bytes: 0,
                max_bytes,
                max_count,
            }),
        }
    }

    /// Store a suspended entry. Returns entries evicted to make room, for the caller to dispose.
    ///
    /// An entry already cached under the same hash is replaced and returned as evicted.
    pub fn insert(&self, hash: ContentHash, entry: Arc<ResampledSprite>) -> Vec<Arc<ResampledSprite>> {
        let mut inner = self.inner.lock();
        inner.bytes += entry.byte_size();
        let mut evicted = Vec::new();
        if let Some((_, replaced)) = inner.entries.push(hash, entry) {
            inner.bytes = inner.bytes.saturating_sub(replaced.byte_size());
            evicted.push(replaced);
        }
        evicted.extend(inner.evict());
        evicted
    }

    /// Remove the entry for `hash`, if any.
    pub fn take(&self, hash: ContentHash) -> Option<Arc<ResampledSprite>> {
        let mut inner = self.inner.lock();
        let entry = inner.entries.pop(&hash)?;
        inner.bytes = inner.bytes.saturating_sub(entry.byte_size());
        Some(entry)
    }

    /// Remove the entry for `hash` only if `accept` approves it; otherwise leave it in place.
    pub fn take_matching<F>(&self, hash: ContentHash, accept: F) -> Option<Arc<ResampledSprite>>
    where
        F: FnOnce(&ResampledSprite) -> bool,
    {
        let mut inner = self.inner.lock();
        if !accept(inner.entries.peek(&hash)?) {
            return None;
        }
        let entry = inner.entries.pop(&hash)?;
        inner.bytes = inner.bytes.saturating_sub(entry.byte_size());
        Some(entry)
    }

    pub fn contains(&self, hash: ContentHash) -> bool {
        self.inner.lock().entries.contains(&hash)
    }

    /// Change ceilings and evict down to them.
    pub fn set_limits(&self, max_bytes: usize, max_count: usize) -> Vec<Arc<ResampledSprite>> {
        let mut inner = self.inner.lock();
        inner.max_bytes = max_bytes;
        inner.max_count = max_count;
        inner.evict()
    }

    pub fn clear(&self) -> Vec<Arc<ResampledSprite>> {
        let mut inner = self.inner.lock();
        inner.bytes = 0;
        let mut drained = Vec::with_capacity(inner.entries.len());
        while let Some((_, entry)) = inner.entries.pop_lru() {
            drained.push(entry);
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> usize {
        self.inner.lock().bytes
    }
}

impl std::fmt::Debug for SuspendedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SuspendedCache")
            .field("len", &inner.entries.len())
            .field("bytes", &inner.bytes)
            .field("max_bytes", &inner.max_bytes)
            .field("max_count", &inner.max_count)
            .finish()
    }
}
