//! Per-asset cache of decoded frames.
//!
//! Keyed by frame-aligned timestamps so that seeks separated by
//! sub-frame jitter hit the same entry. Seeks consult this cache before
//! issuing any decode request. Bounded LRU with a configurable
//! capacity; entries live as long as the owning asset.

use lru::LruCache;
use parking_lot::Mutex;
use playhead_core::FrameKey;
use playhead_media::ImageHandle;
use std::num::NonZeroUsize;

/// Cache performance counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
}

struct Inner {
    frames: LruCache<FrameKey, ImageHandle>,
    stats: CacheStats,
}

/// Bounded cache of ready-to-draw frames for one asset.
pub struct FrameCache {
    inner: Mutex<Inner>,
}

impl FrameCache {
    /// Create a cache holding at most `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            inner: Mutex::new(Inner {
                frames: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Look up the frame at an aligned timestamp, touching it.
    pub fn get(&self, key: FrameKey) -> Option<ImageHandle> {
        let mut inner = self.inner.lock();
        match inner.frames.get(&key).cloned() {
            Some(image) => {
                inner.stats.hits += 1;
                Some(image)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Store a decoded frame, evicting the least-recently-used entry
    /// when full.
    pub fn store(&self, key: FrameKey, image: ImageHandle) {
        let mut inner = self.inner.lock();
        inner.stats.insertions += 1;
        if inner.frames.push(key, image).is_some_and(|(k, _)| k != key) {
            inner.stats.evictions += 1;
        }
    }

    /// Number of cached frames.
    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().frames.is_empty()
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }

    /// Drop every cached frame.
    pub fn clear(&self) {
        self.inner.lock().frames.clear();
    }
}
