//! Process-wide thumbnail caches for the timeline UI.
//!
//! Two bounded LRU caches: rendered thumbnail bitmaps (keyed by source,
//! quantized time, and target size) and resolved keyframe timestamps
//! (keyed by source and quantized time), plus a per-source native-size
//! memo. Concurrent requests for the same thumbnail key share a single
//! decode through an in-flight map. Entries outlive individual clips
//! and are bounded only by LRU eviction.

use crate::config::PreviewConfig;
use crate::error::{PreviewError, PreviewResult};
use crate::frame_cache::CacheStats;
use lru::LruCache;
use parking_lot::Mutex;
use playhead_media::{
    DecodeBackend, FrameSink, FrameUploader, ImageHandle, MediaError, MediaSource, PacketReader,
    SinkOptions, VideoTrack,
};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// Key of one rendered thumbnail.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThumbnailKey {
    pub source: String,
    pub time_key: i64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct KeyframeKey {
    source: String,
    time_key: i64,
}

struct BoundedLru<K: std::hash::Hash + Eq, V> {
    cache: LruCache<K, V>,
    stats: CacheStats,
}

impl<K: std::hash::Hash + Eq, V: Clone> BoundedLru<K, V> {
    fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            cache: LruCache::new(capacity),
            stats: CacheStats::default(),
        }
    }

    fn get(&mut self, key: &K) -> Option<V> {
        match self.cache.get(key).cloned() {
            Some(value) => {
                self.stats.hits += 1;
                Some(value)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    fn put(&mut self, key: K, value: V) {
        self.stats.insertions += 1;
        if let Some((evicted, _)) = self.cache.push(key, value) {
            // push returns the displaced pair; same-key replacement is
            // not an eviction.
            if self.cache.peek(&evicted).is_none() {
                self.stats.evictions += 1;
            }
        }
    }

    fn len(&self) -> usize {
        self.cache.len()
    }

    fn contains(&self, key: &K) -> bool {
        self.cache.contains(key)
    }
}

/// A lazily-opened decode pipeline kept per source for thumbnail work.
struct ThumbSource {
    source: Arc<dyn MediaSource>,
    track: Arc<dyn VideoTrack>,
    sink: Arc<dyn FrameSink>,
    /// Packet reader for keyframe queries, constructed on first use.
    packets: Option<Box<dyn PacketReader>>,
}

type PendingThumbnail = Arc<OnceCell<Result<ImageHandle, String>>>;

/// Process-wide caches for preview thumbnails and keyframe lookups.
pub struct ThumbnailCache {
    backend: Arc<dyn DecodeBackend>,
    uploader: Arc<dyn FrameUploader>,
    grid_ms: u64,
    bitmaps: Mutex<BoundedLru<ThumbnailKey, ImageHandle>>,
    keyframes: Mutex<BoundedLru<KeyframeKey, f64>>,
    native_sizes: Mutex<HashMap<String, (u32, u32)>>,
    pending: Mutex<HashMap<ThumbnailKey, PendingThumbnail>>,
    sources: tokio::sync::Mutex<HashMap<String, ThumbSource>>,
}

impl ThumbnailCache {
    pub fn new(
        backend: Arc<dyn DecodeBackend>,
        uploader: Arc<dyn FrameUploader>,
        config: &PreviewConfig,
    ) -> Self {
        Self {
            backend,
            uploader,
            grid_ms: config.thumbnail_time_grid_ms.max(1),
            bitmaps: Mutex::new(BoundedLru::new(config.thumbnail_capacity)),
            keyframes: Mutex::new(BoundedLru::new(config.keyframe_capacity)),
            native_sizes: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            sources: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Quantize a time to the thumbnail grid.
    pub fn time_key(&self, seconds: f64) -> i64 {
        (seconds * 1000.0 / self.grid_ms as f64).round() as i64
    }

    /// A rendered thumbnail of `source` near `seconds` at the given
    /// target size. Hits touch the LRU entry; misses decode once even
    /// under concurrent callers for the same key.
    pub async fn thumbnail(
        &self,
        source: &str,
        seconds: f64,
        width: u32,
        height: u32,
    ) -> PreviewResult<ImageHandle> {
        let key = ThumbnailKey {
            source: source.to_string(),
            time_key: self.time_key(seconds),
            width,
            height,
        };

        if let Some(hit) = self.bitmaps.lock().get(&key) {
            return Ok(hit);
        }

        let cell = {
            let mut pending = self.pending.lock();
            Arc::clone(
                pending
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        let result = cell
            .get_or_init(|| self.render_thumbnail(key.clone(), seconds))
            .await
            .clone();
        self.pending.lock().remove(&key);
        result.map_err(PreviewError::Thumbnail)
    }

    /// Render a strip of `count` evenly spaced thumbnails across
    /// `[start, end)`. What the timeline clip body displays.
    pub async fn thumbnail_strip(
        &self,
        source: &str,
        start: f64,
        end: f64,
        count: usize,
        width: u32,
        height: u32,
    ) -> PreviewResult<Vec<ImageHandle>> {
        let mut strip = Vec::with_capacity(count);
        let span = (end - start).max(0.0);
        for index in 0..count {
            let at = start + span * (index as f64 + 0.5) / count.max(1) as f64;
            strip.push(self.thumbnail(source, at, width, height).await?);
        }
        Ok(strip)
    }

    async fn render_thumbnail(
        &self,
        key: ThumbnailKey,
        seconds: f64,
    ) -> Result<ImageHandle, String> {
        let render = async {
            let keyframe = self.keyframe_before(&key.source, seconds).await?;
            let sink = self.sink_for(&key.source).await?;

            let mut stream = sink.open(keyframe).await.map_err(PreviewError::from)?;
            let pulled = stream.next_frame().await;
            stream.close();
            let raw = pulled
                .map_err(PreviewError::from)?
                .ok_or_else(|| PreviewError::Thumbnail("no frame at keyframe".to_string()))?;

            let scaled = raw.surface.scaled(key.width, key.height);
            let image = self
                .uploader
                .wrap(scaled)
                .map_err(PreviewError::from)?;
            self.bitmaps.lock().put(key.clone(), image.clone());
            debug!(source = %key.source, time_key = key.time_key, "thumbnail rendered");
            Ok::<_, PreviewError>(image)
        };
        render.await.map_err(|e| e.to_string())
    }

    /// Timestamp of the nearest keyframe at or before `seconds`,
    /// memoized per quantized time.
    pub async fn keyframe_before(&self, source: &str, seconds: f64) -> PreviewResult<f64> {
        let key = KeyframeKey {
            source: source.to_string(),
            time_key: self.time_key(seconds),
        };
        if let Some(hit) = self.keyframes.lock().get(&key) {
            return Ok(hit);
        }

        let resolved = {
            let mut sources = self.sources.lock().await;
            let entry = self.ensure_source(&mut sources, source).await?;
            if entry.packets.is_none() {
                entry.packets = Some(entry.source.open_packet_reader().await?);
            }
            match entry.packets.as_mut() {
                Some(reader) => reader.nearest_keyframe_before(seconds).await?,
                None => return Err(PreviewError::Thumbnail("packet reader lost".to_string())),
            }
        };

        self.keyframes.lock().put(key, resolved);
        Ok(resolved)
    }

    /// Native pixel size of a source, resolved once.
    pub async fn native_size(&self, source: &str) -> PreviewResult<(u32, u32)> {
        if let Some(size) = self.native_sizes.lock().get(source).copied() {
            return Ok(size);
        }
        let size = {
            let mut sources = self.sources.lock().await;
            let entry = self.ensure_source(&mut sources, source).await?;
            entry.track.natural_size()
        };
        self.native_sizes.lock().insert(source.to_string(), size);
        Ok(size)
    }

    async fn sink_for(&self, source: &str) -> PreviewResult<Arc<dyn FrameSink>> {
        let mut sources = self.sources.lock().await;
        let entry = self.ensure_source(&mut sources, source).await?;
        Ok(Arc::clone(&entry.sink))
    }

    async fn ensure_source<'a>(
        &self,
        sources: &'a mut HashMap<String, ThumbSource>,
        uri: &str,
    ) -> PreviewResult<&'a mut ThumbSource> {
        if !sources.contains_key(uri) {
            let source = self.backend.open_source(uri).await?;
            let track = source
                .primary_video_track()
                .ok_or_else(|| MediaError::NoVideoTrack(uri.to_string()))?;
            let sink = track
                .create_sink(SinkOptions {
                    pool_size: 1,
                    fit: None,
                    alpha: false,
                })
                .await?;
            sources.insert(
                uri.to_string(),
                ThumbSource {
                    source,
                    track,
                    sink,
                    packets: None,
                },
            );
        }
        sources
            .get_mut(uri)
            .ok_or_else(|| PreviewError::Thumbnail("source session vanished".to_string()))
    }

    /// Current bitmap count; never exceeds the configured capacity.
    pub fn bitmap_count(&self) -> usize {
        self.bitmaps.lock().len()
    }

    /// Whether a thumbnail for this exact key is resident.
    pub fn contains_bitmap(&self, key: &ThumbnailKey) -> bool {
        self.bitmaps.lock().contains(key)
    }

    /// Bitmap cache counters.
    pub fn bitmap_stats(&self) -> CacheStats {
        self.bitmaps.lock().stats
    }

    /// Keyframe cache counters.
    pub fn keyframe_stats(&self) -> CacheStats {
        self.keyframes.lock().stats
    }
}
