//! Deterministic in-memory decode backend for integration tests.
//!
//! Sources have a fixed duration and frame rate; streams yield
//! solid-color frames on the frame grid from the requested open time.
//! Counters record every open and decode, and optional semaphore gates
//! let tests hold an operation in flight at a known point.

use async_trait::async_trait;
use parking_lot::Mutex;
use playhead_core::FrameRate;
use playhead_media::{
    DecodeBackend, FrameSink, FrameStream, FrameUploader, MediaResult, MediaSource, PacketReader,
    RawFrame, RawSurface, SinkOptions, SoftwareUploader, VideoTrack,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Everything the mock backend did, in counters.
#[derive(Default)]
pub struct MockStats {
    pub sources_opened: AtomicUsize,
    pub sinks_created: AtomicUsize,
    pub streams_opened: AtomicUsize,
    pub frames_decoded: AtomicUsize,
    /// Start times passed to `FrameSink::open`, in call order.
    pub open_times: Mutex<Vec<f64>>,
}

impl MockStats {
    pub fn sources_opened(&self) -> usize {
        self.sources_opened.load(Ordering::SeqCst)
    }

    pub fn sinks_created(&self) -> usize {
        self.sinks_created.load(Ordering::SeqCst)
    }

    pub fn streams_opened(&self) -> usize {
        self.streams_opened.load(Ordering::SeqCst)
    }

    pub fn open_times(&self) -> Vec<f64> {
        self.open_times.lock().clone()
    }
}

#[derive(Clone)]
struct MockConfig {
    duration: f64,
    frame_rate: FrameRate,
    natural_size: (u32, u32),
    has_video: bool,
    codec_supported: bool,
    keyframe_interval: f64,
    open_gate: Option<Arc<Semaphore>>,
}

/// Configurable mock [`DecodeBackend`].
pub struct MockBackend {
    config: MockConfig,
    source_gate: Option<Arc<Semaphore>>,
    pub stats: Arc<MockStats>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Install a fmt subscriber honoring `RUST_LOG`. First caller wins;
/// later calls are no-ops.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl MockBackend {
    pub fn new() -> Self {
        init_tracing();
        Self {
            config: MockConfig {
                duration: 10.0,
                frame_rate: FrameRate::FPS_30,
                natural_size: (64, 36),
                has_video: true,
                codec_supported: true,
                keyframe_interval: 1.0,
                open_gate: None,
            },
            source_gate: None,
            stats: Arc::new(MockStats::default()),
        }
    }

    pub fn duration(mut self, seconds: f64) -> Self {
        self.config.duration = seconds;
        self
    }

    pub fn without_video(mut self) -> Self {
        self.config.has_video = false;
        self
    }

    pub fn unsupported_codec(mut self) -> Self {
        self.config.codec_supported = false;
        self
    }

    /// Every `FrameSink::open` consumes one permit from `gate` before
    /// proceeding.
    pub fn gate_stream_opens(mut self, gate: Arc<Semaphore>) -> Self {
        self.config.open_gate = Some(gate);
        self
    }

    /// Every `open_source` consumes one permit from `gate` before
    /// returning, which holds asset construction in flight.
    pub fn gate_source_opens(mut self, gate: Arc<Semaphore>) -> Self {
        self.source_gate = Some(gate);
        self
    }
}

#[async_trait]
impl DecodeBackend for MockBackend {
    async fn open_source(&self, uri: &str) -> MediaResult<Arc<dyn MediaSource>> {
        if let Some(gate) = &self.source_gate {
            gate.acquire().await.expect("source gate closed").forget();
        }
        self.stats.sources_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockSource {
            uri: uri.to_string(),
            config: self.config.clone(),
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct MockSource {
    uri: String,
    config: MockConfig,
    stats: Arc<MockStats>,
}

#[async_trait]
impl MediaSource for MockSource {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn primary_video_track(&self) -> Option<Arc<dyn VideoTrack>> {
        if !self.config.has_video {
            return None;
        }
        Some(Arc::new(MockTrack {
            config: self.config.clone(),
            stats: Arc::clone(&self.stats),
        }))
    }

    async fn open_packet_reader(&self) -> MediaResult<Box<dyn PacketReader>> {
        Ok(Box::new(MockPacketReader {
            keyframe_interval: self.config.keyframe_interval,
            duration: self.config.duration,
        }))
    }
}

struct MockTrack {
    config: MockConfig,
    stats: Arc<MockStats>,
}

#[async_trait]
impl VideoTrack for MockTrack {
    fn codec_supported(&self) -> bool {
        self.config.codec_supported
    }

    fn supports_alpha(&self) -> bool {
        false
    }

    fn duration(&self) -> f64 {
        self.config.duration
    }

    fn natural_size(&self) -> (u32, u32) {
        self.config.natural_size
    }

    fn frame_rate(&self) -> FrameRate {
        self.config.frame_rate
    }

    async fn create_sink(&self, _options: SinkOptions) -> MediaResult<Arc<dyn FrameSink>> {
        self.stats.sinks_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockSink {
            config: self.config.clone(),
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct MockSink {
    config: MockConfig,
    stats: Arc<MockStats>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn open(&self, start_seconds: f64) -> MediaResult<Box<dyn FrameStream>> {
        if let Some(gate) = &self.config.open_gate {
            gate.acquire().await.expect("open gate closed").forget();
        }
        self.stats.streams_opened.fetch_add(1, Ordering::SeqCst);
        self.stats.open_times.lock().push(start_seconds);
        Ok(Box::new(MockStream {
            start: start_seconds,
            next_index: 0,
            closed: false,
            config: self.config.clone(),
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct MockStream {
    start: f64,
    next_index: u64,
    closed: bool,
    config: MockConfig,
    stats: Arc<MockStats>,
}

#[async_trait]
impl FrameStream for MockStream {
    async fn next_frame(&mut self) -> MediaResult<Option<RawFrame>> {
        if self.closed {
            return Ok(None);
        }
        let interval = self.config.frame_rate.frame_interval();
        let timestamp = self.start + self.next_index as f64 * interval;
        if timestamp > self.config.duration + 1e-9 {
            return Ok(None);
        }
        self.next_index += 1;
        self.stats.frames_decoded.fetch_add(1, Ordering::SeqCst);
        let (w, h) = self.config.natural_size;
        let shade = (self.next_index % 251) as u8;
        Ok(Some(RawFrame {
            surface: RawSurface::solid(w, h, [shade, shade, shade, 255]),
            timestamp,
        }))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

struct MockPacketReader {
    keyframe_interval: f64,
    duration: f64,
}

#[async_trait]
impl PacketReader for MockPacketReader {
    async fn nearest_keyframe_before(&mut self, seconds: f64) -> MediaResult<f64> {
        let clamped = seconds.clamp(0.0, self.duration);
        Ok((clamped / self.keyframe_interval).floor() * self.keyframe_interval)
    }
}

pub fn software_uploader() -> Arc<dyn FrameUploader> {
    Arc::new(SoftwareUploader)
}
