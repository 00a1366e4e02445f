//! Decode backend traits.
//!
//! The backend is opaque to the preview engine: open a source, find the
//! primary video track, create sinks. A sink opens pull-based frame
//! streams starting at arbitrary times; a stream is explicitly closable
//! so abandoning one never relies on destructor timing alone.

use crate::error::MediaResult;
use crate::image::RawSurface;
use async_trait::async_trait;
use playhead_core::FrameRate;
use std::sync::Arc;

/// Options for creating a decode sink.
#[derive(Debug, Clone)]
pub struct SinkOptions {
    /// Number of frames the sink may buffer ahead of the consumer.
    pub pool_size: usize,
    /// Decode directly to this size instead of the native size.
    pub fit: Option<(u32, u32)>,
    /// Request an alpha-capable pixel format.
    pub alpha: bool,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            pool_size: 4,
            fit: None,
            alpha: false,
        }
    }
}

/// A timestamped decoded frame yielded by a stream.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub surface: RawSurface,
    /// Presentation time in seconds from the start of the source.
    pub timestamp: f64,
}

/// An opened, probeable media source. Independent sinks over the same
/// source may coexist.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// URI this source was opened from.
    fn uri(&self) -> &str;

    /// The primary video track, if the container has one.
    fn primary_video_track(&self) -> Option<Arc<dyn VideoTrack>>;

    /// Open a packet-level reader for keyframe queries. Constructed
    /// lazily by callers that need it and reused per source.
    async fn open_packet_reader(&self) -> MediaResult<Box<dyn PacketReader>>;
}

/// A video track inside a source.
#[async_trait]
pub trait VideoTrack: Send + Sync {
    /// Whether the codec can be decoded by this backend.
    fn codec_supported(&self) -> bool;

    /// Whether decoding can produce alpha.
    fn supports_alpha(&self) -> bool;

    /// Track duration in seconds.
    fn duration(&self) -> f64;

    /// Native pixel dimensions.
    fn natural_size(&self) -> (u32, u32);

    /// Native frame rate.
    fn frame_rate(&self) -> FrameRate;

    /// Create an independent decode sink over this track.
    async fn create_sink(&self, options: SinkOptions) -> MediaResult<Arc<dyn FrameSink>>;
}

/// A decode cursor: opens frame streams from arbitrary start times.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Open a frame stream starting at `start_seconds`. Opening a new
    /// stream moves this sink's cursor; simultaneously-visible clips
    /// must therefore not share a sink (see arbitration in the preview
    /// crate).
    async fn open(&self, start_seconds: f64) -> MediaResult<Box<dyn FrameStream>>;
}

/// A pull-based, cancellable sequence of frames.
#[async_trait]
pub trait FrameStream: Send {
    /// Pull the next frame. `Ok(None)` signals end of stream.
    async fn next_frame(&mut self) -> MediaResult<Option<RawFrame>>;

    /// Stop decoding and release the underlying resources. Subsequent
    /// pulls return `Ok(None)`. Dropping the stream has the same
    /// effect.
    fn close(&mut self);
}

/// Packet-level access for keyframe timestamp queries.
#[async_trait]
pub trait PacketReader: Send {
    /// Timestamp of the nearest keyframe at or before `seconds`.
    async fn nearest_keyframe_before(&mut self, seconds: f64) -> MediaResult<f64>;
}

/// An opaque decoder backend.
#[async_trait]
pub trait DecodeBackend: Send + Sync {
    /// Open a source by URI.
    async fn open_source(&self, uri: &str) -> MediaResult<Arc<dyn MediaSource>>;
}
