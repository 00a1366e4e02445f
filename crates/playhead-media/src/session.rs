//! Decode session: one opened source plus its shared sink.

use crate::backend::{DecodeBackend, FrameSink, MediaSource, SinkOptions, VideoTrack};
use crate::error::{MediaError, MediaResult};
use playhead_core::FrameRate;
use std::sync::Arc;
use tracing::{debug, info};

/// An open decode pipeline for one source.
///
/// Created when an asset is first acquired and destroyed when the
/// asset registry disposes the entry. Owns the primary video track and
/// the one shared sink every clip uses unless arbitration hands it a
/// dedicated sink instead.
pub struct DecodeSession {
    uri: String,
    source: Arc<dyn MediaSource>,
    track: Arc<dyn VideoTrack>,
    shared_sink: Arc<dyn FrameSink>,
    sink_options: SinkOptions,
}

impl DecodeSession {
    /// Open a source and set up the shared sink.
    ///
    /// Fails for sources with no video track, unsupported codecs, or a
    /// requested alpha capability the track cannot provide; those
    /// failures surface as per-clip error state, never a retry loop.
    pub async fn open(
        backend: &dyn DecodeBackend,
        uri: &str,
        options: SinkOptions,
    ) -> MediaResult<Self> {
        let source = backend.open_source(uri).await?;
        let track = source
            .primary_video_track()
            .ok_or_else(|| MediaError::NoVideoTrack(uri.to_string()))?;
        if !track.codec_supported() {
            return Err(MediaError::UnsupportedCodec(uri.to_string()));
        }
        if options.alpha && !track.supports_alpha() {
            return Err(MediaError::AlphaUnsupported(uri.to_string()));
        }

        let shared_sink = track.create_sink(options.clone()).await?;
        info!(uri, duration = track.duration(), "decode session opened");

        Ok(Self {
            uri: uri.to_string(),
            source,
            track,
            shared_sink,
            sink_options: options,
        })
    }

    /// URI of the opened source.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The underlying source.
    pub fn source(&self) -> &Arc<dyn MediaSource> {
        &self.source
    }

    /// Track duration in seconds.
    pub fn duration(&self) -> f64 {
        self.track.duration()
    }

    /// Native pixel dimensions of the track.
    pub fn natural_size(&self) -> (u32, u32) {
        self.track.natural_size()
    }

    /// Native frame rate of the track.
    pub fn frame_rate(&self) -> FrameRate {
        self.track.frame_rate()
    }

    /// The sink shared by clips of this source.
    pub fn shared_sink(&self) -> Arc<dyn FrameSink> {
        Arc::clone(&self.shared_sink)
    }

    /// Create an isolated sink for a clip that cannot share the cursor.
    pub async fn create_dedicated_sink(&self) -> MediaResult<Arc<dyn FrameSink>> {
        debug!(uri = %self.uri, "creating dedicated sink");
        self.track.create_sink(self.sink_options.clone()).await
    }
}

impl Drop for DecodeSession {
    fn drop(&mut self) {
        debug!(uri = %self.uri, "decode session closed");
    }
}
