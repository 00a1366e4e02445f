//! Clip instance lifecycle: acquire asset, arbitrate sink, drive
//! playback, expose error state.
//!
//! Failures inside the core never cross this boundary as errors; they
//! become `has_error` plus a human-readable message and the clip
//! renders a placeholder. Unsupported sources are not retried; decode
//! failures clear their flags so the next time change retries
//! naturally.

use crate::arbitrator::{SinkArbitrator, SinkAssignment};
use crate::asset::VideoAsset;
use crate::context::PreviewContext;
use crate::error::{PreviewError, PreviewResult};
use crate::playback::{ClipPlayback, Frame, PlaybackPhase};
use crate::registry::AssetHandle;
use playhead_core::{FrameRate, RationalTime};
use playhead_media::SinkOptions;
use playhead_timeline::{ClipCoverage, VideoClip};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// A video clip's live preview state: one per clip on the timeline.
pub struct VideoClipInstance {
    ctx: Arc<PreviewContext>,
    clip: VideoClip,
    timeline_rate: FrameRate,
    handle: Option<AssetHandle<VideoAsset>>,
    playback: Option<Arc<ClipPlayback>>,
    arbitrator: SinkArbitrator,
    error: Option<String>,
}

impl VideoClipInstance {
    pub fn new(ctx: Arc<PreviewContext>, clip: VideoClip, timeline_rate: FrameRate) -> Self {
        let arbitrator = SinkArbitrator::new(clip.id, ctx.config().min_sink_switch_interval);
        Self {
            ctx,
            clip,
            timeline_rate,
            handle: None,
            playback: None,
            arbitrator,
            error: None,
        }
    }

    /// Acquire the shared asset, pick a sink, and perform the initial
    /// seek. Errors land in the clip's error state instead of
    /// propagating.
    pub async fn init(&mut self, display_time: RationalTime, coverage: &[ClipCoverage]) {
        if let Err(error) = self.try_init(display_time, coverage).await {
            warn!(clip = %self.clip.id, source = %self.clip.source_uri, %error, "clip init failed");
            self.error = Some(error.to_string());
        }
    }

    async fn try_init(
        &mut self,
        display_time: RationalTime,
        coverage: &[ClipCoverage],
    ) -> PreviewResult<()> {
        let handle = self
            .ctx
            .acquire_video_asset(&self.clip.source_uri, SinkOptions::default())
            .await?;
        let asset = Arc::clone(handle.asset());
        let playback = Arc::new(ClipPlayback::new(
            asset,
            Arc::clone(self.ctx.uploader()),
            self.timeline_rate,
            self.ctx.config().decode_timeout,
        ));

        self.handle = Some(handle);
        self.playback = Some(playback);
        self.error = None;
        info!(clip = %self.clip.id, source = %self.clip.source_uri, "clip initialized");

        self.arbitrator.evaluate(display_time, coverage);
        self.seek_to_display_time(display_time).await
    }

    /// Re-run sink arbitration at `display_time`. A switch stops
    /// playback and bumps the epoch so dependent render state resets.
    pub async fn sync_assignment(
        &mut self,
        display_time: RationalTime,
        coverage: &[ClipCoverage],
    ) {
        if !self.arbitrator.evaluate(display_time, coverage) {
            return;
        }
        if let Some(playback) = &self.playback {
            playback.stop_playback().await;
            playback.bump_epoch();
        }
    }

    /// Seek to the video time mapped from `display_time`.
    pub async fn seek_to_display_time(&mut self, display_time: RationalTime) -> PreviewResult<()> {
        let playback = self.playback()?;
        let video_time = self
            .clip
            .video_time(display_time.to_seconds_f64(), playback.asset().session.duration());
        let sink = self.sink().await?;
        let result = playback.seek_to_time(&sink, video_time).await;
        if let Err(error) = &result {
            // Transient decode failures retry on the next time change.
            warn!(clip = %self.clip.id, %error, "seek failed");
        }
        result
    }

    /// Begin streaming playback from `display_time`.
    pub async fn start_playback(&mut self, display_time: RationalTime) -> PreviewResult<()> {
        let playback = self.playback()?;
        let video_time = self
            .clip
            .video_time(display_time.to_seconds_f64(), playback.asset().session.duration());
        let sink = self.sink().await?;
        playback.start_playback(&sink, video_time).await
    }

    /// Advance streaming playback toward `display_time`.
    pub async fn get_next_frame(
        &mut self,
        display_time: RationalTime,
    ) -> PreviewResult<Option<Frame>> {
        let playback = self.playback()?;
        let target = self
            .clip
            .video_time(display_time.to_seconds_f64(), playback.asset().session.duration());
        playback.get_next_frame(target).await
    }

    /// Stop streaming playback.
    pub async fn stop_playback(&mut self) {
        if let Some(playback) = &self.playback {
            playback.stop_playback().await;
        }
    }

    /// Release the asset and cancel all in-flight work.
    pub async fn dispose(&mut self) {
        if let Some(playback) = self.playback.take() {
            playback.dispose().await;
        }
        self.arbitrator.reset();
        if let Some(handle) = self.handle.take() {
            handle.release();
        }
        info!(clip = %self.clip.id, "clip disposed");
    }

    /// Move the clip's trim-in. Returns the new maximum timeline
    /// duration the clip may be trimmed out to.
    pub fn set_source_offset(&mut self, offset: RationalTime) -> Option<f64> {
        self.clip.source_offset = offset;
        self.playback
            .as_ref()
            .map(|p| self.clip.max_duration(p.asset().session.duration()))
    }

    // ── Read-only state for the renderer ───────────────────────

    pub fn clip_id(&self) -> Uuid {
        self.clip.id
    }

    pub fn clip(&self) -> &VideoClip {
        &self.clip
    }

    pub fn is_ready(&self) -> bool {
        self.playback.is_some() && self.error.is_none()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn current_frame(&self) -> Option<Frame> {
        self.playback.as_ref().and_then(|p| p.current_frame())
    }

    pub fn video_duration(&self) -> Option<f64> {
        self.playback.as_ref().map(|p| p.asset().session.duration())
    }

    pub fn playback_epoch(&self) -> u64 {
        self.playback
            .as_ref()
            .map_or(0, |p| p.playback_epoch())
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.playback
            .as_ref()
            .map_or(PlaybackPhase::Idle, |p| p.phase())
    }

    pub fn sink_assignment(&self) -> SinkAssignment {
        self.arbitrator.assignment()
    }

    /// Whether a dedicated sink is currently alive for this clip.
    pub fn has_dedicated_sink(&self) -> bool {
        self.arbitrator.has_dedicated()
    }

    fn playback(&self) -> PreviewResult<Arc<ClipPlayback>> {
        self.playback
            .as_ref()
            .map(Arc::clone)
            .ok_or(PreviewError::NotInitialized)
    }

    async fn sink(&mut self) -> PreviewResult<Arc<dyn playhead_media::FrameSink>> {
        let playback = self.playback()?;
        Ok(self
            .arbitrator
            .sink(&playback.asset().session)
            .await)
    }
}
