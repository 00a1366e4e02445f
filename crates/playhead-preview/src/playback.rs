//! Per-clip playback state machine.
//!
//! Three phases: `Idle`, `Seeking`, `Streaming`. Seeks are idempotent
//! per frame-aligned target, coalesce while one is in flight (only the
//! most recent pending target survives), and consult the asset's frame
//! cache before opening any decode stream. Streaming keeps exactly one
//! read-ahead frame so frame stepping never stalls on the decoder.
//!
//! Every async operation captures the playback epoch when it starts and
//! re-checks it after each await; a mismatch means the work was
//! superseded and its result is dropped without touching visible state.
//! The one exception is a fully decoded frame, which is harmless to
//! cache.

use crate::asset::VideoAsset;
use crate::error::{PreviewError, PreviewResult};
use parking_lot::Mutex;
use playhead_core::{FrameKey, FrameRate};
use playhead_media::{FrameSink, FrameStream, FrameUploader, ImageHandle, MediaResult};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// A displayed frame: the drawable image and its source timestamp.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: ImageHandle,
    /// Source video time in seconds.
    pub timestamp: f64,
}

/// Observable phase of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    Idle,
    Seeking,
    Streaming,
}

#[derive(Default)]
struct SeekState {
    is_seeking: bool,
    last_seek_key: Option<FrameKey>,
    pending_seek_time: Option<f64>,
}

struct StreamState {
    stream: Box<dyn FrameStream>,
    read_ahead: Option<Frame>,
}

/// Drives seek and streaming playback for one clip instance against a
/// chosen sink.
pub struct ClipPlayback {
    asset: Arc<VideoAsset>,
    uploader: Arc<dyn FrameUploader>,
    timeline_rate: FrameRate,
    decode_timeout: Option<Duration>,
    epoch: AtomicU64,
    epoch_tx: watch::Sender<u64>,
    frame_tx: watch::Sender<Option<Frame>>,
    seek: Mutex<SeekState>,
    stream: tokio::sync::Mutex<Option<StreamState>>,
    streaming_active: AtomicBool,
    step_in_flight: AtomicBool,
}

impl ClipPlayback {
    pub fn new(
        asset: Arc<VideoAsset>,
        uploader: Arc<dyn FrameUploader>,
        timeline_rate: FrameRate,
        decode_timeout: Option<Duration>,
    ) -> Self {
        let (epoch_tx, _) = watch::channel(0);
        let (frame_tx, _) = watch::channel(None);
        Self {
            asset,
            uploader,
            timeline_rate,
            decode_timeout,
            epoch: AtomicU64::new(0),
            epoch_tx,
            frame_tx,
            seek: Mutex::new(SeekState::default()),
            stream: tokio::sync::Mutex::new(None),
            streaming_active: AtomicBool::new(false),
            step_in_flight: AtomicBool::new(false),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> PlaybackPhase {
        if self.streaming_active.load(Ordering::SeqCst) {
            PlaybackPhase::Streaming
        } else if self.seek.lock().is_seeking {
            PlaybackPhase::Seeking
        } else {
            PlaybackPhase::Idle
        }
    }

    /// The most recently displayed frame.
    pub fn current_frame(&self) -> Option<Frame> {
        self.frame_tx.borrow().clone()
    }

    /// Subscribe to displayed-frame updates.
    pub fn subscribe_frames(&self) -> watch::Receiver<Option<Frame>> {
        self.frame_tx.subscribe()
    }

    /// Current playback epoch. A bump signals "state was reset,
    /// re-sync".
    pub fn playback_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Subscribe to epoch bumps.
    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> {
        self.epoch_tx.subscribe()
    }

    /// Advance the epoch, invalidating every in-flight async result.
    pub fn bump_epoch(&self) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.epoch_tx.send(epoch);
        epoch
    }

    /// Seek to video time `seconds` through `sink`.
    ///
    /// No-op when the frame-aligned target equals the last completed
    /// seek. While a seek is in flight, later targets replace each
    /// other and only the most recent runs once the current one
    /// settles.
    pub async fn seek_to_time(
        &self,
        sink: &Arc<dyn FrameSink>,
        seconds: f64,
    ) -> PreviewResult<()> {
        let mut target = self.timeline_rate.align_seconds(seconds.max(0.0));
        {
            let mut seek = self.seek.lock();
            let key = self.timeline_rate.frame_key(target);
            if seek.is_seeking {
                seek.pending_seek_time = Some(target);
                return Ok(());
            }
            if seek.last_seek_key == Some(key) {
                return Ok(());
            }
            seek.is_seeking = true;
        }

        loop {
            let key = self.timeline_rate.frame_key(target);
            let outcome = self.seek_once(sink, target, key).await;
            if let Err(error) = &outcome {
                warn!(target, %error, "seek failed");
            }

            let next = {
                let mut seek = self.seek.lock();
                // A superseded seek never published its frame, so its
                // target must not be recorded as completed: the next
                // seek to the same time has to publish from cache.
                if matches!(outcome, Ok(true)) {
                    seek.last_seek_key = Some(key);
                }
                match seek.pending_seek_time.take() {
                    Some(pending)
                        if Some(self.timeline_rate.frame_key(pending)) != seek.last_seek_key =>
                    {
                        Some(pending)
                    }
                    _ => {
                        seek.is_seeking = false;
                        None
                    }
                }
            };
            match next {
                Some(pending) => target = self.timeline_rate.align_seconds(pending),
                None => return outcome.map(|_| ()),
            }
        }
    }

    /// Resolve one seek target, returning whether the result was
    /// actually published. `Ok(false)` means the epoch moved on while
    /// the frame was decoding.
    async fn seek_once(
        &self,
        sink: &Arc<dyn FrameSink>,
        target: f64,
        key: FrameKey,
    ) -> PreviewResult<bool> {
        // Fast path: a frame-aligned hit needs no decode at all.
        if let Some(image) = self.asset.frame_cache.get(key) {
            let _ = self.frame_tx.send(Some(Frame {
                image,
                timestamp: target,
            }));
            return Ok(true);
        }

        let epoch = self.bump_epoch();

        // One frame from a transient stream, discarded afterwards.
        let mut stream = self.with_timeout(sink.open(target)).await?;
        let pulled = self.with_timeout(stream.next_frame()).await;
        stream.close();
        let Some(raw) = pulled? else {
            debug!(target, "seek past end of stream");
            return Ok(true);
        };

        let image = self.uploader.wrap(raw.surface)?;
        // The frame is fully decoded; caching it is harmless even if
        // this seek has been superseded meanwhile.
        self.asset.frame_cache.store(key, image.clone());

        if self.playback_epoch() != epoch {
            debug!(target, "seek result superseded");
            return Ok(false);
        }
        let _ = self.frame_tx.send(Some(Frame {
            image,
            timestamp: raw.timestamp,
        }));
        Ok(true)
    }

    /// Open a persistent frame sequence at `seconds`, display its first
    /// frame, and buffer one frame of read-ahead. No-op when already
    /// streaming.
    pub async fn start_playback(
        &self,
        sink: &Arc<dyn FrameSink>,
        seconds: f64,
    ) -> PreviewResult<()> {
        if self.streaming_active.load(Ordering::SeqCst) {
            return Ok(());
        }
        let epoch = self.playback_epoch();

        let mut guard = self.stream.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let mut stream = self.with_timeout(sink.open(seconds.max(0.0))).await?;

        let first = match self.with_timeout(stream.next_frame()).await {
            Ok(frame) => frame,
            Err(error) => {
                stream.close();
                return Err(error);
            }
        };
        let Some(first) = first else {
            stream.close();
            debug!(seconds, "stream empty at playback start");
            return Ok(());
        };
        let first_image = self.uploader.wrap(first.surface)?;

        // Eagerly read one frame ahead so the first step never stalls.
        let read_ahead = match self.with_timeout(stream.next_frame()).await {
            Ok(Some(raw)) => Some(Frame {
                image: self.uploader.wrap(raw.surface)?,
                timestamp: raw.timestamp,
            }),
            Ok(None) => None,
            Err(error) => {
                warn!(%error, "read-ahead failed at playback start");
                None
            }
        };

        if self.playback_epoch() != epoch {
            stream.close();
            debug!(seconds, "playback start superseded");
            return Ok(());
        }

        let _ = self.frame_tx.send(Some(Frame {
            image: first_image,
            timestamp: first.timestamp,
        }));
        *guard = Some(StreamState { stream, read_ahead });
        self.streaming_active.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// While streaming, display the last buffered frame whose timestamp
    /// is `<= target`, refilling the read-ahead buffer as frames are
    /// consumed. A single in-flight step is enforced; re-entrant calls
    /// return `None` so frames are never applied out of order.
    pub async fn get_next_frame(&self, target: f64) -> PreviewResult<Option<Frame>> {
        if !self.streaming_active.load(Ordering::SeqCst) {
            return Ok(None);
        }
        if self.step_in_flight.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }
        let result = self.step(target).await;
        self.step_in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn step(&self, target: f64) -> PreviewResult<Option<Frame>> {
        let epoch = self.playback_epoch();
        let mut guard = self.stream.lock().await;
        let Some(state) = guard.as_mut() else {
            return Ok(None);
        };

        let mut shown: Option<Frame> = None;
        while state
            .read_ahead
            .as_ref()
            .map_or(false, |frame| frame.timestamp <= target)
        {
            shown = state.read_ahead.take();
            state.read_ahead = match self.with_timeout(state.stream.next_frame()).await {
                Ok(Some(raw)) => Some(Frame {
                    image: self.uploader.wrap(raw.surface)?,
                    timestamp: raw.timestamp,
                }),
                Ok(None) => None,
                Err(error) => {
                    warn!(%error, "read-ahead refill failed");
                    None
                }
            };
            if self.playback_epoch() != epoch {
                debug!(target, "frame step superseded");
                return Ok(None);
            }
        }

        match shown {
            Some(frame) => {
                let _ = self.frame_tx.send(Some(frame.clone()));
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    /// Close the frame sequence and return to `Idle`.
    pub async fn stop_playback(&self) {
        let mut guard = self.stream.lock().await;
        if let Some(mut state) = guard.take() {
            state.stream.close();
            state.read_ahead = None;
        }
        self.streaming_active.store(false, Ordering::SeqCst);
    }

    /// Force `Idle` and discard all in-flight work. Called on clip
    /// disposal and on sink switches.
    pub async fn dispose(&self) {
        self.bump_epoch();
        self.stop_playback().await;
        let mut seek = self.seek.lock();
        seek.is_seeking = false;
        seek.pending_seek_time = None;
        seek.last_seek_key = None;
    }

    /// The asset this playback decodes from.
    pub fn asset(&self) -> &Arc<VideoAsset> {
        &self.asset
    }

    async fn with_timeout<O, F>(&self, operation: F) -> PreviewResult<O>
    where
        F: Future<Output = MediaResult<O>>,
    {
        match self.decode_timeout {
            Some(deadline) => match tokio::time::timeout(deadline, operation).await {
                Ok(result) => result.map_err(PreviewError::from),
                Err(_) => Err(PreviewError::DecodeTimeout(deadline)),
            },
            None => operation.await.map_err(PreviewError::from),
        }
    }
}
