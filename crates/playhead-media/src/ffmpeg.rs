//! FFmpeg decode backend via ffmpeg-sidecar.
//!
//! Spawns FFmpeg as a subprocess per opened stream and ffprobe for
//! probing and packet queries. This works without FFmpeg development
//! headers; each `FrameStream` is backed by one decoder process feeding
//! a bounded channel, and closing the stream kills the process.

use crate::backend::{
    DecodeBackend, FrameSink, FrameStream, MediaSource, PacketReader, RawFrame, SinkOptions,
    VideoTrack,
};
use crate::error::{MediaError, MediaResult};
use crate::image::{PixelFormat, RawSurface};
use async_trait::async_trait;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::FfmpegEvent;
use playhead_core::FrameRate;
use serde::Deserialize;
use std::process::Command;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Codecs the subprocess decoder is known to handle.
const SUPPORTED_CODECS: &[&str] = &[
    "h264",
    "hevc",
    "vp8",
    "vp9",
    "av1",
    "prores",
    "mpeg2video",
    "mpeg4",
    "mjpeg",
    "dnxhd",
    "ffv1",
    "qtrle",
];

/// Window scanned backwards for keyframe queries, in seconds.
const KEYFRAME_SCAN_WINDOW: f64 = 10.0;

fn pix_fmt_has_alpha(pix_fmt: &str) -> bool {
    pix_fmt.contains("yuva")
        || pix_fmt.contains("rgba")
        || pix_fmt.contains("bgra")
        || pix_fmt.contains("argb")
        || pix_fmt.contains("abgr")
        || pix_fmt.contains("gbrap")
        || pix_fmt == "ya8"
        || pix_fmt == "ya16"
}

fn parse_frame_rate(raw: &str) -> Option<FrameRate> {
    let (num, den) = raw.split_once('/')?;
    let num: u32 = num.parse().ok()?;
    let den: u32 = den.parse().ok()?;
    if num == 0 || den == 0 {
        return None;
    }
    Some(FrameRate::new(num, den))
}

// ── ffprobe output ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

fn ffprobe_command() -> Command {
    Command::new(ffmpeg_sidecar::ffprobe::ffprobe_path())
}

fn run_probe(uri: &str) -> MediaResult<ProbeOutput> {
    let output = ffprobe_command()
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            uri,
        ])
        .output()
        .map_err(|e| MediaError::Probe(format!("ffprobe spawn failed: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MediaError::Open(format!(
            "{uri}: {}",
            stderr.trim().lines().last().unwrap_or("ffprobe failed")
        )));
    }
    serde_json::from_slice(&output.stdout)
        .map_err(|e| MediaError::Probe(format!("ffprobe output: {e}")))
}

// ── Backend ─────────────────────────────────────────────────────

/// Decode backend backed by FFmpeg subprocesses.
#[derive(Debug, Default)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DecodeBackend for FfmpegBackend {
    async fn open_source(&self, uri: &str) -> MediaResult<Arc<dyn MediaSource>> {
        let uri_owned = uri.to_string();
        let probe = tokio::task::spawn_blocking(move || run_probe(&uri_owned))
            .await
            .map_err(|e| MediaError::Probe(format!("probe task: {e}")))??;

        let container_duration = probe
            .format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .and_then(|d| d.parse::<f64>().ok());

        let video = probe
            .streams
            .into_iter()
            .find(|s| s.codec_type.as_deref() == Some("video"));

        let track = video.map(|s| {
            Arc::new(FfmpegTrack {
                uri: uri.to_string(),
                codec: s.codec_name.unwrap_or_default(),
                width: s.width.unwrap_or(0),
                height: s.height.unwrap_or(0),
                pix_fmt: s.pix_fmt.unwrap_or_default(),
                frame_rate: s
                    .avg_frame_rate
                    .as_deref()
                    .and_then(parse_frame_rate)
                    .unwrap_or_default(),
                duration: s
                    .duration
                    .as_deref()
                    .and_then(|d| d.parse::<f64>().ok())
                    .or(container_duration)
                    .unwrap_or(0.0),
            }) as Arc<dyn VideoTrack>
        });

        debug!(uri, has_video = track.is_some(), "source probed");
        Ok(Arc::new(FfmpegSource {
            uri: uri.to_string(),
            track,
        }))
    }
}

struct FfmpegSource {
    uri: String,
    track: Option<Arc<dyn VideoTrack>>,
}

#[async_trait]
impl MediaSource for FfmpegSource {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn primary_video_track(&self) -> Option<Arc<dyn VideoTrack>> {
        self.track.clone()
    }

    async fn open_packet_reader(&self) -> MediaResult<Box<dyn PacketReader>> {
        Ok(Box::new(FfprobePacketReader {
            uri: self.uri.clone(),
        }))
    }
}

struct FfmpegTrack {
    uri: String,
    codec: String,
    width: u32,
    height: u32,
    pix_fmt: String,
    frame_rate: FrameRate,
    duration: f64,
}

#[async_trait]
impl VideoTrack for FfmpegTrack {
    fn codec_supported(&self) -> bool {
        SUPPORTED_CODECS.contains(&self.codec.as_str())
    }

    fn supports_alpha(&self) -> bool {
        pix_fmt_has_alpha(&self.pix_fmt)
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn natural_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    async fn create_sink(&self, options: SinkOptions) -> MediaResult<Arc<dyn FrameSink>> {
        Ok(Arc::new(FfmpegSink {
            uri: self.uri.clone(),
            options,
        }))
    }
}

// ── Sink and stream ─────────────────────────────────────────────

struct FfmpegSink {
    uri: String,
    options: SinkOptions,
}

#[async_trait]
impl FrameSink for FfmpegSink {
    async fn open(&self, start_seconds: f64) -> MediaResult<Box<dyn FrameStream>> {
        let capacity = self.options.pool_size.max(1);
        let (tx, rx) = mpsc::channel::<MediaResult<RawFrame>>(capacity);

        let uri = self.uri.clone();
        let fit = self.options.fit;
        let start = start_seconds.max(0.0);

        // One decoder process per stream; the reader thread exits when
        // the receiver is closed or the process finishes.
        std::thread::Builder::new()
            .name("ffmpeg-stream".into())
            .spawn(move || decode_thread(uri, start, fit, tx))
            .map_err(|e| MediaError::SinkCreation(e.to_string()))?;

        Ok(Box::new(FfmpegStream { rx, closed: false }))
    }
}

fn decode_thread(
    uri: String,
    start: f64,
    fit: Option<(u32, u32)>,
    tx: mpsc::Sender<MediaResult<RawFrame>>,
) {
    let mut cmd = FfmpegCommand::new();
    cmd.args(["-ss", &format!("{start:.6}")]).input(&uri);
    cmd.args(["-an", "-sn"]);
    if let Some((w, h)) = fit {
        cmd.args(["-vf", &format!("scale={w}:{h}")]);
    }
    cmd.args(["-f", "rawvideo", "-pix_fmt", "rgba"]).output("-");

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            let _ = tx.blocking_send(Err(MediaError::Decode(format!("ffmpeg spawn: {e}"))));
            return;
        }
    };
    let iter = match child.iter() {
        Ok(iter) => iter,
        Err(e) => {
            let _ = child.kill();
            let _ = tx.blocking_send(Err(MediaError::Decode(format!("ffmpeg events: {e}"))));
            return;
        }
    };

    for event in iter {
        match event {
            FfmpegEvent::OutputFrame(frame) => {
                let surface = match RawSurface::new(
                    frame.width,
                    frame.height,
                    PixelFormat::Rgba8,
                    frame.data.into(),
                ) {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = tx.blocking_send(Err(e));
                        break;
                    }
                };
                // Input seeking restarts output timestamps at zero.
                let raw = RawFrame {
                    surface,
                    timestamp: start + frame.timestamp as f64,
                };
                if tx.blocking_send(Ok(raw)).is_err() {
                    // Consumer closed the stream.
                    break;
                }
            }
            FfmpegEvent::Error(e) => {
                warn!(uri = %uri, error = %e, "ffmpeg decode error");
                let _ = tx.blocking_send(Err(MediaError::Decode(e)));
                break;
            }
            _ => {}
        }
    }
    let _ = child.kill();
}

struct FfmpegStream {
    rx: mpsc::Receiver<MediaResult<RawFrame>>,
    closed: bool,
}

#[async_trait]
impl FrameStream for FfmpegStream {
    async fn next_frame(&mut self) -> MediaResult<Option<RawFrame>> {
        if self.closed {
            return Ok(None);
        }
        match self.rx.recv().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => {
                self.close();
                Err(e)
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        // Closing the receiver makes the decode thread's next send fail,
        // which kills the subprocess.
        self.rx.close();
        self.closed = true;
    }
}

// ── Packet reader ───────────────────────────────────────────────

/// Keyframe queries via ffprobe packet listings.
///
/// The reader is the per-source "packet session": constructed once and
/// reused. Each query scans a bounded interval before the target time.
struct FfprobePacketReader {
    uri: String,
}

fn scan_keyframes(uri: &str, seconds: f64) -> MediaResult<f64> {
    let from = (seconds - KEYFRAME_SCAN_WINDOW).max(0.0);
    let output = ffprobe_command()
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "packet=pts_time,flags",
            "-of",
            "csv=p=0",
            "-read_intervals",
            &format!("{from:.6}%{:.6}", seconds + 0.001),
            uri,
        ])
        .output()
        .map_err(|e| MediaError::Probe(format!("ffprobe spawn failed: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MediaError::Probe(stderr.trim().to_string()));
    }

    let mut best: Option<f64> = None;
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        let mut fields = line.split(',');
        let (Some(pts), Some(flags)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Ok(pts) = pts.parse::<f64>() else {
            continue;
        };
        if flags.contains('K') && pts <= seconds && best.map_or(true, |b| pts > b) {
            best = Some(pts);
        }
    }
    // No keyframe in the scan window: fall back to the stream start.
    Ok(best.unwrap_or(0.0))
}

#[async_trait]
impl PacketReader for FfprobePacketReader {
    async fn nearest_keyframe_before(&mut self, seconds: f64) -> MediaResult<f64> {
        let uri = self.uri.clone();
        tokio::task::spawn_blocking(move || scan_keyframes(&uri, seconds))
            .await
            .map_err(|e| MediaError::Probe(format!("keyframe task: {e}")))?
    }
}
