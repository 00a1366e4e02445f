//! Playhead Media - decode backend abstraction
//!
//! Treats the container/demuxer library as an opaque decoder backend:
//! a backend opens a source, reports video-track/codec support, and
//! creates sinks that produce cancellable sequences of timestamped
//! frames from an arbitrary start time. Multiple independent sinks over
//! the same source may exist at once, which is what sink arbitration in
//! the preview crate builds on.
//!
//! Ships one real backend over FFmpeg (via ffmpeg-sidecar subprocesses)
//! behind the same traits the preview engine is tested against.

pub mod backend;
pub mod error;
pub mod ffmpeg;
pub mod image;
pub mod session;

pub use backend::{
    DecodeBackend, FrameSink, FrameStream, MediaSource, PacketReader, RawFrame, SinkOptions,
    VideoTrack,
};
pub use error::{MediaError, MediaResult};
pub use ffmpeg::FfmpegBackend;
pub use image::{FrameUploader, ImageHandle, PixelFormat, RawSurface, SoftwareUploader};
pub use session::DecodeSession;
