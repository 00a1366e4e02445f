//! Playhead Core - shared time primitives
//!
//! Frame-accurate time handling for the preview engine:
//! - Rational time values to avoid floating-point drift
//! - Frame rates and frame-grid quantization
//! - Time ranges for clip spans and transition windows
//!
//! Every cache in the preview engine keys on times quantized to the
//! timeline's frame grid, so repeated lookups with sub-frame jitter
//! resolve to the same entry.

pub mod time;

pub use time::{FrameKey, FrameRate, RationalTime, TimeRange};
