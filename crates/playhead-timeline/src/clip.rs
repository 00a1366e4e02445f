//! Clip types for the timeline.

use playhead_core::{RationalTime, TimeRange};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A video clip on the timeline.
///
/// References a media source by URI; several clips may reference the
/// same source, which is what makes sink arbitration necessary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoClip {
    /// Unique clip instance ID. Also the stable tie-break in sink
    /// arbitration.
    pub id: Uuid,
    /// URI of the source media.
    pub source_uri: String,
    /// Start time on the timeline.
    pub start: RationalTime,
    /// Duration on the timeline.
    pub duration: RationalTime,
    /// Trim-in into the source, in seconds (>= 0).
    pub source_offset: RationalTime,
    /// Explicit trimmed source duration. `None` means the remainder of
    /// the source past `source_offset`.
    pub clip_duration: Option<RationalTime>,
    /// Play the source backwards.
    pub reversed: bool,
    /// Is clip enabled.
    pub enabled: bool,
}

impl VideoClip {
    /// Create a clip at `start` playing `duration` of the source.
    pub fn new(source_uri: impl Into<String>, start: RationalTime, duration: RationalTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_uri: source_uri.into(),
            start,
            duration,
            source_offset: RationalTime::ZERO,
            clip_duration: None,
            reversed: false,
            enabled: true,
        }
    }

    /// The clip's span on the timeline.
    pub fn span(&self) -> TimeRange {
        TimeRange::new(self.start, self.duration)
    }

    /// Longest timeline duration this clip may be trimmed out to, given
    /// the source's duration. Recomputed whenever the trim offset moves.
    pub fn max_duration(&self, video_duration: f64) -> f64 {
        (video_duration - self.source_offset.to_seconds_f64()).max(0.0)
    }

    /// Map a timeline time to the source video time for this clip.
    pub fn video_time(&self, timeline_time: f64, video_duration: f64) -> f64 {
        map_timeline_to_video(
            self.start.to_seconds_f64(),
            timeline_time,
            self.source_offset.to_seconds_f64(),
            self.clip_duration.map(RationalTime::to_seconds_f64),
            video_duration,
            self.reversed,
        )
    }
}

/// Map a timeline time to a source video time.
///
/// `relative` is the time into the clip; forward clips read at
/// `offset + relative`, reversed clips read back from the trimmed end.
/// The result always clamps into `[0, video_duration]`.
pub fn map_timeline_to_video(
    start: f64,
    timeline_time: f64,
    offset: f64,
    clip_duration: Option<f64>,
    video_duration: f64,
    reversed: bool,
) -> f64 {
    let relative = timeline_time - start;
    let clip_duration = clip_duration.unwrap_or(video_duration - offset);
    let video_time = if reversed {
        offset + clip_duration - relative
    } else {
        offset + relative
    };
    video_time.clamp(0.0, video_duration)
}
