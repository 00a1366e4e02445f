//! Transitions at clip boundaries.

use playhead_core::{FrameRate, RationalTime, TimeRange};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A transition spanning the boundary between two clips.
///
/// While the display time is inside the transition window, both of the
/// involved clips are considered covered for sink arbitration even if
/// the time has left their own span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    /// Unique transition ID.
    pub id: Uuid,
    /// Clip transitioning out.
    pub from_clip: Uuid,
    /// Clip transitioning in.
    pub into_clip: Uuid,
    /// The boundary time the transition straddles.
    pub boundary: RationalTime,
    /// Total transition duration.
    pub duration: RationalTime,
}

impl Transition {
    /// Create a transition at `boundary` between two clips.
    pub fn new(
        from_clip: Uuid,
        into_clip: Uuid,
        boundary: RationalTime,
        duration: RationalTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            from_clip,
            into_clip,
            boundary,
            duration,
        }
    }

    /// Whether the given clip is one of this transition's endpoints.
    pub fn involves(&self, clip_id: Uuid) -> bool {
        self.from_clip == clip_id || self.into_clip == clip_id
    }

    /// The coverage window `[boundary - floor(d/2), boundary + ceil(d/2))`.
    ///
    /// The floor/ceil split is taken in whole timeline frames so the
    /// window stays on the frame grid.
    pub fn window(&self, rate: FrameRate) -> TimeRange {
        let total_frames = rate.frames_in(self.duration.to_seconds_f64());
        let lead = total_frames / 2;
        let tail = total_frames - lead;
        TimeRange::from_start_end(
            self.boundary - RationalTime::from_frames(lead, rate),
            self.boundary + RationalTime::from_frames(tail, rate),
        )
    }
}
