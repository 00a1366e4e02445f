//! Tracks and coverage queries.

use crate::clip::VideoClip;
use crate::transition::Transition;
use playhead_core::{FrameRate, RationalTime};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use uuid::Uuid;

/// Coverage of one clip at a display time, as seen by sink arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipCoverage {
    /// The clip instance.
    pub clip_id: Uuid,
    /// The clip's timeline start (arbitration prefers earlier starts).
    pub start: RationalTime,
    /// Whether the display time falls in the clip's span or in a
    /// transition window involving it.
    pub covered: bool,
}

/// A track holding video clips and the transitions between them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Track {
    /// Track ID.
    pub id: Uuid,
    /// Track name (displayed in UI).
    pub name: String,
    /// Clips, in timeline order.
    pub clips: Vec<VideoClip>,
    /// Transitions between adjacent clips.
    pub transitions: Vec<Transition>,
}

impl Track {
    /// Create an empty track.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            clips: Vec::new(),
            transitions: Vec::new(),
        }
    }

    /// Look up a clip by id.
    pub fn clip(&self, id: Uuid) -> Option<&VideoClip> {
        self.clips.iter().find(|c| c.id == id)
    }

    /// Whether `clip` is covered at `at`: either the time is inside the
    /// clip's own span, or inside the window of a transition whose
    /// boundary involves this clip.
    pub fn is_covered(&self, clip: &VideoClip, at: RationalTime, rate: FrameRate) -> bool {
        if !clip.enabled {
            return false;
        }
        if clip.span().contains(at) {
            return true;
        }
        self.transitions
            .iter()
            .any(|t| t.involves(clip.id) && t.window(rate).contains(at))
    }

    /// Coverage of every enabled clip referencing `source_uri` at `at`.
    ///
    /// This is the input to sink arbitration: when two or more entries
    /// come back covered, they cannot share one decode cursor.
    pub fn coverage_for_source(
        &self,
        source_uri: &str,
        at: RationalTime,
        rate: FrameRate,
    ) -> SmallVec<[ClipCoverage; 4]> {
        self.clips
            .iter()
            .filter(|c| c.enabled && c.source_uri == source_uri)
            .map(|c| ClipCoverage {
                clip_id: c.id,
                start: c.start,
                covered: self.is_covered(c, at, rate),
            })
            .collect()
    }
}
