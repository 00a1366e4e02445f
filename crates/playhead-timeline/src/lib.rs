//! Playhead Timeline - timeline data model for the preview engine
//!
//! The minimal slice of a timeline the decode core needs to read:
//! - Clips with timeline spans, trim offsets, and reversed playback
//! - Transitions and their coverage windows at clip boundaries
//! - The timeline-to-video time mapping
//! - Coverage queries answering "which clips of this source are visible
//!   right now", which drives shared vs. dedicated sink arbitration

pub mod clip;
pub mod track;
pub mod transition;

pub use clip::{map_timeline_to_video, VideoClip};
pub use track::{ClipCoverage, Track};
pub use transition::Transition;
