//! Shared vs. dedicated sink arbitration.
//!
//! A decode sink has one cursor; opening a stream moves it. When two
//! clips of the same source are simultaneously visible they would steal
//! each other's cursor, so exactly one of the covered clips (the
//! earliest-starting, ties broken by clip id) keeps the asset's shared
//! sink and the rest get dedicated sinks. Assignment is re-evaluated as
//! the display time moves, rate-limited so scrubbing across a boundary
//! does not thrash sink creation.

use playhead_core::RationalTime;
use playhead_media::{DecodeSession, FrameSink};
use playhead_timeline::ClipCoverage;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Which sink a clip should decode through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkAssignment {
    /// The asset's shared sink.
    Shared,
    /// An isolated per-clip sink.
    Dedicated,
}

/// Pure assignment decision for one clip given the coverage of every
/// clip referencing the same source.
pub fn decide(coverage: &[ClipCoverage], clip_id: Uuid) -> SinkAssignment {
    let mut covered: Vec<&ClipCoverage> = coverage.iter().filter(|c| c.covered).collect();
    if covered.len() < 2 || !covered.iter().any(|c| c.clip_id == clip_id) {
        return SinkAssignment::Shared;
    }
    covered.sort_by(|a, b| a.start.cmp(&b.start).then(a.clip_id.cmp(&b.clip_id)));
    if covered[0].clip_id == clip_id {
        SinkAssignment::Shared
    } else {
        SinkAssignment::Dedicated
    }
}

/// Per-clip arbitration state: current assignment, the cached dedicated
/// sink, and the anti-thrash clock.
pub struct SinkArbitrator {
    clip_id: Uuid,
    min_interval: Duration,
    last_evaluated: Option<RationalTime>,
    assignment: SinkAssignment,
    dedicated: Option<Arc<dyn FrameSink>>,
}

impl SinkArbitrator {
    pub fn new(clip_id: Uuid, min_interval: Duration) -> Self {
        Self {
            clip_id,
            min_interval,
            last_evaluated: None,
            assignment: SinkAssignment::Shared,
            dedicated: None,
        }
    }

    /// Current assignment.
    pub fn assignment(&self) -> SinkAssignment {
        self.assignment
    }

    /// Whether a dedicated sink is currently cached.
    pub fn has_dedicated(&self) -> bool {
        self.dedicated.is_some()
    }

    /// Re-evaluate the assignment at timeline time `at`. Returns `true`
    /// when the assignment changed, in which case the caller must stop
    /// playback and bump the playback epoch so dependent render state
    /// resets cleanly.
    ///
    /// Evaluations closer together than the configured minimum interval
    /// of timeline time keep the previous assignment.
    pub fn evaluate(&mut self, at: RationalTime, coverage: &[ClipCoverage]) -> bool {
        if let Some(last) = self.last_evaluated {
            if (at - last).abs().to_seconds_f64() < self.min_interval.as_secs_f64() {
                return false;
            }
        }
        self.last_evaluated = Some(at);

        let next = decide(coverage, self.clip_id);
        if next == self.assignment {
            return false;
        }
        if next == SinkAssignment::Shared {
            // Overlap ended; the isolated cursor is no longer needed.
            self.dedicated = None;
        }
        debug!(clip = %self.clip_id, ?next, "sink assignment switched");
        self.assignment = next;
        true
    }

    /// The sink this clip should decode through right now. Lazily
    /// creates and caches the dedicated sink; creation failure falls
    /// back to the shared sink.
    pub async fn sink(&mut self, session: &DecodeSession) -> Arc<dyn FrameSink> {
        match self.assignment {
            SinkAssignment::Shared => session.shared_sink(),
            SinkAssignment::Dedicated => {
                if let Some(sink) = &self.dedicated {
                    return Arc::clone(sink);
                }
                match session.create_dedicated_sink().await {
                    Ok(sink) => {
                        self.dedicated = Some(Arc::clone(&sink));
                        sink
                    }
                    Err(error) => {
                        warn!(clip = %self.clip_id, %error, "dedicated sink creation failed; using shared sink");
                        session.shared_sink()
                    }
                }
            }
        }
    }

    /// Drop arbitration state (clip disposed).
    pub fn reset(&mut self) {
        self.dedicated = None;
        self.assignment = SinkAssignment::Shared;
        self.last_evaluated = None;
    }
}
