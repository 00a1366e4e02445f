//! Preview engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the preview engine, owned by the editor session via
/// [`PreviewContext`](crate::PreviewContext).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Per-asset decoded-frame cache capacity, in frames.
    pub frame_cache_capacity: usize,
    /// Thumbnail bitmap cache capacity (process-wide).
    pub thumbnail_capacity: usize,
    /// Keyframe-timestamp cache capacity (process-wide).
    pub keyframe_capacity: usize,
    /// Quantization grid for thumbnail time keys, in milliseconds.
    pub thumbnail_time_grid_ms: u64,
    /// Minimum timeline time between sink re-assignments (anti-thrash).
    pub min_sink_switch_interval: Duration,
    /// Deadline for a single decode operation; `None` disables.
    pub decode_timeout: Option<Duration>,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            frame_cache_capacity: 256,
            thumbnail_capacity: 800,
            keyframe_capacity: 2000,
            thumbnail_time_grid_ms: 500,
            min_sink_switch_interval: Duration::from_millis(100),
            decode_timeout: Some(Duration::from_secs(10)),
        }
    }
}
