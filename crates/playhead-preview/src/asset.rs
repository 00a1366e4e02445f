//! The registry-managed asset: a decode session plus its frame cache.

use crate::frame_cache::FrameCache;
use playhead_media::{DecodeBackend, DecodeSession, MediaResult, SinkOptions};

/// What the asset registry shares between clips of one source: the open
/// decode session and the per-asset frame cache. Both live exactly as
/// long as the registry entry.
pub struct VideoAsset {
    pub session: DecodeSession,
    pub frame_cache: FrameCache,
}

impl VideoAsset {
    /// Open a decode session and attach a fresh frame cache.
    pub async fn open(
        backend: &dyn DecodeBackend,
        uri: &str,
        options: SinkOptions,
        frame_cache_capacity: usize,
    ) -> MediaResult<Self> {
        let session = DecodeSession::open(backend, uri, options).await?;
        Ok(Self {
            session,
            frame_cache: FrameCache::new(frame_cache_capacity),
        })
    }
}
