//! Explicitly constructed preview context.
//!
//! Owns the asset registry and the process-wide caches. One context per
//! editor session, passed by reference to clip instances; there is no
//! module-level singleton, which keeps tests isolated and cheap.

use crate::asset::VideoAsset;
use crate::config::PreviewConfig;
use crate::error::PreviewResult;
use crate::registry::{AssetHandle, AssetKind, AssetRegistry};
use crate::thumbnail::ThumbnailCache;
use playhead_media::{DecodeBackend, FrameUploader, SinkOptions};
use std::sync::Arc;
use tracing::debug;

/// Shared services of one preview session.
pub struct PreviewContext {
    backend: Arc<dyn DecodeBackend>,
    uploader: Arc<dyn FrameUploader>,
    config: PreviewConfig,
    registry: AssetRegistry<VideoAsset>,
    thumbnails: ThumbnailCache,
}

impl PreviewContext {
    /// Build a context over a backend and an uploader.
    pub fn new(
        backend: Arc<dyn DecodeBackend>,
        uploader: Arc<dyn FrameUploader>,
        config: PreviewConfig,
    ) -> Arc<Self> {
        let thumbnails = ThumbnailCache::new(
            Arc::clone(&backend),
            Arc::clone(&uploader),
            &config,
        );
        Arc::new(Self {
            backend,
            uploader,
            config,
            registry: AssetRegistry::new(),
            thumbnails,
        })
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    pub fn uploader(&self) -> &Arc<dyn FrameUploader> {
        &self.uploader
    }

    pub fn registry(&self) -> &AssetRegistry<VideoAsset> {
        &self.registry
    }

    pub fn thumbnails(&self) -> &ThumbnailCache {
        &self.thumbnails
    }

    /// Acquire the shared decode asset for `uri`, opening the session
    /// if this is the first reference.
    pub async fn acquire_video_asset(
        &self,
        uri: &str,
        options: SinkOptions,
    ) -> PreviewResult<AssetHandle<VideoAsset>> {
        let backend = Arc::clone(&self.backend);
        let capacity = self.config.frame_cache_capacity;
        let uri_owned = uri.to_string();
        self.registry
            .acquire(
                AssetKind::VideoDecode,
                uri,
                move || async move {
                    let asset =
                        VideoAsset::open(backend.as_ref(), &uri_owned, options, capacity).await?;
                    Ok(asset)
                },
                Some(Box::new(|asset: &VideoAsset| {
                    debug!(uri = asset.session.uri(), "decode session disposed");
                })),
            )
            .await
    }
}
