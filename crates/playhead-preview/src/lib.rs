//! Preview playback core: shared decode assets, per-clip playback
//! state machines, frame and thumbnail caches, and sink arbitration.
//!
//! The entry point is [`PreviewContext`], one per application. Each
//! timeline clip drives a [`VideoClipInstance`], which acquires the
//! clip's [`VideoAsset`] through the reference-counted
//! [`AssetRegistry`] so that every clip over the same source shares
//! one decode session and one frame cache.

pub mod arbitrator;
pub mod asset;
pub mod config;
pub mod context;
pub mod error;
pub mod frame_cache;
pub mod instance;
pub mod playback;
pub mod registry;
pub mod thumbnail;

pub use arbitrator::{decide, SinkArbitrator, SinkAssignment};
pub use asset::VideoAsset;
pub use config::PreviewConfig;
pub use context::PreviewContext;
pub use error::{PreviewError, PreviewResult};
pub use frame_cache::{CacheStats, FrameCache};
pub use instance::VideoClipInstance;
pub use playback::{ClipPlayback, Frame, PlaybackPhase};
pub use registry::{AssetHandle, AssetKey, AssetKind, AssetRegistry};
pub use thumbnail::{ThumbnailCache, ThumbnailKey};
