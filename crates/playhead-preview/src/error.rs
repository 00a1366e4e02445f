//! Error types for the preview engine.

use playhead_media::MediaError;
use thiserror::Error;

/// Errors surfaced by the preview engine.
///
/// Nothing here crosses the clip-instance boundary as a panic; at that
/// boundary errors become clip state (`has_error` + message) for the
/// renderer to display.
#[derive(Error, Debug)]
pub enum PreviewError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("Asset construction failed: {0}")]
    AssetConstruction(String),

    #[error("Asset released while still constructing")]
    ReleasedDuringConstruction,

    #[error("Decode deadline of {0:?} expired")]
    DecodeTimeout(std::time::Duration),

    #[error("Clip is not initialized")]
    NotInitialized,

    #[error("Thumbnail render failed: {0}")]
    Thumbnail(String),
}

/// Result type alias for preview operations.
pub type PreviewResult<T> = std::result::Result<T, PreviewError>;
