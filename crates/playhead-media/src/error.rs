//! Error types for media decoding.

use thiserror::Error;

/// Errors surfaced by decode backends and sessions.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to open source: {0}")]
    Open(String),

    #[error("No video track in {0}")]
    NoVideoTrack(String),

    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("Source has no alpha support: {0}")]
    AlphaUnsupported(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Failed to create sink: {0}")]
    SinkCreation(String),

    #[error("Image wrap failed: {0}")]
    Upload(String),

    #[error("Probe failed: {0}")]
    Probe(String),
}

/// Result type alias for media operations.
pub type MediaResult<T> = std::result::Result<T, MediaError>;
