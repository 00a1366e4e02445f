//! Integration test crate for Playhead.
//!
//! This crate exists solely to hold cross-crate integration tests. It
//! drives the preview engine against a deterministic mock decode
//! backend to verify asset sharing, playback, sink arbitration, and
//! the thumbnail caches end to end.

#[cfg(test)]
mod support;

#[cfg(test)]
mod assets;



#[cfg(test)]
mod thumbnails;
