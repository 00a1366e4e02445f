//! Decoded surfaces and ready-to-draw image handles.
//!
//! A [`RawSurface`] is what a decode sink yields: pixels plus geometry.
//! A [`FrameUploader`] converts a surface into an opaque [`ImageHandle`]
//! the renderer can draw. The uploader seam is where a GPU-backed
//! renderer wraps surfaces as textures; the bundled [`SoftwareUploader`]
//! just retains the pixels.

use crate::error::{MediaError, MediaResult};
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Pixel layout of a raw surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8,
    Rgb8,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8 => 4,
            Self::Rgb8 => 3,
        }
    }
}

/// A decoded frame surface as produced by a sink.
#[derive(Debug, Clone)]
pub struct RawSurface {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Tightly packed pixel rows.
    pub data: Arc<[u8]>,
}

impl RawSurface {
    /// Create a surface, validating that the buffer matches geometry.
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Arc<[u8]>) -> MediaResult<Self> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(MediaError::Decode(format!(
                "surface buffer is {} bytes, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// A uniformly filled surface. Used by tests and placeholder frames.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            format: PixelFormat::Rgba8,
            data: data.into(),
        }
    }

    /// Nearest-neighbor scale to the target size. Used for thumbnails,
    /// where quality matters less than allocation churn.
    pub fn scaled(&self, target_width: u32, target_height: u32) -> Self {
        if target_width == self.width && target_height == self.height {
            return self.clone();
        }
        let bpp = self.format.bytes_per_pixel();
        let mut out = vec![0u8; target_width as usize * target_height as usize * bpp];
        for y in 0..target_height as usize {
            let src_y = y * self.height as usize / target_height as usize;
            for x in 0..target_width as usize {
                let src_x = x * self.width as usize / target_width as usize;
                let src = (src_y * self.width as usize + src_x) * bpp;
                let dst = (y * target_width as usize + x) * bpp;
                out[dst..dst + bpp].copy_from_slice(&self.data[src..src + bpp]);
            }
        }
        Self {
            width: target_width,
            height: target_height,
            format: self.format,
            data: out.into(),
        }
    }

    /// Size of the pixel buffer in bytes.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

/// An opaque, cheaply clonable handle to a ready-to-draw image.
///
/// The backing is whatever the uploader produced (a GPU texture, a CPU
/// bitmap); the preview core only moves handles around and never looks
/// inside.
#[derive(Clone)]
pub struct ImageHandle {
    id: u64,
    width: u32,
    height: u32,
    backing: Arc<dyn Any + Send + Sync>,
}

impl ImageHandle {
    /// Wrap a backing object as a new handle with a fresh id.
    pub fn new(width: u32, height: u32, backing: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            id: NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed),
            width,
            height,
            backing,
        }
    }

    /// Unique id of this handle, assigned at wrap time.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Downcast the backing to a concrete type.
    pub fn backing<T: 'static>(&self) -> Option<&T> {
        self.backing.downcast_ref()
    }
}

impl std::fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageHandle")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Converts raw surfaces into drawable image handles. May fail (e.g.
/// GPU resource exhaustion); failures abort the operation that needed
/// the frame, never the clip.
pub trait FrameUploader: Send + Sync {
    fn wrap(&self, surface: RawSurface) -> MediaResult<ImageHandle>;
}

/// Uploader that keeps the decoded pixels as the backing. The default
/// when no GPU renderer is attached.
#[derive(Debug, Default)]
pub struct SoftwareUploader;

impl FrameUploader for SoftwareUploader {
    fn wrap(&self, surface: RawSurface) -> MediaResult<ImageHandle> {
        let (w, h) = (surface.width, surface.height);
        Ok(ImageHandle::new(w, h, Arc::new(surface)))
    }
}
