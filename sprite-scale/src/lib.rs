// SPDX-License-Identifier: MIT
//! # sprite-scale: Pluggable Sprite Upscalers
//!
//! This crate provides the pixel-level half of sprite resampling: a single
//! [`Scaler`] trait, a handful of concrete algorithms, and the edge-wrap
//! analysis pass that tells an algorithm how to sample past the border of a
//! sprite.
//!
//! ## Architecture Overview
//!
//! The crate is designed around three core principles:
//! 1. **One trait, one level**: every algorithm implements [`Scaler`] directly
//! 2. **Tagged selection**: [`presets::ScalerKind`] picks an algorithm by configuration
//! 3. **Determinism**: identical inputs always produce byte-identical outputs
//!
//! ## Key Components
//!
//! - [`presets`]: `ScalerKind` and the factory that builds a boxed scaler
//! - [`cpu`]: Convolution scaler built on fast_image_resize (SIMD-accelerated)
//! - [`epx`]: EPX / Scale2x / Scale3x pixel-art scaler
//! - [`nearest`]: Nearest-neighbour scaler, also the degenerate-input fallback
//! - [`analysis`]: Edge-wrap detection over RGBA8 pixels
//!
//! ## Pixel Layout
//!
//! All buffers are tightly packed RGBA8, row-major, `width * 4` bytes per row.
//! Scalers never mutate their input.
//!
//! ## Usage Example
//!
//! ```rust
//! use sprite_scale::{presets::ScalerKind, ScalerConfig, Size};
//!
//! let scaler = ScalerKind::Nearest.create();
//! let source = vec![255u8; 4 * 4 * 4];
//! let out = scaler
//!     .apply(&ScalerConfig::default(), 2, &source, Size { w: 4, h: 4 })
//!     .unwrap();
//! assert_eq!(out.size, Size { w: 8, h: 8 });
//! ```

pub mod analysis;
pub mod cpu;
pub mod epx;
pub mod nearest;
pub mod presets;

use fast_image_resize as fir;
use serde::{Deserialize, Serialize};

/// Bytes per RGBA8 pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Represents a 2D size with width and height in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub w: u32,
    pub h: u32,
}

impl Size {
    pub const fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    /// Number of pixels covered.
    pub fn area(&self) -> usize {
        self.w as usize * self.h as usize
    }

    /// Number of RGBA8 bytes needed to hold an image of this size.
    pub fn byte_len(&self) -> usize {
        self.area() * BYTES_PER_PIXEL
    }

    pub fn is_degenerate(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Multiply both axes by `scale`.
    pub fn scaled(&self, scale: u32) -> Self {
        Self {
            w: self.w.saturating_mul(scale),
            h: self.h.saturating_mul(scale),
        }
    }
}

/// Per-axis edge wrapping, as reported by [`analysis::analyze_wrap`].
///
/// A wrapped axis samples the opposite edge when it reads past the border,
/// instead of clamping to the nearest edge pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Wrapped {
    pub x: bool,
    pub y: bool,
}

impl Wrapped {
    pub const NONE: Self = Self { x: false, y: false };
    pub const BOTH: Self = Self { x: true, y: true };

    pub fn any(&self) -> bool {
        self.x || self.y
    }
}

/// Per-call scaler configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScalerConfig {
    /// Edge wrapping for border sampling.
    pub wrapped: Wrapped,
    /// Whether any source pixel is translucent.
    pub has_alpha: bool,
    /// Whether the source is already in linear space.
    pub gamma_corrected: bool,
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self {
            wrapped: Wrapped::NONE,
            has_alpha: true,
            gamma_corrected: true,
        }
    }
}

/// Output of a successful [`Scaler::apply`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScaledImage {
    pub pixels: Vec<u8>,
    pub size: Size,
}

#[derive(Debug)]
pub enum ScaleError {
    /// Requested multiplier is outside the scaler's declared range.
    ScaleOutOfRange { scale: u32, min: u32, max: u32 },
    /// Source has a zero-length axis.
    DegenerateSource(Size),
    /// Source buffer length does not match `size.byte_len()`.
    BufferSizeMismatch { expected: usize, actual: usize },
    /// Target buffer could not be allocated.
    OutOfMemory { bytes: usize },
    Fir(fir::ResizeError),
    ImageBuf(fir::ImageBufferError),
}

impl From<fir::ResizeError> for ScaleError { fn from(e: fir::ResizeError) -> Self { Self::Fir(e) } }
impl From<fir::ImageBufferError> for ScaleError { fn from(e: fir::ImageBufferError) -> Self { Self::ImageBuf(e) } }

impl std::fmt::Display for ScaleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScaleError::ScaleOutOfRange { scale, min, max } => {
                write!(f, "Scale {} outside supported range [{}, {}]", scale, min, max)
            }
            ScaleError::DegenerateSource(size) => write!(f, "Degenerate source {}x{}", size.w, size.h),
            ScaleError::BufferSizeMismatch { expected, actual } => {
                write!(f, "Source buffer is {} bytes, expected {}", actual, expected)
            }
            ScaleError::OutOfMemory { bytes } => write!(f, "Failed to allocate {} bytes", bytes),
            ScaleError::Fir(e) => write!(f, "Fast image resize error: {}", e),
            ScaleError::ImageBuf(e) => write!(f, "Image buffer error: {}", e),
        }
    }
}

impl std::error::Error for ScaleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScaleError::Fir(e) => Some(e),
            ScaleError::ImageBuf(e) => Some(e),
            _ => None,
        }
    }
}

impl ScaleError {
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, ScaleError::OutOfMemory { .. })
    }
}

/// A pixel upscaling algorithm.
///
/// Implementations must be deterministic for identical inputs, must not
/// mutate `source`, must reject scales outside `[min_scale, max_scale]`, and
/// must accept 1×N and N×1 sources.
pub trait Scaler: Send + Sync {
    fn name(&self) -> &'static str;

    fn min_scale(&self) -> u32;

    fn max_scale(&self) -> u32;

    fn clamp_scale(&self, scale: u32) -> u32 {
        scale.clamp(self.min_scale(), self.max_scale())
    }

    fn apply(
        &self,
        config: &ScalerConfig,
        scale: u32,
        source: &[u8],
        source_size: Size,
    ) -> Result<ScaledImage, ScaleError>;
}

/// Shared argument checks run at the top of every `apply`.
pub(crate) fn validate_input(
    scaler: &dyn Scaler,
    scale: u32,
    source: &[u8],
    source_size: Size,
) -> Result<(), ScaleError> {
    if scale < scaler.min_scale() || scale > scaler.max_scale() {
        return Err(ScaleError::ScaleOutOfRange {
            scale,
            min: scaler.min_scale(),
            max: scaler.max_scale(),
        });
    }
    if source_size.is_degenerate() {
        return Err(ScaleError::DegenerateSource(source_size));
    }
    if source.len() != source_size.byte_len() {
        return Err(ScaleError::BufferSizeMismatch {
            expected: source_size.byte_len(),
            actual: source.len(),
        });
    }
    Ok(())
}

/// Allocate a zeroed target buffer, reporting allocation failure instead of aborting.
pub(crate) fn alloc_target(size: Size) -> Result<Vec<u8>, ScaleError> {
    let bytes = size.byte_len();
    let mut buf = Vec::new();
    buf.try_reserve_exact(bytes)
        .map_err(|_| ScaleError::OutOfMemory { bytes })?;
    buf.resize(bytes, 0);
    Ok(buf)
}

/// Read the RGBA8 pixel at `(x, y)` as a packed `u32`.
#[inline]
pub(crate) fn load_pixel(src: &[u8], width: u32, x: u32, y: u32) -> u32 {
    let i = (y as usize * width as usize + x as usize) * BYTES_PER_PIXEL;
    u32::from_ne_bytes([src[i], src[i + 1], src[i + 2], src[i + 3]])
}

#[inline]
pub(crate) fn store_pixel(dst: &mut [u8], width: u32, x: u32, y: u32, px: u32) {
    let i = (y as usize * width as usize + x as usize) * BYTES_PER_PIXEL;
    dst[i..i + BYTES_PER_PIXEL].copy_from_slice(&px.to_ne_bytes());
}

/// Resolve a possibly out-of-range coordinate by clamping or wrapping.
#[inline]
pub(crate) fn resolve_coord(c: i64, len: u32, wrap: bool) -> u32 {
    let len = len as i64;
    if wrap {
        c.rem_euclid(len) as u32
    } else {
        c.clamp(0, len - 1) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_helpers() {
        let s = Size::new(16, 8);
        assert_eq!(s.area(), 128);
        assert_eq!(s.byte_len(), 512);
        assert_eq!(s.scaled(4), Size::new(64, 32));
        assert!(Size::new(0, 3).is_degenerate());
    }

    #[test]
    fn test_resolve_coord() {
        assert_eq!(resolve_coord(-1, 4, false), 0);
        assert_eq!(resolve_coord(-1, 4, true), 3);
        assert_eq!(resolve_coord(4, 4, false), 3);
        assert_eq!(resolve_coord(4, 4, true), 0);
    }
}
