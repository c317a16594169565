//! # Content Hashing
//!
//! Sprite identity by content. A [`ContentHash`] covers the pixel bytes inside
//! a sprite's bounds plus its geometry, classification and (optionally) its
//! scale. Two different source images with identical pixels at the same
//! geometry hash equal, which is what lets a suspended sprite be resurrected
//! for a reloaded image.
//!
//! The digest is XXH64, computed in a single streaming pass directly over the
//! source rows with a fixed-size accumulator, so hashing never allocates.

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::Xxh64;

use crate::cache::key::SpriteClass;
use crate::core::geometry::Bounds;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash(pub u64);

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl ContentHash {
    pub fn from_hex(text: &str) -> Option<Self> {
        u64::from_str_radix(text, 16).ok().map(Self)
    }
}

/// Hash of the sprite region `bounds` inside an RGBA8 image `image_width` texels wide.
///
/// `scale` participates only when `Some`; callers pass it when per-sprite
/// scaling is enabled. `bounds` must already be validated against the image.
pub fn content_hash(
    pixels: &[u8],
    image_width: u32,
    bounds: Bounds,
    scale: Option<u32>,
    class: SpriteClass,
) -> ContentHash {
    let mut hasher = Xxh64::new(0);
    let stride = image_width as usize * 4;
    let row_bytes = bounds.width as usize * 4;
    for row in bounds.y as usize..bounds.y as usize + bounds.height as usize {
        let start = row * stride + bounds.x as usize * 4;
        hasher.update(&pixels[start..start + row_bytes]);
    }
    hasher.update(&bounds.width.to_le_bytes());
    hasher.update(&bounds.height.to_le_bytes());
    hasher.update(&[class.tag()]);
    if let Some(scale) = scale {
        hasher.update(&scale.to_le_bytes());
    }
    ContentHash(hasher.digest())
}
