use serde::{Deserialize, Serialize};

use crate::core::geometry::Bounds;
use crate::source::SourceHandle;

/// How a sprite relates to its source; padding and wrap handling differ per class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpriteClass {
    /// The bounds cover the whole image.
    Image,
    /// A sub-rectangle of a sprite sheet.
    Sprite,
    /// A piece of an image drawn in adjacent slices; never padded.
    SlicedImage,
}

impl SpriteClass {
    /// Stable byte used in content hashes and on disk.
    pub fn tag(self) -> u8 {
        match self {
            SpriteClass::Image => 0,
            SpriteClass::Sprite => 1,
            SpriteClass::SlicedImage => 2,
        }
    }
}

/// Identity of a draw-time sprite. `source` compares by handle, not content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SpriteKey {
    pub source: SourceHandle,
    pub bounds: Bounds,
    pub scale: u32,
    pub class: SpriteClass,
}

impl std::fmt::Display for SpriteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}{}x{} [{:?}]", self.source, self.bounds, self.scale, self.class)
    }
}
