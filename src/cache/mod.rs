//! # Sprite Caches
//!
//! Three tiers, probed in order on a miss:
//!
//! ```text
//! ActiveMap (SpriteKey)  ──miss──▶  SuspendedCache (ContentHash)  ──miss──▶  PersistentCache (ContentHash)
//!   live sprites                     sprites of disposed sources            encoded blobs on disk
//! ```
//!
//! Entries move between the first two tiers; the persistent tier only ever
//! holds encoded copies (see [`codec`]).

pub mod active_map;
pub mod codec;
pub mod key;
pub mod persistent;
pub mod sprite;
pub mod suspended;

pub use active_map::ActiveMap;
pub use key::{SpriteClass, SpriteKey};
pub use persistent::{DiskCache, EntryBytes, MemoryCache, PersistentCache};
pub use sprite::{ResampledSprite, SpriteState};
pub use suspended::SuspendedCache;
