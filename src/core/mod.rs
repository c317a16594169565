//! # Core Infrastructure Module
//!
//! Building blocks with no knowledge of the cache tiers: geometry, content
//! hashing, scratch buffers, frame timing and per-texel cost tracking.

pub mod buffer_pool;
pub mod frame_clock;
pub mod geometry;
pub mod hash;
pub mod texel_timer;
