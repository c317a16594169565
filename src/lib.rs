//! # Sprite Resampler
//!
//! A draw-time sprite upscaling cache for 2D renderers. The host hands over
//! its source textures and, on every draw, asks for a resampled version of
//! the sprite region it is about to draw. The engine answers from cache,
//! schedules the work, or says "draw the original".
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//! - `engine`: The [`SpriteEngine`] facade and the per-frame lifecycle
//! - `source`: Registered source images, their revisions and pixel locks
//! - `eligibility`: Per-image and per-region "should we resample" decisions
//! - `cache`: Active, suspended and persistent cache tiers
//! - `scheduler`: Sync/async dispatch, deduplication and priorities
//! - `processing`: Region extraction, padding and the call into `sprite-scale`
//! - `render`: The render-device seam and deferred texture release
//! - `core`: Hashing, geometry, buffer pool and frame timing
//! - `config`: Configuration management and hot reload
//!
//! ## Features
//!
//! - **Never blocks the draw call**: work that does not fit the frame budget is
//!   deferred, and stale results are served until fresh ones land
//! - **Content addressed**: a sprite whose image is unloaded and reloaded is
//!   picked up from the suspended or persistent cache instead of recomputed
//! - **Single-flight**: concurrent requests for the same sprite share one compute
//!
//! ## Example
//!
//! ```rust
//! use sprite_resampler::{Bounds, EngineConfig, SourceDesc, SpriteEngine};
//!
//! let engine = SpriteEngine::builder(EngineConfig::default()).build().unwrap();
//! let sheet = engine
//!     .register_source(SourceDesc::rgba8(Some("TileSheets/crops"), 64, 64, vec![255; 64 * 64 * 4]))
//!     .unwrap();
//!
//! engine.begin_frame();
//! // Async by default: the first request schedules work and returns nothing yet.
//! let _ = engine.on_draw_request(sheet, Bounds::new(16, 16, 16, 16), 2);
//! engine.wait_idle(std::time::Duration::from_secs(10));
//! assert!(engine.on_draw_request(sheet, Bounds::new(16, 16, 16, 16), 2).is_some());
//! engine.end_frame();
//! ```

pub mod cache;
pub mod config;
pub mod core;
pub mod eligibility;
pub mod engine;
pub mod error;
pub mod processing;
pub mod render;
pub mod scheduler;
pub mod source;
pub mod stats;

/// Re-export error types for convenience
pub use error::{HasSeverity, Recoverable, ResampleError, ResampleResult, Retryable};

pub use cache::{ResampledSprite, SpriteClass, SpriteKey, SpriteState};
pub use config::EngineConfig;
pub use crate::core::geometry::{Bounds, Quad};
pub use crate::core::hash::ContentHash;
pub use engine::{EngineBuilder, SpriteEngine};
pub use render::{HeadlessDevice, RenderDevice, SpriteImage, TextureDesc, TextureId};
pub use source::{PixelFormat, SourceDesc, SourceHandle};
pub use stats::StatsSnapshot;

/// Re-export the scaler crate
pub use sprite_scale;
