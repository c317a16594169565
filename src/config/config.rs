//! # Engine Configuration
//!
//! Configuration structures and validation for the resampling engine. Every
//! section derives `serde` with `#[serde(default)]`, so a JSON document only
//! needs the keys it wants to override.
//!
//! ## Sections
//!
//! | Section | Controls |
//! |---------|----------|
//! | `resample` | eligibility thresholds, scale ceiling, padding, wrap detection |
//! | `scaler` | which [`ScalerKind`] runs and its tunables |
//! | `async_scaling` | worker pool and async dispatch thresholds |
//! | `frame_budget` | frame period and safety margin for synchronous work |
//! | `suspended_cache` | byte/count ceilings of the content-addressed cache |
//! | `persistent_cache` | on-disk cache directory and compression |
//! | `memory` | ceiling on bytes held by live resampled sprites |
//!
//! ## Examples
//!
//! ```rust
//! use sprite_resampler::config::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(r#"{ "resample": { "max_scale": 4 } }"#).unwrap();
//! assert_eq!(config.resample.max_scale, 4);
//! assert!(config.suspended_cache.enabled);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sprite_scale::presets::ScalerKind;

use crate::eligibility::NamePatterns;
use crate::error::{ResampleError, ResampleResult};
use crate::source::PixelFormat;

/// Largest multiplier any configuration may request.
pub const MAX_SCALE_LIMIT: u32 = 16;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Master switch. When false every draw request falls through to the original.
    pub enabled: bool,
    pub resample: ResampleConfig,
    pub scaler: ScalerSettings,
    pub async_scaling: AsyncScalingConfig,
    pub frame_budget: FrameBudgetConfig,
    pub suspended_cache: SuspendedCacheConfig,
    pub persistent_cache: PersistentCacheConfig,
    pub memory: MemoryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            resample: ResampleConfig::default(),
            scaler: ScalerSettings::default(),
            async_scaling: AsyncScalingConfig::default(),
            frame_budget: FrameBudgetConfig::default(),
            suspended_cache: SuspendedCacheConfig::default(),
            persistent_cache: PersistentCacheConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResampleConfig {
    pub enabled: bool,
    /// Upper bound on the scale multiplier.
    pub max_scale: u32,
    /// Honour per-request scales. When false every sprite uses `max_scale`.
    pub dynamic_scale: bool,
    /// Images with a side shorter than this are never resampled.
    pub minimum_texture_dimension: u32,
    pub supported_formats: Vec<PixelFormat>,
    /// Image names that are never resampled. Plain entries match a name
    /// prefix, entries with `*` or `?` are globs over the whole name and
    /// `@`-prefixed entries are regexes. See [`crate::eligibility::NamePattern`].
    pub blacklist: Vec<String>,
    /// Image names treated as sliced sheets, in the same pattern syntax.
    pub sliced: Vec<String>,
    pub resample_sprites: bool,
    pub resample_large_text: bool,
    pub resample_small_text: bool,
    pub padding: PaddingConfig,
    pub wrap_detection: WrapDetectionConfig,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_scale: 6,
            dynamic_scale: true,
            minimum_texture_dimension: 1,
            supported_formats: vec![
                PixelFormat::Rgba8,
                PixelFormat::Bgra8,
                PixelFormat::Dxt1,
                PixelFormat::Dxt3,
                PixelFormat::Dxt5,
            ],
            blacklist: vec![
                "LooseSprites/Lighting/".to_string(),
                "@^Maps/.+(Mist|Shadows?|Fog)".to_string(),
            ],
            sliced: vec!["LooseSprites/Cloudy_Ocean_BG".to_string()],
            resample_sprites: true,
            resample_large_text: true,
            resample_small_text: false,
            padding: PaddingConfig::default(),
            wrap_detection: WrapDetectionConfig::default(),
        }
    }
}

impl ResampleConfig {
    /// Scale actually used for a request, before the scaler clamps it to its own range.
    pub fn effective_scale(&self, requested: u32) -> u32 {
        if self.dynamic_scale {
            requested.clamp(1, self.max_scale)
        } else {
            self.max_scale
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaddingConfig {
    pub enabled: bool,
    /// Transparent source texels added on each non-wrapped side.
    pub texels: u32,
    /// Regions smaller than this on an axis are not padded on that axis.
    pub minimum_size_texels: u32,
}

impl Default for PaddingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            texels: 2,
            minimum_size_texels: 4,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WrapDetectionConfig {
    pub enabled: bool,
    pub edge_threshold: f32,
    pub alpha_threshold: u8,
    pub strict: bool,
}

impl Default for WrapDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            edge_threshold: 0.2,
            alpha_threshold: 1,
            strict: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalerSettings {
    pub kind: ScalerKind,
    /// Whether source pixels are treated as already linear.
    pub gamma_corrected: bool,
}

impl Default for ScalerSettings {
    fn default() -> Self {
        Self {
            kind: ScalerKind::default(),
            gamma_corrected: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsyncScalingConfig {
    pub enabled: bool,
    /// Allow async dispatch for anonymous (unnamed) images.
    pub enabled_for_unknown: bool,
    /// Regions smaller than this many texels run synchronously.
    pub minimum_size_texels: u64,
    /// Worker threads; 0 uses available parallelism.
    pub worker_threads: usize,
    /// Frames without a re-request before a pending task loses priority.
    pub downgrade_after_frames: u64,
}

impl Default for AsyncScalingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            enabled_for_unknown: true,
            minimum_size_texels: 0,
            worker_threads: 0,
            downgrade_after_frames: 2,
        }
    }
}

impl AsyncScalingConfig {
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads > 0 {
            self.worker_threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameBudgetConfig {
    pub enabled: bool,
    /// Frame period in microseconds.
    pub target_frame_time_us: u64,
    /// Time held back from every frame for the host's own work.
    pub safety_margin_us: u64,
}

impl Default for FrameBudgetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_frame_time_us: 16_667,
            safety_margin_us: 2_000,
        }
    }
}

impl FrameBudgetConfig {
    pub fn target_frame_time(&self) -> Duration {
        Duration::from_micros(self.target_frame_time_us)
    }

    pub fn safety_margin(&self) -> Duration {
        Duration::from_micros(self.safety_margin_us)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuspendedCacheConfig {
    pub enabled: bool,
    pub max_bytes: u64,
    pub max_count: usize,
}

impl Default for SuspendedCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_bytes: 0x1000_0000,
            max_count: 2000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistentCacheConfig {
    pub enabled: bool,
    pub directory: PathBuf,
    /// Deflate pixel payloads before writing.
    pub compress: bool,
}

impl Default for PersistentCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: PathBuf::from("cache"),
            compress: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Bytes of live resampled sprites kept before the oldest are purged; 0 disables the bound.
    pub max_active_bytes: u64,
}

impl EngineConfig {
    pub fn from_json_str(text: &str) -> ResampleResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> ResampleResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ResampleError::io_at("read config", path, e))?;
        Self::from_json_str(&text).map_err(|e| e.with_context(format!("loading {}", path.display())))
    }

    pub fn to_json_string(&self) -> ResampleResult<String> {
        serde_json::to_string_pretty(self).map_err(ResampleError::from)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> ResampleResult<()> {
        let r = &self.resample;
        if r.max_scale == 0 || r.max_scale > MAX_SCALE_LIMIT {
            return Err(ResampleError::config(
                "resample.max_scale",
                r.max_scale.to_string(),
                format!("must be between 1 and {}", MAX_SCALE_LIMIT),
            ));
        }
        if r.padding.texels > 16 {
            return Err(ResampleError::config(
                "resample.padding.texels",
                r.padding.texels.to_string(),
                "must be at most 16",
            ));
        }
        if !(0.0..=1.0).contains(&r.wrap_detection.edge_threshold) {
            return Err(ResampleError::config(
                "resample.wrap_detection.edge_threshold",
                r.wrap_detection.edge_threshold.to_string(),
                "must be between 0 and 1",
            ));
        }
        NamePatterns::compile("resample.blacklist", &r.blacklist)?;
        NamePatterns::compile("resample.sliced", &r.sliced)?;
        if self.frame_budget.enabled && self.frame_budget.target_frame_time_us == 0 {
            return Err(ResampleError::config(
                "frame_budget.target_frame_time_us",
                "0",
                "must be greater than 0",
            ));
        }
        if self.suspended_cache.enabled && self.suspended_cache.max_count == 0 {
            return Err(ResampleError::config(
                "suspended_cache.max_count",
                "0",
                "must be greater than 0 when the suspended cache is enabled",
            ));
        }
        if self.persistent_cache.enabled && self.persistent_cache.directory.as_os_str().is_empty() {
            return Err(ResampleError::config(
                "persistent_cache.directory",
                "",
                "must be set when the persistent cache is enabled",
            ));
        }
        Ok(())
    }
}
