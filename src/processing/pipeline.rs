//! # Resample Pipeline
//!
//! Turns one sprite region of a source image into upscaled RGBA8 pixels.
//! Runs on whichever thread the scheduler picks and never touches the render
//! device.
//!
//! ## Stages
//!
//! ```text
//! extract ──▶ detect wrap ──▶ pad ──▶ scale
//! ```
//!
//! 1. **Extract**: copy the region rows out of the source under its read lock
//!    into a pooled buffer.
//! 2. **Detect wrap**: decide per axis whether the sprite tiles, so the scaler
//!    samples across the opposite edge instead of clamping.
//! 3. **Pad**: surround non-wrapping axes with transparent texels so filtering
//!    has room to fade out. Sliced images are never padded.
//! 4. **Scale**: run the configured [`Scaler`].
//!
//! Intermediate buffers come from a shared [`BufferPool`] and are returned on
//! every path, including errors.
//!
//! Every result carries the [`PipelineFingerprint`] of the scaler and settings
//! that produced it. Cached results whose fingerprint differs from the current
//! one are never served.

use std::sync::Arc;

use sprite_scale::analysis::{WrapAnalysis, analyze_wrap, has_alpha};
use sprite_scale::presets::ScalerKind;
use sprite_scale::{BYTES_PER_PIXEL, Scaler, ScalerConfig, Size, Wrapped};
use xxhash_rust::xxh64::Xxh64;

use crate::cache::key::SpriteClass;
use crate::config::EngineConfig;
use crate::core::buffer_pool::BufferPool;
use crate::core::geometry::{Bounds, Quad};
use crate::core::hash::ContentHash;
use crate::error::{ResampleError, ResampleResult};
use crate::source::SourceImage;

/// Identifies the scaler and the settings that shape its output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineFingerprint {
    pub scaler: ScalerKind,
    /// Digest of the scaler name, gamma handling, padding and wrap detection settings.
    pub settings: u64,
}

impl PipelineFingerprint {
    pub fn new(config: &EngineConfig, scaler: &dyn Scaler) -> Self {
        let r = &config.resample;
        let mut hasher = Xxh64::new(0);
        hasher.update(scaler.name().as_bytes());
        hasher.update(&[
            config.scaler.gamma_corrected as u8,
            r.padding.enabled as u8,
            r.wrap_detection.enabled as u8,
            r.wrap_detection.strict as u8,
            r.wrap_detection.alpha_threshold,
        ]);
        for value in [
            r.padding.texels,
            r.padding.minimum_size_texels,
            r.wrap_detection.edge_threshold.to_bits(),
        ] {
            hasher.update(&value.to_le_bytes());
        }
        Self {
            scaler: config.scaler.kind,
            settings: hasher.digest(),
        }
    }
}

impl std::fmt::Display for PipelineFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{:016x}", self.scaler, self.settings)
    }
}

/// Upscaled pixels plus the geometry the host needs to draw them.
#[derive(Clone, Debug)]
pub struct ResampledPixels {
    pub pixels: Vec<u8>,
    /// Texture size including padding.
    pub size: Size,
    pub unpadded_size: Size,
    /// Padding in output texels.
    pub padding: Quad,
    pub scale_factor: (f32, f32),
    pub wrapped: Wrapped,
    pub scale: u32,
    pub content_hash: ContentHash,
    pub fingerprint: PipelineFingerprint,
}

/// What to resample.
#[derive(Clone, Debug)]
pub struct ResampleJob {
    pub source: Arc<SourceImage>,
    pub bounds: Bounds,
    pub class: SpriteClass,
    pub scale: u32,
    pub content_hash: ContentHash,
}

impl ResampleJob {
    fn label(&self) -> String {
        format!("{}{}", self.source.display_name(), self.bounds)
    }
}

/// Final multiplier for a request: the configured policy, capped by what the scaler supports.
pub fn effective_scale(config: &EngineConfig, scaler: &dyn Scaler, requested: u32) -> u32 {
    let scale = config.resample.effective_scale(requested);
    scaler.clamp_scale(scale.min(config.resample.max_scale))
}

pub struct ResamplePipeline {
    scaler: Arc<dyn Scaler>,
    pool: Arc<BufferPool>,
    config: Arc<EngineConfig>,
    fingerprint: PipelineFingerprint,
}

impl ResamplePipeline {
    pub fn new(scaler: Arc<dyn Scaler>, pool: Arc<BufferPool>, config: Arc<EngineConfig>) -> Self {
        let fingerprint = PipelineFingerprint::new(&config, scaler.as_ref());
        Self {
            scaler,
            pool,
            config,
            fingerprint,
        }
    }

    pub fn scaler(&self) -> &dyn Scaler {
        self.scaler.as_ref()
    }

    pub fn fingerprint(&self) -> PipelineFingerprint {
        self.fingerprint
    }

    pub fn run(&self, job: &ResampleJob) -> ResampleResult<ResampledPixels> {
        let region_size = job.bounds.size();
        let mut region = self.acquire(job, region_size.byte_len())?;
        if let Err(e) = job.source.copy_region(job.bounds, &mut region) {
            self.pool.return_buffer(region);
            return Err(e);
        }

        let wrapped = self.detect_wrap(&region, region_size);
        let pad = self.padding_for(region_size, wrapped, job.class);

        let scaled = if pad.is_zero() {
            self.scale(job, &region, region_size, wrapped)
        } else {
            let padded_size = Size::new(
                region_size.w + pad.horizontal() as u32,
                region_size.h + pad.vertical() as u32,
            );
            match self.acquire(job, padded_size.byte_len()) {
                Ok(mut padded) => {
                    blit_padded(&region, region_size, &mut padded, padded_size, pad);
                    let scaled = self.scale(job, &padded, padded_size, wrapped);
                    self.pool.return_buffer(padded);
                    scaled
                }
                Err(e) => Err(e),
            }
        };
        self.pool.return_buffer(region);
        let scaled = scaled?;

        let unpadded_size = region_size.scaled(job.scale);
        Ok(ResampledPixels {
            pixels: scaled.pixels,
            size: scaled.size,
            unpadded_size,
            padding: pad.scaled(job.scale),
            scale_factor: (
                unpadded_size.w as f32 / region_size.w as f32,
                unpadded_size.h as f32 / region_size.h as f32,
            ),
            wrapped,
            scale: job.scale,
            content_hash: job.content_hash,
            fingerprint: self.fingerprint,
        })
    }

    fn acquire(&self, job: &ResampleJob, len: usize) -> ResampleResult<Vec<u8>> {
        self.pool
            .get_buffer(len)
            .ok_or_else(|| ResampleError::out_of_memory(job.label(), len))
    }

    fn detect_wrap(&self, region: &[u8], size: Size) -> Wrapped {
        let detection = &self.config.resample.wrap_detection;
        if !detection.enabled {
            return Wrapped::NONE;
        }
        let params = WrapAnalysis {
            edge_threshold: detection.edge_threshold,
            alpha_threshold: detection.alpha_threshold,
            strict: detection.strict,
            ..WrapAnalysis::default()
        };
        analyze_wrap(region, size, &params)
    }

    /// Source-space padding for a region.
    fn padding_for(&self, size: Size, wrapped: Wrapped, class: SpriteClass) -> Quad {
        let padding = &self.config.resample.padding;
        if !padding.enabled || padding.texels == 0 || class == SpriteClass::SlicedImage {
            return Quad::ZERO;
        }
        let texels = padding.texels as i32;
        let px = if !wrapped.x && size.w >= padding.minimum_size_texels { texels } else { 0 };
        let py = if !wrapped.y && size.h >= padding.minimum_size_texels { texels } else { 0 };
        Quad::new(px, py, px, py)
    }

    fn scale(
        &self,
        job: &ResampleJob,
        pixels: &[u8],
        size: Size,
        wrapped: Wrapped,
    ) -> ResampleResult<sprite_scale::ScaledImage> {
        let config = ScalerConfig {
            wrapped,
            has_alpha: has_alpha(pixels),
            gamma_corrected: self.config.scaler.gamma_corrected,
        };
        self.scaler.apply(&config, job.scale, pixels, size).map_err(|e| {
            if e.is_out_of_memory() {
                ResampleError::out_of_memory(job.label(), size.scaled(job.scale).byte_len())
            } else {
                ResampleError::from(e).with_context(job.label())
            }
        })
    }
}

/// Copy `src` into the centre of a zeroed `dst`, offset by `pad`.
fn blit_padded(src: &[u8], src_size: Size, dst: &mut [u8], dst_size: Size, pad: Quad) {
    let row_bytes = src_size.w as usize * BYTES_PER_PIXEL;
    let dst_stride = dst_size.w as usize * BYTES_PER_PIXEL;
    let x_offset = pad.left as usize * BYTES_PER_PIXEL;
    for (row, line) in src.chunks_exact(row_bytes).enumerate() {
        let start = (row + pad.top as usize) * dst_stride + x_offset;
        dst[start..start + row_bytes].copy_from_slice(line);
    }
}
