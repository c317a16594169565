// SPDX-License-Identifier: MIT
// Convolution scaler built on fast_image_resize (SIMD-accelerated).
// RGBA8 in → RGBA8 out, integer multipliers only.

use fast_image_resize as fir;
use fir::images::{TypedImage, TypedImageRef};
use fir::pixels::U8x4;
use fir::{ResizeOptions, Resizer};

use crate::nearest::NearestScaler;
use crate::{alloc_target, resolve_coord, validate_input, ScaleError, ScaledImage, Scaler, ScalerConfig, Size};

/// Border texels added around the source before filtering, enough for Lanczos3 support.
const MARGIN: u32 = 3;

/// Filter used by [`ConvolutionScaler`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Filter {
    Bilinear,
    CatmullRom,
    #[default]
    Lanczos3,
}

impl Filter {
    fn to_fir(self) -> fir::FilterType {
        match self {
            Filter::Bilinear => fir::FilterType::Bilinear,
            Filter::CatmullRom => fir::FilterType::CatmullRom,
            Filter::Lanczos3 => fir::FilterType::Lanczos3,
        }
    }
}

/// Smooth upscaler for painted art.
///
/// The source is first extended by [`MARGIN`] texels on every side, wrapping
/// or clamping per [`ScalerConfig::wrapped`], then the original region is
/// resized out of the extended image so the filter kernel sees the right
/// neighbours at the border.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConvolutionScaler {
    pub filter: Filter,
}

impl ConvolutionScaler {
    pub fn new(filter: Filter) -> Self {
        Self { filter }
    }
}

impl Scaler for ConvolutionScaler {
    fn name(&self) -> &'static str {
        "convolution"
    }

    fn min_scale(&self) -> u32 {
        1
    }

    fn max_scale(&self) -> u32 {
        16
    }

    fn apply(
        &self,
        config: &ScalerConfig,
        scale: u32,
        source: &[u8],
        source_size: Size,
    ) -> Result<ScaledImage, ScaleError> {
        validate_input(self, scale, source, source_size)?;

        // A single-texel axis has nothing to filter against.
        if scale == 1 || source_size.w < 2 || source_size.h < 2 {
            return NearestScaler.apply(config, scale, source, source_size);
        }

        let extended_size = Size::new(source_size.w + 2 * MARGIN, source_size.h + 2 * MARGIN);
        let extended = extend_borders(config, source, source_size, extended_size)?;

        let target_size = source_size.scaled(scale);
        let mut target = alloc_target(target_size)?;

        let src_view = TypedImageRef::<U8x4>::from_buffer(extended_size.w, extended_size.h, &extended)?;
        let mut dst_image = TypedImage::<U8x4>::from_buffer(target_size.w, target_size.h, &mut target)?;

        let opts = ResizeOptions::new()
            .resize_alg(fir::ResizeAlg::Convolution(self.filter.to_fir()))
            .crop(
                MARGIN as f64,
                MARGIN as f64,
                source_size.w as f64,
                source_size.h as f64,
            )
            .use_alpha(config.has_alpha);

        let mut resizer = Resizer::new();
        resizer.resize_typed::<U8x4>(&src_view, &mut dst_image, &opts)?;

        Ok(ScaledImage { pixels: target, size: target_size })
    }
}

/// Copy `source` into the centre of a larger buffer and fill the margin.
fn extend_borders(
    config: &ScalerConfig,
    source: &[u8],
    source_size: Size,
    extended_size: Size,
) -> Result<Vec<u8>, ScaleError> {
    let mut out = alloc_target(extended_size)?;
    let row_bytes = extended_size.w as usize * 4;
    for ey in 0..extended_size.h {
        let sy = resolve_coord(ey as i64 - MARGIN as i64, source_size.h, config.wrapped.y);
        let row = &mut out[ey as usize * row_bytes..(ey as usize + 1) * row_bytes];
        for ex in 0..extended_size.w {
            let sx = resolve_coord(ex as i64 - MARGIN as i64, source_size.w, config.wrapped.x);
            let si = (sy as usize * source_size.w as usize + sx as usize) * 4;
            let di = ex as usize * 4;
            row[di..di + 4].copy_from_slice(&source[si..si + 4]);
        }
    }
    Ok(out)
}
