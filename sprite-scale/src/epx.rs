// SPDX-License-Identifier: MIT
//! # EPX Pixel-Art Scaler
//!
//! Edge-preserving integer upscaling for hard-edged sprite art (Scale2x,
//! Scale3x, and Scale4x as two Scale2x passes). Pixels are compared as whole
//! packed RGBA values, so the output only ever contains colours present in the
//! source.
//!
//! Border reads clamp to the edge, or wrap around when the axis is flagged in
//! [`ScalerConfig::wrapped`].

use crate::{
    alloc_target, load_pixel, resolve_coord, store_pixel, validate_input, ScaleError, ScaledImage, Scaler,
    ScalerConfig, Size, Wrapped,
};

#[derive(Clone, Copy, Debug, Default)]
pub struct EpxScaler;

impl Scaler for EpxScaler {
    fn name(&self) -> &'static str {
        "epx"
    }

    fn min_scale(&self) -> u32 {
        2
    }

    fn max_scale(&self) -> u32 {
        4
    }

    fn apply(
        &self,
        config: &ScalerConfig,
        scale: u32,
        source: &[u8],
        source_size: Size,
    ) -> Result<ScaledImage, ScaleError> {
        validate_input(self, scale, source, source_size)?;

        match scale {
            2 => scale2x(source, source_size, config.wrapped),
            3 => scale3x(source, source_size, config.wrapped),
            _ => {
                let half = scale2x(source, source_size, config.wrapped)?;
                scale2x(&half.pixels, half.size, config.wrapped)
            }
        }
    }
}

/// Neighbourhood sampler with border policy.
struct Sampler<'a> {
    src: &'a [u8],
    size: Size,
    wrapped: Wrapped,
}

impl Sampler<'_> {
    #[inline]
    fn at(&self, x: i64, y: i64) -> u32 {
        let sx = resolve_coord(x, self.size.w, self.wrapped.x);
        let sy = resolve_coord(y, self.size.h, self.wrapped.y);
        load_pixel(self.src, self.size.w, sx, sy)
    }
}

fn scale2x(src: &[u8], size: Size, wrapped: Wrapped) -> Result<ScaledImage, ScaleError> {
    let out_size = size.scaled(2);
    let mut out = alloc_target(out_size)?;
    let s = Sampler { src, size, wrapped };

    for y in 0..size.h {
        for x in 0..size.w {
            let (xi, yi) = (x as i64, y as i64);
            let p = s.at(xi, yi);
            let a = s.at(xi, yi - 1);
            let b = s.at(xi + 1, yi);
            let c = s.at(xi - 1, yi);
            let d = s.at(xi, yi + 1);

            let e0 = if c == a && c != d && a != b { a } else { p };
            let e1 = if a == b && a != c && b != d { b } else { p };
            let e2 = if d == c && d != b && c != a { c } else { p };
            let e3 = if b == d && b != a && d != c { d } else { p };

            let (ox, oy) = (x * 2, y * 2);
            store_pixel(&mut out, out_size.w, ox, oy, e0);
            store_pixel(&mut out, out_size.w, ox + 1, oy, e1);
            store_pixel(&mut out, out_size.w, ox, oy + 1, e2);
            store_pixel(&mut out, out_size.w, ox + 1, oy + 1, e3);
        }
    }

    Ok(ScaledImage { pixels: out, size: out_size })
}

fn scale3x(src: &[u8], size: Size, wrapped: Wrapped) -> Result<ScaledImage, ScaleError> {
    let out_size = size.scaled(3);
    let mut out = alloc_target(out_size)?;
    let s = Sampler { src, size, wrapped };

    for y in 0..size.h {
        for x in 0..size.w {
            let (xi, yi) = (x as i64, y as i64);
            let a = s.at(xi - 1, yi - 1);
            let b = s.at(xi, yi - 1);
            let c = s.at(xi + 1, yi - 1);
            let d = s.at(xi - 1, yi);
            let e = s.at(xi, yi);
            let f = s.at(xi + 1, yi);
            let g = s.at(xi - 1, yi + 1);
            let h = s.at(xi, yi + 1);
            let i = s.at(xi + 1, yi + 1);

            let block = if b != h && d != f {
                [
                    if d == b { d } else { e },
                    if (d == b && e != c) || (b == f && e != a) { b } else { e },
                    if b == f { f } else { e },
                    if (d == b && e != g) || (d == h && e != a) { d } else { e },
                    e,
                    if (b == f && e != i) || (h == f && e != c) { f } else { e },
                    if d == h { d } else { e },
                    if (d == h && e != i) || (h == f && e != g) { h } else { e },
                    if h == f { f } else { e },
                ]
            } else {
                [e; 9]
            };

            let (ox, oy) = (x * 3, y * 3);
            for (k, px) in block.into_iter().enumerate() {
                let k = k as u32;
                store_pixel(&mut out, out_size.w, ox + k % 3, oy + k / 3, px);
            }
        }
    }

    Ok(ScaledImage { pixels: out, size: out_size })
}
