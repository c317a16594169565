// SPDX-License-Identifier: MIT
//! # Edge Analysis
//!
//! Decides, per axis, whether a sprite tiles seamlessly and should be
//! sampled with wrap-around at its border. An axis wraps when both of its
//! opposing edges have at least `edge_threshold` of their texels opaque.
//! Strict mode refuses to wrap strongly elongated sprites.
//!
//! Also reports whether a sprite has any translucent texel, which lets a
//! scaler skip alpha handling.

use crate::{Size, Wrapped};

/// Tuning for [`analyze_wrap`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WrapAnalysis {
    /// Minimum fraction of opaque texels required on each opposing edge.
    pub edge_threshold: f32,
    /// Alpha at or above which a texel counts as opaque.
    pub alpha_threshold: u8,
    pub strict: bool,
    /// Aspect ratio (long / short) at which strict mode refuses to wrap.
    pub strict_ratio: f32,
}

impl Default for WrapAnalysis {
    fn default() -> Self {
        Self {
            edge_threshold: 0.2,
            alpha_threshold: 1,
            strict: false,
            strict_ratio: 4.0,
        }
    }
}

/// Analyse opposite edges of an RGBA8 image and report which axes wrap.
pub fn analyze_wrap(pixels: &[u8], size: Size, params: &WrapAnalysis) -> Wrapped {
    if size.is_degenerate() || pixels.len() < size.byte_len() {
        return Wrapped::NONE;
    }

    if params.strict {
        let (long, short) = (size.w.max(size.h) as f32, size.w.min(size.h) as f32);
        if long / short >= params.strict_ratio {
            return Wrapped::NONE;
        }
    }

    let alpha_at = |x: u32, y: u32| pixels[(y as usize * size.w as usize + x as usize) * 4 + 3];

    let opaque = |count: u32, sample: &dyn Fn(u32) -> u8| -> f32 {
        let n = (0..count).filter(|&i| sample(i) >= params.alpha_threshold).count();
        n as f32 / count as f32
    };

    let wraps = |a: f32, b: f32| a.min(b) >= params.edge_threshold;

    let x = size.w > 1 && {
        let left = opaque(size.h, &|y| alpha_at(0, y));
        let right = opaque(size.h, &|y| alpha_at(size.w - 1, y));
        wraps(left, right)
    };
    let y = size.h > 1 && {
        let top = opaque(size.w, &|x| alpha_at(x, 0));
        let bottom = opaque(size.w, &|x| alpha_at(x, size.h - 1));
        wraps(top, bottom)
    };

    Wrapped { x, y }
}

/// True when any texel's alpha is below 255.
pub fn has_alpha(pixels: &[u8]) -> bool {
    pixels.chunks_exact(4).any(|px| px[3] != 255)
}
