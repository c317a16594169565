// SPDX-License-Identifier: MIT
// Nearest-neighbour scaler: every source texel becomes a scale×scale block.

use crate::{alloc_target, validate_input, ScaleError, ScaledImage, Scaler, ScalerConfig, Size};

#[derive(Clone, Copy, Debug, Default)]
pub struct NearestScaler;

impl Scaler for NearestScaler {
    fn name(&self) -> &'static str {
        "nearest"
    }

    fn min_scale(&self) -> u32 {
        1
    }

    fn max_scale(&self) -> u32 {
        16
    }

    fn apply(
        &self,
        _config: &ScalerConfig,
        scale: u32,
        source: &[u8],
        source_size: Size,
    ) -> Result<ScaledImage, ScaleError> {
        validate_input(self, scale, source, source_size)?;

        let target_size = source_size.scaled(scale);
        let mut target = alloc_target(target_size)?;

        let src_row = source_size.w as usize * 4;
        let dst_row = target_size.w as usize * 4;
        let scale = scale as usize;

        for sy in 0..source_size.h as usize {
            let first = sy * scale * dst_row;
            {
                let src = &source[sy * src_row..(sy + 1) * src_row];
                let dst = &mut target[first..first + dst_row];
                for (sx, px) in src.chunks_exact(4).enumerate() {
                    for k in 0..scale {
                        let di = (sx * scale + k) * 4;
                        dst[di..di + 4].copy_from_slice(px);
                    }
                }
            }
            // Remaining rows of the block are copies of the first.
            for k in 1..scale {
                target.copy_within(first..first + dst_row, first + k * dst_row);
            }
        }

        Ok(ScaledImage { pixels: target, size: target_size })
    }
}
