// SPDX-License-Identifier: MIT
//! # Scaler Selection
//!
//! Maps a configuration tag to a concrete [`Scaler`]. The engine keeps one
//! boxed scaler per configuration generation and swaps it on reload.
//!
//! | Kind      | Range  | Suited for                        |
//! |-----------|--------|-----------------------------------|
//! | `nearest` | 1..=16 | previews, debugging               |
//! | `epx`     | 2..=4  | hard-edged pixel art              |
//! | `lanczos` | 1..=16 | painted art, smooth gradients     |

use serde::{Deserialize, Serialize};

use crate::cpu::{ConvolutionScaler, Filter};
use crate::epx::EpxScaler;
use crate::nearest::NearestScaler;
use crate::Scaler;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalerKind {
    Nearest,
    Epx,
    #[default]
    Lanczos,
}

impl ScalerKind {
    pub const ALL: [ScalerKind; 3] = [ScalerKind::Nearest, ScalerKind::Epx, ScalerKind::Lanczos];

    /// Build a fresh scaler instance for this kind.
    pub fn create(self) -> Box<dyn Scaler> {
        match self {
            ScalerKind::Nearest => Box::new(NearestScaler),
            ScalerKind::Epx => Box::new(EpxScaler),
            ScalerKind::Lanczos => Box::new(ConvolutionScaler::new(Filter::Lanczos3)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalerKind::Nearest => "nearest",
            ScalerKind::Epx => "epx",
            ScalerKind::Lanczos => "lanczos",
        }
    }

    /// Case-insensitive lookup by [`ScalerKind::name`].
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name().eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Display for ScalerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
