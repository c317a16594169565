//! # Texel Timers
//!
//! Running cost-per-texel estimates used by the frame budget. The scheduler
//! records every compute it performs and asks for an estimate before it
//! commits the render thread to synchronous work.
//!
//! ## Model
//!
//! Cost is tracked in nanoseconds per source texel. The first `window`
//! samples build a plain mean; after that each sample moves the estimate by
//! `1/window` of its difference (an exponential moving average), so a few
//! outliers cannot swing the budget.
//!
//! Four timers are kept, one for each combination of:
//! - **cached**: the result was loaded from the persistent cache
//! - **async**: the work ran on a worker rather than inline
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use sprite_resampler::core::texel_timer::TexelTimer;
//!
//! let timer = TexelTimer::new(50);
//! timer.record(1000, Duration::from_micros(100));
//! assert_eq!(timer.estimate(2000), Duration::from_micros(200));
//! ```

use std::time::Duration;

use parking_lot::Mutex;

/// Samples averaged before switching to the moving average.
pub const DEFAULT_WINDOW: u32 = 50;

#[derive(Debug, Clone, Copy, Default)]
struct TimerState {
    ns_per_texel: f64,
    samples: u32,
}

#[derive(Debug)]
pub struct TexelTimer {
    state: Mutex<TimerState>,
    window: u32,
}

impl TexelTimer {
    pub fn new(window: u32) -> Self {
        Self {
            state: Mutex::new(TimerState::default()),
            window: window.max(1),
        }
    }

    /// Timer that starts from a known cost and counts it as one sample.
    pub fn seeded(window: u32, ns_per_texel: f64) -> Self {
        Self {
            state: Mutex::new(TimerState {
                ns_per_texel: ns_per_texel.max(0.0),
                samples: 1,
            }),
            window: window.max(1),
        }
    }

    pub fn record(&self, texels: u64, elapsed: Duration) {
        if texels == 0 {
            return;
        }
        let sample = elapsed.as_nanos() as f64 / texels as f64;
        let mut state = self.state.lock();
        state.samples = state.samples.saturating_add(1);
        let n = state.samples.min(self.window) as f64;
        state.ns_per_texel += (sample - state.ns_per_texel) / n;
    }

    /// Expected duration for `texels`; zero until the first sample.
    pub fn estimate(&self, texels: u64) -> Duration {
        let state = self.state.lock();
        Duration::from_nanos((state.ns_per_texel * texels as f64).round() as u64)
    }

    pub fn ns_per_texel(&self) -> f64 {
        self.state.lock().ns_per_texel
    }

    pub fn samples(&self) -> u32 {
        self.state.lock().samples
    }

    pub fn reset(&self) {
        *self.state.lock() = TimerState::default();
    }
}

impl Default for TexelTimer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

/// The four timers, indexed by (cached, async).
#[derive(Debug, Default)]
pub struct TexelTimers {
    timers: [TexelTimer; 4],
}

impl TexelTimers {
    fn index(cached: bool, is_async: bool) -> usize {
        (cached as usize) << 1 | is_async as usize
    }

    pub fn get(&self, cached: bool, is_async: bool) -> &TexelTimer {
        &self.timers[Self::index(cached, is_async)]
    }

    pub fn record(&self, cached: bool, is_async: bool, texels: u64, elapsed: Duration) {
        self.get(cached, is_async).record(texels, elapsed);
    }

    pub fn estimate(&self, cached: bool, is_async: bool, texels: u64) -> Duration {
        self.get(cached, is_async).estimate(texels)
    }

    /// Start every timer from the same known cost.
    pub fn seed_all(&self, ns_per_texel: f64) {
        for timer in &self.timers {
            let mut state = timer.state.lock();
            state.ns_per_texel = ns_per_texel.max(0.0);
            state.samples = 1;
        }
    }
}
