//! # Frame Clock
//!
//! Tracks the current frame number and how much of the current frame is
//! left for synchronous resampling.
//!
//! ```text
//! remaining = frame_period - elapsed_since_begin_frame - (baseline + safety_margin)
//! ```
//!
//! `baseline` is a running mean (1/20 weight per frame) of the host's own
//! frame cost, sampled only on frames where the engine did no resample work.
//! Frames that overran by more than one whole period are ignored.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

const BASELINE_RUNNING_COUNT: u32 = 20;

#[derive(Debug)]
pub struct FrameClock {
    frame: AtomicU64,
    started: Mutex<Instant>,
    baseline: Mutex<Duration>,
    updated_this_frame: AtomicBool,
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            frame: AtomicU64::new(0),
            started: Mutex::new(Instant::now()),
            baseline: Mutex::new(Duration::ZERO),
            updated_this_frame: AtomicBool::new(false),
        }
    }

    pub fn current_frame(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }

    /// Advance the frame counter and restart the stopwatch; returns the new frame.
    pub fn begin_frame(&self) -> u64 {
        *self.started.lock() = Instant::now();
        self.updated_this_frame.store(false, Ordering::Release);
        self.frame.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn elapsed(&self) -> Duration {
        self.started.lock().elapsed()
    }

    /// Note that resample work happened this frame, so it is excluded from the baseline.
    pub fn mark_updated(&self) {
        self.updated_this_frame.store(true, Ordering::Release);
    }

    pub fn updated_this_frame(&self) -> bool {
        self.updated_this_frame.load(Ordering::Acquire)
    }

    /// Close the frame and fold its duration into the baseline if it was idle.
    pub fn end_frame(&self, period: Duration) {
        if self.updated_this_frame() {
            return;
        }
        let duration = self.elapsed();
        if duration > period * 2 {
            return;
        }
        let mut baseline = self.baseline.lock();
        let mean = *baseline - *baseline / BASELINE_RUNNING_COUNT + duration / BASELINE_RUNNING_COUNT;
        *baseline = mean;
    }

    pub fn baseline(&self) -> Duration {
        *self.baseline.lock()
    }

    /// Time left in this frame for synchronous work.
    pub fn remaining(&self, period: Duration, safety_margin: Duration) -> Duration {
        period
            .saturating_sub(self.elapsed())
            .saturating_sub(self.baseline() + safety_margin)
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
