//! Engine counters.
//!
//! Plain relaxed atomics bumped from any thread; [`EngineStats::snapshot`]
//! copies them out for reporting.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

macro_rules! counters {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        #[derive(Debug, Default)]
        pub struct EngineStats {
            $($(#[$doc])* pub $name: AtomicU64,)*
        }

        /// Point-in-time copy of [`EngineStats`].
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
        pub struct StatsSnapshot {
            $($(#[$doc])* pub $name: u64,)*
        }

        impl EngineStats {
            pub fn snapshot(&self) -> StatsSnapshot {
                StatsSnapshot {
                    $($name: self.$name.load(Ordering::Relaxed),)*
                }
            }

            pub fn reset(&self) {
                $(self.$name.store(0, Ordering::Relaxed);)*
            }
        }
    };
}

counters! {
    draw_requests,
    /// Requests refused by the eligibility gate.
    ineligible,
    active_hits,
    /// Invalidated entries whose region hashed the same and were reused as is.
    revalidations,
    /// Requests answered with a previous image while a fresh one is pending.
    stale_serves,
    suspended_resurrections,
    persistent_hits,
    /// Persistent entries that failed to decode and were purged.
    persistent_corrupt,
    dispatches_sync,
    dispatches_async,
    dedup_attaches,
    /// Pipeline runs, as opposed to tasks answered from the persistent cache.
    resamples,
    stale_discards,
    budget_declines,
    blocked_reads,
    oom_retries,
    compute_failures,
    installs,
    /// Entries disposed from any cache tier.
    evictions,
    textures_released,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

impl StatsSnapshot {
    /// Fraction of draw requests answered from a cache tier.
    pub fn hit_rate(&self) -> f64 {
        if self.draw_requests == 0 {
            return 0.0;
        }
        let hits = self.active_hits + self.revalidations + self.suspended_resurrections + self.persistent_hits;
        hits as f64 / self.draw_requests as f64
    }

    pub fn report(&self) -> String {
        format!(
            "Sprite Engine Stats:\n\
             - Draw requests: {} ({} ineligible)\n\
             - Hits: active {}, revalidated {}, resurrected {}, persistent {} ({:.1}% hit rate)\n\
             - Stale serves: {}\n\
             - Dispatches: {} sync, {} async, {} deduplicated, {} resampled\n\
             - Declined: {} over budget, {} blocked reads\n\
             - Results: {} installed, {} stale discarded, {} failed ({} OOM retries)\n\
             - Evictions: {}, textures released: {}, corrupt persistent entries: {}",
            self.draw_requests,
            self.ineligible,
            self.active_hits,
            self.revalidations,
            self.suspended_resurrections,
            self.persistent_hits,
            self.hit_rate() * 100.0,
            self.stale_serves,
            self.dispatches_sync,
            self.dispatches_async,
            self.dedup_attaches,
            self.resamples,
            self.budget_declines,
            self.blocked_reads,
            self.installs,
            self.stale_discards,
            self.compute_failures,
            self.oom_retries,
            self.evictions,
            self.textures_released,
            self.persistent_corrupt,
        )
    }
}
