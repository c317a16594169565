//! # Configuration Module
//!
//! Engine configuration structures and the hot-reloadable [`SharedConfig`] handle.

#[allow(clippy::module_inception)]
pub mod config;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

pub use config::{
    AsyncScalingConfig, EngineConfig, FrameBudgetConfig, MemoryConfig, PaddingConfig, PersistentCacheConfig,
    ResampleConfig, ScalerSettings, SuspendedCacheConfig, WrapDetectionConfig,
};

use crate::error::ResampleResult;

/// Read-mostly configuration shared by every engine component.
///
/// Readers take an `Arc` snapshot per call and never hold the lock across
/// work. [`SharedConfig::replace`] validates first, so a bad reload leaves the
/// running configuration untouched.
#[derive(Debug)]
pub struct SharedConfig {
    current: RwLock<Arc<EngineConfig>>,
    generation: AtomicU64,
}

impl SharedConfig {
    pub fn new(config: EngineConfig) -> ResampleResult<Self> {
        config.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(config)),
            generation: AtomicU64::new(1),
        })
    }

    pub fn snapshot(&self) -> Arc<EngineConfig> {
        self.current.read().clone()
    }

    /// Snapshot and its generation, read consistently.
    pub fn current(&self) -> (Arc<EngineConfig>, u64) {
        let guard = self.current.read();
        (guard.clone(), self.generation.load(Ordering::Acquire))
    }

    /// Bumped on every successful [`SharedConfig::replace`].
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Swap in a new configuration and return the new generation.
    pub fn replace(&self, config: EngineConfig) -> ResampleResult<u64> {
        config.validate()?;
        let mut guard = self.current.write();
        *guard = Arc::new(config);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        drop(guard);
        log::info!("configuration reloaded (generation {})", generation);
        Ok(generation)
    }
}
