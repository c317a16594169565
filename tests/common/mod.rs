//! Common test utilities and helpers for the engine tests
//!
//! Devices and scalers that record what the engine asked of them, plus
//! source image builders.

#![allow(dead_code)]

/// Route engine logs through the test harness; safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub mod devices {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::thread::ThreadId;

    use parking_lot::Mutex;
    use sprite_resampler::{RenderDevice, ResampleResult, TextureDesc, TextureId};

    /// Device that remembers every create and destroy, and panics when
    /// called off the thread that built it.
    pub struct RecordingDevice {
        owner: ThreadId,
        next_id: AtomicU64,
        created: Mutex<Vec<TextureId>>,
        destroyed: Mutex<HashMap<TextureId, usize>>,
    }

    impl RecordingDevice {
        pub fn new() -> Self {
            Self {
                owner: std::thread::current().id(),
                next_id: AtomicU64::new(0),
                created: Mutex::new(Vec::new()),
                destroyed: Mutex::new(HashMap::new()),
            }
        }

        fn assert_owner(&self, op: &str) {
            assert_eq!(
                std::thread::current().id(),
                self.owner,
                "{} called off the render thread",
                op
            );
        }

        pub fn created(&self) -> Vec<TextureId> {
            self.created.lock().clone()
        }

        /// How many times each texture was destroyed.
        pub fn destroy_counts(&self) -> HashMap<TextureId, usize> {
            self.destroyed.lock().clone()
        }

        pub fn live(&self) -> usize {
            let destroyed = self.destroyed.lock();
            self.created.lock().iter().filter(|id| !destroyed.contains_key(id)).count()
        }
    }

    impl RenderDevice for RecordingDevice {
        fn create_texture(&self, _desc: &TextureDesc, _pixels: &[u8]) -> ResampleResult<TextureId> {
            self.assert_owner("create_texture");
            let id = TextureId(self.next_id.fetch_add(1, Ordering::AcqRel) + 1);
            self.created.lock().push(id);
            Ok(id)
        }

        fn destroy_texture(&self, id: TextureId) {
            self.assert_owner("destroy_texture");
            *self.destroyed.lock().entry(id).or_insert(0) += 1;
        }
    }
}

pub mod scalers {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use sprite_resampler::sprite_scale::nearest::NearestScaler;
    use sprite_resampler::sprite_scale::{ScaleError, ScaledImage, Scaler, ScalerConfig, Size};

    /// Nearest-neighbour scaler that counts calls and can be slowed down.
    #[derive(Default)]
    pub struct CountingScaler {
        calls: AtomicUsize,
        delay: Duration,
    }

    impl CountingScaler {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn slow(delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay,
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::Acquire)
        }
    }

    impl Scaler for CountingScaler {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn min_scale(&self) -> u32 {
            NearestScaler.min_scale()
        }

        fn max_scale(&self) -> u32 {
            NearestScaler.max_scale()
        }

        fn apply(
            &self,
            config: &ScalerConfig,
            scale: u32,
            source: &[u8],
            source_size: Size,
        ) -> Result<ScaledImage, ScaleError> {
            self.calls.fetch_add(1, Ordering::AcqRel);
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            NearestScaler.apply(config, scale, source, source_size)
        }
    }

    /// Scaler whose target allocation always fails.
    #[derive(Default)]
    pub struct OomScaler {
        calls: AtomicUsize,
    }

    impl OomScaler {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::Acquire)
        }
    }

    impl Scaler for OomScaler {
        fn name(&self) -> &'static str {
            "oom"
        }

        fn min_scale(&self) -> u32 {
            1
        }

        fn max_scale(&self) -> u32 {
            8
        }

        fn apply(
            &self,
            _config: &ScalerConfig,
            scale: u32,
            _source: &[u8],
            source_size: Size,
        ) -> Result<ScaledImage, ScaleError> {
            self.calls.fetch_add(1, Ordering::AcqRel);
            Err(ScaleError::OutOfMemory {
                bytes: source_size.scaled(scale).byte_len(),
            })
        }
    }
}

pub mod sources {
    use sprite_resampler::sprite_scale::presets::ScalerKind;
    use sprite_resampler::{EngineConfig, SourceDesc};

    /// Opaque RGBA8 pattern; `seed` varies the content.
    pub fn opaque(width: u32, height: u32, seed: u8) -> Vec<u8> {
        (0..width * height)
            .flat_map(|i| [(i % 251) as u8, seed, (i / width) as u8, 255])
            .collect()
    }

    pub fn sheet(name: &str, width: u32, height: u32, seed: u8) -> SourceDesc {
        SourceDesc::rgba8(Some(name), width, height, opaque(width, height, seed))
    }

    /// Synchronous, nearest-neighbour, no frame budget.
    pub fn sync_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.async_scaling.enabled = false;
        config.frame_budget.enabled = false;
        config.scaler.kind = ScalerKind::Nearest;
        config
    }

    pub fn async_config(workers: usize) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.async_scaling.worker_threads = workers;
        config.scaler.kind = ScalerKind::Nearest;
        config
    }
}
