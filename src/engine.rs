//! # Sprite Engine
//!
//! The host-facing facade. A host registers source images, asks for the
//! resampled version of a sprite region every time it draws one, and pumps
//! the engine once per frame on its render thread.
//!
//! ## Request Flow
//!
//! ```text
//! on_draw_request(source, bounds, scale)
//!   │
//!   ├─ eligibility gate ─────────────── no ──▶ None (draw the original)
//!   ├─ ActiveMap hit, fresh ──────────────────▶ Ready entry
//!   ├─ (key, revision) already claimed ───────▶ stale image or None
//!   ├─ source pixels locked by a writer ──────▶ stale image or None
//!   ├─ invalidated entry, same content hash ──▶ revalidated entry
//!   ├─ SuspendedCache hit (content hash) ─────▶ resurrected entry
//!   └─ dispatch
//!        ├─ async ──▶ worker pool ──▶ completion channel ──▶ pump installs
//!        ├─ sync  ──▶ computed inline, installed now on the render thread
//!        └─ over frame budget ──▶ stale image or None
//! ```
//!
//! A dispatched task first tries the persistent cache and only runs the
//! pipeline on a miss, so disk reads never happen on the request path. The
//! frame budget estimates such tasks from the persistent load timings.
//!
//! Every cached result carries the [`PipelineFingerprint`] it was produced
//! with; entries from another scaler or other output settings are never
//! served, resurrected or loaded.
//!
//! ## Threads
//!
//! Any thread may call [`SpriteEngine::on_draw_request`]. Textures are only
//! created and destroyed on the thread that built the engine: completions
//! from other threads wait in a channel until [`SpriteEngine::pump`] or
//! [`SpriteEngine::end_frame`] runs there.
//!
//! ## Frame Lifecycle
//!
//! ```rust
//! use std::sync::Arc;
//! use sprite_resampler::config::EngineConfig;
//! use sprite_resampler::core::geometry::Bounds;
//! use sprite_resampler::engine::SpriteEngine;
//! use sprite_resampler::source::SourceDesc;
//!
//! let mut config = EngineConfig::default();
//! config.async_scaling.enabled = false;
//! let engine = SpriteEngine::builder(config).build().unwrap();
//! let sheet = engine
//!     .register_source(SourceDesc::rgba8(Some("Characters/Abigail"), 32, 32, vec![255; 32 * 32 * 4]))
//!     .unwrap();
//!
//! engine.begin_frame();
//! let image = engine.on_draw_request(sheet, Bounds::new(0, 0, 16, 16), 4).unwrap();
//! assert_eq!(image.unpadded_size.w, 64);
//! engine.end_frame();
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use sprite_scale::Scaler;

use crate::cache::codec;
use crate::cache::{ActiveMap, DiskCache, PersistentCache, ResampledSprite, SpriteKey, SuspendedCache};
use crate::config::{EngineConfig, SharedConfig};
use crate::core::buffer_pool::BufferPool;
use crate::core::frame_clock::FrameClock;
use crate::core::geometry::Bounds;
use crate::core::hash::{ContentHash, content_hash};
use crate::core::texel_timer::TexelTimers;
use crate::eligibility::EligibilityGate;
use crate::error::{Recoverable, RecoveryStrategy, ResampleError, ResampleResult, classify};
use crate::processing::{PipelineFingerprint, ResampleJob, ResamplePipeline, ResampledPixels, effective_scale};
use crate::render::{HeadlessDevice, ReleaseQueue, RenderDevice, SpriteImage, TextureDesc};
use crate::scheduler::{Claim, Completion, ComputeFn, Computed, Mode, Origin, ReclaimFn, Task, TaskScheduler};
use crate::source::{SourceDesc, SourceHandle, SourceImage, SourceRegistry};
use crate::stats::{EngineStats, StatsSnapshot};

/// Pooled scratch buffers kept between resamples.
const POOLED_BUFFERS: usize = 8;
/// Scratch buffers above this size are freed instead of pooled.
const POOLED_BUFFER_MAX_BYTES: usize = 16 << 20;

pub struct EngineBuilder {
    config: EngineConfig,
    device: Option<Arc<dyn RenderDevice>>,
    persistent: Option<Arc<dyn PersistentCache>>,
    scaler: Option<Arc<dyn Scaler>>,
}

impl EngineBuilder {
    /// Render device; defaults to a [`HeadlessDevice`].
    pub fn device(mut self, device: Arc<dyn RenderDevice>) -> Self {
        self.device = Some(device);
        self
    }

    /// Persistent tier; defaults to a [`DiskCache`] when `persistent_cache.enabled`.
    pub fn persistent_cache(mut self, cache: Arc<dyn PersistentCache>) -> Self {
        self.persistent = Some(cache);
        self
    }

    /// Use `scaler` instead of the one named by `scaler.kind`.
    pub fn scaler(mut self, scaler: Arc<dyn Scaler>) -> Self {
        self.scaler = Some(scaler);
        self
    }

    /// Build the engine. The calling thread becomes the render thread.
    pub fn build(self) -> ResampleResult<SpriteEngine> {
        let config = SharedConfig::new(self.config)?;
        let snapshot = config.snapshot();

        let persistent = match self.persistent {
            Some(cache) => Some(cache),
            None if snapshot.persistent_cache.enabled => Some(open_disk_cache(&snapshot)?),
            None => None,
        };

        let stats = Arc::new(EngineStats::new());
        let pool = Arc::new(BufferPool::with_limit(POOLED_BUFFERS, POOLED_BUFFER_MAX_BYTES));
        let suspended = Arc::new(SuspendedCache::new(
            snapshot.suspended_cache.max_bytes as usize,
            snapshot.suspended_cache.max_count,
        ));

        let reclaim: ReclaimFn = {
            let (suspended, pool, stats) = (suspended.clone(), pool.clone(), stats.clone());
            Arc::new(move || {
                let mut freed = pool.clear();
                for entry in suspended.clear() {
                    freed += entry.byte_size();
                    if entry.dispose() {
                        EngineStats::bump(&stats.evictions);
                    }
                }
                freed
            })
        };
        let scheduler = TaskScheduler::new(
            snapshot.async_scaling.resolved_worker_threads(),
            Arc::new(TexelTimers::default()),
            stats.clone(),
            reclaim,
        )?;

        Ok(SpriteEngine {
            config,
            sources: SourceRegistry::new(),
            gate: EligibilityGate::new(),
            active: ActiveMap::new(),
            suspended,
            persistent: RwLock::new(persistent),
            scheduler,
            scaler_override: self.scaler,
            pipeline_cache: Mutex::new(None),
            device: self.device.unwrap_or_else(|| Arc::new(HeadlessDevice::new())),
            releases: ReleaseQueue::new(),
            clock: FrameClock::new(),
            pool,
            stats,
            reported_failures: Mutex::new(HashSet::new()),
            render_thread: std::thread::current().id(),
        })
    }
}

fn open_disk_cache(config: &EngineConfig) -> ResampleResult<Arc<dyn PersistentCache>> {
    Ok(Arc::new(DiskCache::open(config.persistent_cache.directory.clone())?))
}

pub struct SpriteEngine {
    config: SharedConfig,
    sources: SourceRegistry,
    gate: EligibilityGate,
    active: ActiveMap,
    suspended: Arc<SuspendedCache>,
    persistent: RwLock<Option<Arc<dyn PersistentCache>>>,
    scheduler: TaskScheduler,
    scaler_override: Option<Arc<dyn Scaler>>,
    /// (config generation, scaler, fingerprint)
    pipeline_cache: Mutex<Option<(u64, Arc<dyn Scaler>, PipelineFingerprint)>>,
    device: Arc<dyn RenderDevice>,
    releases: ReleaseQueue,
    clock: FrameClock,
    pool: Arc<BufferPool>,
    stats: Arc<EngineStats>,
    reported_failures: Mutex<HashSet<SpriteKey>>,
    render_thread: ThreadId,
}

impl SpriteEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            device: None,
            persistent: None,
            scaler: None,
        }
    }

    pub fn new(config: EngineConfig, device: Arc<dyn RenderDevice>) -> ResampleResult<Self> {
        Self::builder(config).device(device).build()
    }

    // ── Sources ──────────────────────────────────────────────────────────

    pub fn register_source(&self, desc: SourceDesc) -> ResampleResult<SourceHandle> {
        let handle = self.sources.register(desc)?;
        if let Some(source) = self.sources.get(handle) {
            log::debug!(
                "registered source '{}' {}x{} as {:?}",
                source.display_name(),
                source.width(),
                source.height(),
                handle
            );
        }
        Ok(handle)
    }

    pub fn source(&self, handle: SourceHandle) -> Option<Arc<SourceImage>> {
        self.sources.get(handle)
    }

    /// The source is gone: suspend its ready sprites, dispose the rest.
    ///
    /// Returns the number of sprites suspended.
    pub fn on_source_disposed(&self, handle: SourceHandle) -> usize {
        let Some(source) = self.sources.remove(handle) else {
            return 0;
        };
        source.mark_disposed();
        let mut suspended = 0;
        let mut disposed = 0;
        for entry in self.active.drain_source(handle) {
            if entry.is_ready() && self.suspend(&entry) {
                suspended += 1;
            } else {
                self.dispose_entry(&entry);
                disposed += 1;
            }
        }
        log::debug!(
            "source '{}' disposed: {} sprites suspended, {} disposed",
            source.display_name(),
            suspended,
            disposed
        );
        suspended
    }

    /// The host changed `region` of the source (the whole image for `None`).
    ///
    /// Returns the number of sprites invalidated.
    pub fn on_source_content_changed(&self, handle: SourceHandle, region: Option<Bounds>) -> usize {
        let Some(source) = self.sources.get(handle) else {
            return 0;
        };
        let revision = source.bump_revision();
        let invalidated = self.active.invalidate_overlapping(handle, region, revision);
        log::trace!("'{}' now at revision {}, {} sprites invalidated", source.display_name(), revision, invalidated);
        invalidated
    }

    /// Overwrite `region` of a source with RGBA8 `bytes` and invalidate what it touched.
    pub fn write_source_pixels(&self, handle: SourceHandle, region: Bounds, bytes: &[u8]) -> ResampleResult<u64> {
        let source = self
            .sources
            .get(handle)
            .ok_or_else(|| ResampleError::state("unregistered", "write_source_pixels"))?;
        let revision = source.write_region(region, bytes)?;
        self.active.invalidate_overlapping(handle, Some(region), revision);
        Ok(revision)
    }

    // ── Draw path ────────────────────────────────────────────────────────

    /// Key the engine would use for a draw request, or `None` if it is not eligible.
    pub fn key_for(&self, handle: SourceHandle, bounds: Bounds, requested_scale: u32) -> Option<SpriteKey> {
        let (config, generation) = self.config.current();
        let source = self.sources.get(handle)?;
        let class = self.gate.check(&source, bounds, &config, generation).ok()?;
        let (scaler, _) = self.pipeline(&config, generation);
        Some(SpriteKey {
            source: handle,
            bounds,
            scale: effective_scale(&config, scaler.as_ref(), requested_scale),
            class,
        })
    }

    /// Image to draw in place of `bounds` of the source, or `None` to draw the original.
    pub fn on_draw_request(&self, handle: SourceHandle, bounds: Bounds, requested_scale: u32) -> Option<Arc<SpriteImage>> {
        self.fetch_or_create(handle, bounds, requested_scale)
            .and_then(|entry| entry.image())
    }

    /// The ready, fresh entry for `key`, without scheduling anything.
    pub fn fetch(&self, key: &SpriteKey) -> Option<Arc<ResampledSprite>> {
        let entry = self.active.get(key)?;
        let source = self.sources.get(key.source)?;
        let (config, generation) = self.config.current();
        let (_, fingerprint) = self.pipeline(&config, generation);
        let fresh = entry.is_ready()
            && entry.source_revision() == source.revision()
            && entry.fingerprint() == fingerprint;
        if !fresh {
            return None;
        }
        entry.touch(self.clock.current_frame());
        Some(entry)
    }

    /// The entry to draw for a request, creating one if needed.
    ///
    /// Returns a ready entry, an invalidated predecessor whose image can be
    /// drawn meanwhile, or `None`.
    pub fn fetch_or_create(
        &self,
        handle: SourceHandle,
        bounds: Bounds,
        requested_scale: u32,
    ) -> Option<Arc<ResampledSprite>> {
        EngineStats::bump(&self.stats.draw_requests);
        let (config, generation) = self.config.current();
        let source = self.sources.get(handle)?;
        let class = match self.gate.check(&source, bounds, &config, generation) {
            Ok(class) => class,
            Err(_) => {
                EngineStats::bump(&self.stats.ineligible);
                return None;
            }
        };
        let (scaler, fingerprint) = self.pipeline(&config, generation);
        let scale = effective_scale(&config, scaler.as_ref(), requested_scale);
        let key = SpriteKey {
            source: handle,
            bounds,
            scale,
            class,
        };
        let revision = source.revision();
        let frame = self.clock.current_frame();

        let previous = match self.active.get(&key) {
            Some(entry)
                if entry.is_ready()
                    && entry.source_revision() == revision
                    && entry.fingerprint() == fingerprint =>
            {
                entry.touch(frame);
                EngineStats::bump(&self.stats.active_hits);
                return Some(entry);
            }
            Some(entry) => {
                if entry.is_ready() {
                    entry.invalidate();
                }
                Some(entry)
            }
            None => None,
        };

        if source.is_abandoned(bounds, scale, class, revision) {
            return self.serve_stale(previous);
        }

        let task = match self.scheduler.claim(key, revision, frame) {
            Claim::New(task) => task,
            Claim::Attached(_) => {
                EngineStats::bump(&self.stats.dedup_attaches);
                return self.serve_stale(previous);
            }
        };

        let hash = {
            let Some(pixels) = source.try_read_pixels() else {
                self.scheduler.release(&task);
                EngineStats::bump(&self.stats.blocked_reads);
                let error = ResampleError::blocked(source.display_name()).with_operation("hash sprite region");
                log::log!(classify::log_level(&error), "deferring {}: {}", key, error);
                return self.serve_stale(previous);
            };
            let hashed_scale = config.resample.dynamic_scale.then_some(scale);
            content_hash(&pixels, source.width(), bounds, hashed_scale, class)
        };

        // The write left this region as it was.
        if let Some(entry) = previous
            .as_ref()
            .filter(|p| p.content_hash() == hash && p.fingerprint() == fingerprint)
        {
            if entry.revalidate(revision, frame).is_ok() {
                self.scheduler.release(&task);
                EngineStats::bump(&self.stats.revalidations);
                log::trace!("{} unchanged at revision {}, keeping its image", key, revision);
                return Some(entry.clone());
            }
        }

        if config.suspended_cache.enabled {
            if let Some(entry) = self.try_resurrect(hash, key, fingerprint, revision, frame) {
                self.scheduler.release(&task);
                return Some(entry);
            }
        }

        let entry = Arc::new(ResampledSprite::pending(
            key,
            hash,
            revision,
            fingerprint,
            previous.as_ref(),
            frame,
        ));
        task.set_entry(entry.clone());

        let persistent = self.persistent_cache(&config);
        let cached = persistent.as_ref().is_some_and(|cache| cache.contains(hash));
        let remaining = self.clock.remaining(
            config.frame_budget.target_frame_time(),
            config.frame_budget.safety_margin(),
        );
        let named = source.name().is_some();
        let Some(mode) = self.scheduler.choose_mode(&config, bounds.area(), named, cached, remaining) else {
            self.scheduler.release(&task);
            entry.dispose();
            EngineStats::bump(&self.stats.budget_declines);
            return self.serve_stale(previous);
        };

        let job = ResampleJob {
            source: source.clone(),
            bounds,
            class,
            scale,
            content_hash: hash,
        };
        task.set_compute(self.compute_fn(&config, scaler, persistent, job));
        self.track_pending(key, &entry, &previous);

        match mode {
            Mode::Async => {
                log::trace!("dispatching {} to workers", key);
                self.scheduler.spawn(task);
                self.serve_stale(previous)
            }
            Mode::Sync => {
                let completion = self.scheduler.run_sync(task);
                self.complete(completion, previous)
            }
        }
    }

    fn serve_stale(&self, previous: Option<Arc<ResampledSprite>>) -> Option<Arc<ResampledSprite>> {
        let previous = previous.filter(|p| p.image().is_some())?;
        EngineStats::bump(&self.stats.stale_serves);
        Some(previous)
    }

    /// Make a fresh key's pending entry visible so there is one entry per key.
    fn track_pending(&self, key: SpriteKey, entry: &Arc<ResampledSprite>, previous: &Option<Arc<ResampledSprite>>) {
        if previous.is_none() {
            self.active.get_or_insert(key, entry);
        }
    }

    fn complete(
        &self,
        completion: Completion,
        previous: Option<Arc<ResampledSprite>>,
    ) -> Option<Arc<ResampledSprite>> {
        if !self.on_render_thread() {
            self.scheduler.deliver(completion);
            return self.serve_stale(previous);
        }
        let entry = completion.task.entry();
        self.install(completion);
        match entry.filter(|e| e.is_ready()) {
            Some(entry) => Some(entry),
            None => self.serve_stale(previous),
        }
    }

    fn compute_fn(
        &self,
        config: &Arc<EngineConfig>,
        scaler: Arc<dyn Scaler>,
        persistent: Option<Arc<dyn PersistentCache>>,
        job: ResampleJob,
    ) -> ComputeFn {
        let pipeline = ResamplePipeline::new(scaler, self.pool.clone(), config.clone());
        let compress = config.persistent_cache.compress;
        let stats = self.stats.clone();
        Box::new(move || {
            if let Some(cache) = &persistent {
                if let Some(pixels) = load_persistent(cache.as_ref(), &job, pipeline.fingerprint(), &stats) {
                    return Ok(Computed::loaded(pixels));
                }
            }
            EngineStats::bump(&stats.resamples);
            let pixels = pipeline.run(&job)?;
            if let Some(cache) = &persistent {
                match codec::encode(&pixels, compress) {
                    Ok(bytes) => cache.store(pixels.content_hash, &bytes),
                    Err(e) => log::warn!("failed to encode {} for the persistent cache: {}", pixels.content_hash, e),
                }
            }
            Ok(Computed::resampled(pixels))
        })
    }

    fn persistent_cache(&self, config: &EngineConfig) -> Option<Arc<dyn PersistentCache>> {
        if !config.persistent_cache.enabled {
            return None;
        }
        self.persistent.read().clone()
    }

    // ── Suspension ───────────────────────────────────────────────────────

    /// Move a ready entry into the suspended cache. Anything else is disposed.
    ///
    /// Returns whether the entry ended up suspended.
    pub fn suspend(&self, entry: &Arc<ResampledSprite>) -> bool {
        if let Some(key) = entry.key() {
            self.active.remove_if_same(&key, entry);
        }
        let config = self.config.snapshot();
        if !config.suspended_cache.enabled || entry.suspend(self.clock.current_frame()).is_err() {
            self.dispose_entry(entry);
            return false;
        }
        for evicted in self.suspended.insert(entry.content_hash(), entry.clone()) {
            self.dispose_entry(&evicted);
        }
        !entry.is_disposed()
    }

    /// Rebind a suspended entry with content `hash` to `key`.
    pub fn resurrect(&self, hash: ContentHash, key: SpriteKey) -> Option<Arc<ResampledSprite>> {
        let source = self.sources.get(key.source)?;
        let (config, generation) = self.config.current();
        let (_, fingerprint) = self.pipeline(&config, generation);
        self.try_resurrect(hash, key, fingerprint, source.revision(), self.clock.current_frame())
    }

    fn try_resurrect(
        &self,
        hash: ContentHash,
        key: SpriteKey,
        fingerprint: PipelineFingerprint,
        revision: u64,
        frame: u64,
    ) -> Option<Arc<ResampledSprite>> {
        let expected = key.bounds.size().scaled(key.scale);
        let entry = self.suspended.take_matching(hash, |entry| {
            entry.fingerprint() == fingerprint
                && entry
                    .state()
                    .image()
                    .is_some_and(|image| image.scale == key.scale && image.unpadded_size == expected)
        })?;
        if let Err(e) = entry.resurrect(key, revision, frame) {
            log::debug!("could not resurrect {} for {}: {}", hash, key, e);
            return None;
        }
        self.install_entry(key, entry.clone());
        EngineStats::bump(&self.stats.suspended_resurrections);
        log::trace!("resurrected {} as {}", hash, key);
        Some(entry)
    }

    // ── Installation (render thread) ─────────────────────────────────────

    fn install(&self, completion: Completion) {
        let Completion {
            task, result, origin, ..
        } = completion;
        let key = task.key();
        if let Some(entry) = task.entry() {
            let source = self.sources.get(key.source).filter(|s| !s.is_disposed());
            match result {
                Ok(pixels) => {
                    if origin == Origin::Persistent {
                        log::trace!("{} loaded from the persistent cache", key);
                    }
                    self.install_pixels(&task, &entry, source.as_deref(), pixels)
                }
                Err(error) => self.record_failure(&task, &entry, source.as_deref(), &error),
            }
        }
        self.scheduler.finish(&task);
    }

    fn install_pixels(&self, task: &Task, entry: &Arc<ResampledSprite>, source: Option<&SourceImage>, pixels: ResampledPixels) {
        let key = task.key();
        let current = source.map(|s| s.revision());
        let Some(source) = source.filter(|_| current == Some(task.revision())) else {
            EngineStats::bump(&self.stats.stale_discards);
            let error = ResampleError::stale(task.revision(), current.unwrap_or(u64::MAX));
            log::debug!("discarding result for {}: {}", key, error);
            self.discard(&key, entry);
            return;
        };

        let desc = TextureDesc {
            width: pixels.size.w,
            height: pixels.size.h,
            label: format!("{}{}@{}x", source.display_name(), key.bounds, key.scale),
        };
        let image = match self.releases.create(self.device.as_ref(), &desc, &pixels.pixels) {
            Ok(resource) => SpriteImage {
                resource,
                size: pixels.size,
                unpadded_size: pixels.unpadded_size,
                padding: pixels.padding,
                scale_factor: pixels.scale_factor,
                wrapped: pixels.wrapped,
                scale: pixels.scale,
            },
            Err(e) => {
                log::warn!("failed to create texture for {}: {}", key, e);
                EngineStats::bump(&self.stats.compute_failures);
                self.discard(&key, entry);
                return;
            }
        };

        if let Err(e) = entry.make_ready(image) {
            log::debug!("dropping result for {}: {}", key, e);
            self.discard(&key, entry);
            return;
        }
        self.install_entry(key, entry.clone());
        self.clock.mark_updated();
        EngineStats::bump(&self.stats.installs);
    }

    fn record_failure(
        &self,
        task: &Task,
        entry: &Arc<ResampledSprite>,
        source: Option<&SourceImage>,
        error: &ResampleError,
    ) {
        let key = task.key();
        EngineStats::bump(&self.stats.compute_failures);
        if let Some(source) = source {
            source.abandon(key.bounds, key.scale, key.class, task.revision());
        }
        let level = if self.reported_failures.lock().insert(key) {
            classify::log_level(error)
        } else {
            log::Level::Debug
        };
        log::log!(level, "giving up on {} at revision {}: {}", key, task.revision(), error);
        self.discard(&key, entry);
    }

    fn install_entry(&self, key: SpriteKey, entry: Arc<ResampledSprite>) {
        if let Some(displaced) = self.active.install(key, entry) {
            self.dispose_entry(&displaced);
        }
    }

    fn discard(&self, key: &SpriteKey, entry: &Arc<ResampledSprite>) {
        self.active.remove_if_same(key, entry);
        entry.dispose();
    }

    fn dispose_entry(&self, entry: &ResampledSprite) {
        if entry.dispose() {
            EngineStats::bump(&self.stats.evictions);
        }
    }

    // ── Frame lifecycle ──────────────────────────────────────────────────

    pub fn on_render_thread(&self) -> bool {
        std::thread::current().id() == self.render_thread
    }

    pub fn begin_frame(&self) -> u64 {
        let frame = self.clock.begin_frame();
        let config = self.config.snapshot();
        self.scheduler.begin_frame(frame, config.async_scaling.downgrade_after_frames);
        frame
    }

    /// Install finished work and release dropped textures. Render thread only.
    ///
    /// Returns the number of completions handled.
    pub fn pump(&self) -> usize {
        if !self.on_render_thread() {
            log::warn!("pump called off the render thread; ignoring");
            return 0;
        }
        let mut handled = 0;
        while let Some(completion) = self.scheduler.try_recv() {
            self.install(completion);
            handled += 1;
        }
        self.release_textures();
        handled
    }

    pub fn end_frame(&self) {
        self.pump();
        let config = self.config.snapshot();
        let max_active = config.memory.max_active_bytes as usize;
        if max_active > 0 {
            let purged = self.active.purge_to(max_active);
            if !purged.is_empty() {
                log::debug!("purged {} sprites over the {} byte ceiling", purged.len(), max_active);
                for entry in &purged {
                    self.dispose_entry(entry);
                }
                drop(purged);
                self.release_textures();
            }
        }
        self.clock.end_frame(config.frame_budget.target_frame_time());
    }

    /// Install completions as they arrive until nothing is in flight or `timeout` passes.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        if !self.on_render_thread() {
            return false;
        }
        let deadline = Instant::now() + timeout;
        while self.scheduler.in_flight() > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            if let Some(completion) = self.scheduler.recv_timeout(deadline - now) {
                self.install(completion);
            }
        }
        self.pump();
        true
    }

    fn release_textures(&self) {
        let released = self.releases.drain(self.device.as_ref());
        EngineStats::add(&self.stats.textures_released, released as u64);
    }

    // ── Configuration and maintenance ────────────────────────────────────

    /// Validate and apply a new configuration; returns its generation.
    ///
    /// The worker count is fixed at construction.
    pub fn reload_config(&self, config: EngineConfig) -> ResampleResult<u64> {
        let (previous, previous_generation) = self.config.current();
        let (_, previous_fingerprint) = self.pipeline(&previous, previous_generation);
        self.config.replace(config)?;
        let (config, generation) = self.config.current();
        let (_, fingerprint) = self.pipeline(&config, generation);

        // Suspended images from another pipeline can never be resurrected.
        let evicted = if config.suspended_cache.enabled && fingerprint == previous_fingerprint {
            self.suspended.set_limits(
                config.suspended_cache.max_bytes as usize,
                config.suspended_cache.max_count,
            )
        } else {
            if fingerprint != previous_fingerprint {
                log::debug!("pipeline changed from {} to {}, dropping suspended sprites", previous_fingerprint, fingerprint);
            }
            self.suspended.clear()
        };
        for entry in &evicted {
            self.dispose_entry(entry);
        }

        if config.persistent_cache.enabled && self.persistent.read().is_none() {
            *self.persistent.write() = Some(open_disk_cache(&config)?);
        }
        self.reported_failures.lock().clear();
        Ok(generation)
    }

    /// Dispose every cached sprite and drop pooled buffers.
    pub fn purge_all(&self) {
        let mut purged = 0;
        for entry in self.active.drain_all().into_iter().chain(self.suspended.clear()) {
            self.dispose_entry(&entry);
            purged += 1;
        }
        self.pool.clear();
        if self.on_render_thread() {
            self.release_textures();
        }
        log::info!("purged {} sprites", purged);
    }

    /// Scaler and fingerprint for configuration `generation`.
    fn pipeline(&self, config: &EngineConfig, generation: u64) -> (Arc<dyn Scaler>, PipelineFingerprint) {
        let mut cached = self.pipeline_cache.lock();
        if let Some((cached_generation, scaler, fingerprint)) = &*cached {
            if *cached_generation == generation {
                return (scaler.clone(), *fingerprint);
            }
        }
        let scaler: Arc<dyn Scaler> = match &self.scaler_override {
            Some(scaler) => scaler.clone(),
            None => Arc::from(config.scaler.kind.create()),
        };
        let fingerprint = PipelineFingerprint::new(config, scaler.as_ref());
        log::debug!("using {} scaler, pipeline {}", scaler.name(), fingerprint);
        *cached = Some((generation, scaler.clone(), fingerprint));
        (scaler, fingerprint)
    }

    // ── Introspection ────────────────────────────────────────────────────

    pub fn config(&self) -> Arc<EngineConfig> {
        self.config.snapshot()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn frame_clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn active_bytes(&self) -> usize {
        self.active.total_bytes()
    }

    pub fn suspended_len(&self) -> usize {
        self.suspended.len()
    }

    pub fn suspended_bytes(&self) -> usize {
        self.suspended.total_bytes()
    }

    pub fn pending_releases(&self) -> usize {
        self.releases.pending()
    }
}

impl Drop for SpriteEngine {
    fn drop(&mut self) {
        if self.on_render_thread() {
            self.purge_all();
        }
    }
}

impl std::fmt::Debug for SpriteEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpriteEngine")
            .field("sources", &self.sources.len())
            .field("active", &self.active.len())
            .field("suspended", &self.suspended)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

/// Load the persistent entry for `job`. Entries that fail to decode, or
/// that another pipeline wrote, are purged.
fn load_persistent(
    cache: &dyn PersistentCache,
    job: &ResampleJob,
    fingerprint: PipelineFingerprint,
    stats: &EngineStats,
) -> Option<ResampledPixels> {
    let hash = job.content_hash;
    let bytes = cache.load(hash)?;
    let decoded = codec::decode(hash, &bytes).and_then(|pixels| {
        if pixels.fingerprint != fingerprint {
            return Err(ResampleError::corrupt(
                hash.0,
                format!("written by pipeline {}, expected {}", pixels.fingerprint, fingerprint),
            ));
        }
        let expected = job.bounds.size().scaled(job.scale);
        if pixels.scale != job.scale || pixels.unpadded_size != expected {
            return Err(ResampleError::corrupt(
                hash.0,
                format!("holds {}x{} at {}x", pixels.unpadded_size.w, pixels.unpadded_size.h, pixels.scale),
            ));
        }
        Ok(pixels)
    });
    drop(bytes);
    match decoded {
        Ok(pixels) => {
            EngineStats::bump(&stats.persistent_hits);
            Some(pixels)
        }
        Err(error) => {
            log::log!(classify::log_level(&error), "persistent entry {} rejected: {}", hash, error);
            if error.recovery_strategies().contains(&RecoveryStrategy::PurgeEntry) {
                cache.remove(hash);
            }
            EngineStats::bump(&stats.persistent_corrupt);
            None
        }
    }
}
