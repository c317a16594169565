//! # Task Scheduler
//!
//! Decides how resample work runs and makes sure each `(key, revision)` is
//! computed at most once.
//!
//! ## Architecture
//!
//! ```text
//!  fetch_or_create ──claim──▶ in-flight map ──▶ run_sync ─────────────────┐
//!                                   │                                      │
//!                                   └──spawn──▶ TaskQueue ──▶ rayon pool ──┤
//!                                                                          ▼
//!                                             completion channel ──▶ render thread installs
//! ```
//!
//! - A binding stays claimed from dispatch until the render thread has
//!   installed or discarded its completion, so a request arriving in between
//!   attaches instead of computing again.
//! - The queue has two lanes. Tasks nobody asked for in
//!   `downgrade_after_frames` frames move to the low lane; a new request for
//!   a downgraded task moves it back.
//! - Every compute runs under `catch_unwind`. A failure is retried while
//!   [`Retryable::max_retries`] allows; failures whose recovery starts with
//!   [`RecoveryStrategy::ReclaimAndRetry`] reclaim memory first.
//! - Timing samples are recorded per origin, so persistent loads and
//!   resamples feed separate estimates.

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use super::task::{Claim, Completion, ComputeFn, Computed, Mode, Origin, Priority, Task};
use crate::cache::key::SpriteKey;
use crate::config::EngineConfig;
use crate::core::texel_timer::TexelTimers;
use crate::error::{Recoverable, RecoveryStrategy, ResampleError, ResampleResult, classify};
use crate::stats::EngineStats;

/// Releases reclaimable memory; returns roughly how many bytes were freed.
pub type ReclaimFn = Arc<dyn Fn() -> usize + Send + Sync>;

#[derive(Debug, Default)]
struct Lanes {
    normal: VecDeque<Arc<Task>>,
    downgraded: VecDeque<Arc<Task>>,
}

/// Pending async tasks, normal lane first.
#[derive(Debug, Default)]
pub struct TaskQueue {
    lanes: Mutex<Lanes>,
}

impl TaskQueue {
    pub fn push(&self, task: Arc<Task>) {
        let mut lanes = self.lanes.lock();
        match task.priority() {
            Priority::Normal => lanes.normal.push_back(task),
            Priority::Downgraded => lanes.downgraded.push_back(task),
        }
    }

    pub fn pop(&self) -> Option<Arc<Task>> {
        let mut lanes = self.lanes.lock();
        lanes.normal.pop_front().or_else(|| lanes.downgraded.pop_front())
    }

    /// Move a downgraded task back to the normal lane.
    pub fn restore(&self, task: &Arc<Task>) {
        let mut lanes = self.lanes.lock();
        if let Some(i) = lanes.downgraded.iter().position(|t| Arc::ptr_eq(t, task)) {
            if let Some(task) = lanes.downgraded.remove(i) {
                task.set_priority(Priority::Normal);
                lanes.normal.push_back(task);
            }
        } else {
            task.set_priority(Priority::Normal);
        }
    }

    /// Downgrade queued tasks last requested more than `after` frames before `frame`.
    pub fn downgrade_idle(&self, frame: u64, after: u64) -> usize {
        let mut lanes = self.lanes.lock();
        let (idle, keep): (VecDeque<_>, VecDeque<_>) = lanes
            .normal
            .drain(..)
            .partition(|t| frame.saturating_sub(t.requested_frame()) >= after);
        lanes.normal = keep;
        let moved = idle.len();
        for task in idle {
            task.set_priority(Priority::Downgraded);
            lanes.downgraded.push_back(task);
        }
        moved
    }

    /// `(normal, downgraded)` lengths.
    pub fn lengths(&self) -> (usize, usize) {
        let lanes = self.lanes.lock();
        (lanes.normal.len(), lanes.downgraded.len())
    }
}

/// What a worker needs, shared with every spawned job.
struct WorkerContext {
    queue: TaskQueue,
    timers: Arc<TexelTimers>,
    stats: Arc<EngineStats>,
    reclaim: ReclaimFn,
    completions: Sender<Completion>,
}

impl WorkerContext {
    fn execute(&self, task: Arc<Task>, mode: Mode) -> Completion {
        let started = Instant::now();
        let result = match task.take_compute() {
            Some(compute) => self.run_with_retries(&task, &compute),
            None => Err(ResampleError::state("executed", "execute")),
        };
        let elapsed = started.elapsed();
        let (result, origin) = match result {
            Ok(computed) => {
                let cached = computed.origin == Origin::Persistent;
                self.timers.record(cached, mode == Mode::Async, task.texels(), elapsed);
                (Ok(computed.pixels), computed.origin)
            }
            Err(error) => (Err(error), Origin::Compute),
        };
        Completion {
            task,
            result,
            elapsed,
            mode,
            origin,
        }
    }

    /// Run `compute`, retrying as long as the failure's retry budget allows.
    fn run_with_retries(&self, task: &Task, compute: &ComputeFn) -> ResampleResult<Computed> {
        let mut attempts = 0;
        loop {
            let error = match run_guarded(&task.key(), compute) {
                Ok(computed) => return Ok(computed),
                Err(error) => error,
            };
            if !classify::may_retry(&error, attempts) {
                return Err(error);
            }
            attempts += 1;
            if error.recovery_strategies().contains(&RecoveryStrategy::ReclaimAndRetry) {
                EngineStats::bump(&self.stats.oom_retries);
                let freed = (self.reclaim)();
                log::warn!("{}, reclaimed {} bytes, retry {}", error, freed, attempts);
            } else {
                log::debug!("{}, retry {}", error, attempts);
            }
        }
    }
}

fn run_guarded(key: &SpriteKey, compute: &ComputeFn) -> ResampleResult<Computed> {
    match panic::catch_unwind(AssertUnwindSafe(compute)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ResampleError::compute_failure(key.to_string(), format!("panicked: {}", message)))
        }
    }
}

pub struct TaskScheduler {
    in_flight: Mutex<HashMap<(SpriteKey, u64), Arc<Task>>>,
    context: Arc<WorkerContext>,
    receiver: Receiver<Completion>,
    pool: rayon::ThreadPool,
    workers: usize,
}

impl TaskScheduler {
    pub fn new(
        worker_threads: usize,
        timers: Arc<TexelTimers>,
        stats: Arc<EngineStats>,
        reclaim: ReclaimFn,
    ) -> ResampleResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_threads)
            .thread_name(|index| format!("sprite-resample-{}", index))
            .build()
            .map_err(|e| {
                ResampleError::config("async_scaling.worker_threads", worker_threads.to_string(), e.to_string())
            })?;
        let (sender, receiver) = crossbeam_channel::unbounded();
        log::info!("sprite scheduler started with {} workers", pool.current_num_threads());
        Ok(Self {
            in_flight: Mutex::new(HashMap::new()),
            context: Arc::new(WorkerContext {
                queue: TaskQueue::default(),
                timers,
                stats,
                reclaim,
                completions: sender,
            }),
            receiver,
            workers: pool.current_num_threads(),
            pool,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn timers(&self) -> &TexelTimers {
        &self.context.timers
    }

    /// Claim `(key, revision)` or attach to the task that already holds it.
    pub fn claim(&self, key: SpriteKey, revision: u64, frame: u64) -> Claim {
        let mut in_flight = self.in_flight.lock();
        if let Some(task) = in_flight.get(&(key, revision)) {
            task.touch(frame);
            if task.priority() == Priority::Downgraded {
                self.context.queue.restore(task);
            }
            return Claim::Attached(task.clone());
        }
        let task = Arc::new(Task::new(key, revision, frame));
        in_flight.insert((key, revision), task.clone());
        Claim::New(task)
    }

    /// Give up a claim without dispatching.
    pub fn release(&self, task: &Arc<Task>) {
        let mut in_flight = self.in_flight.lock();
        if in_flight.get(&task.binding()).is_some_and(|t| Arc::ptr_eq(t, task)) {
            in_flight.remove(&task.binding());
        }
    }

    /// Alias of [`TaskScheduler::release`] once a completion has been handled.
    pub fn finish(&self, task: &Arc<Task>) {
        self.release(task);
    }

    pub fn is_in_flight(&self, key: &SpriteKey, revision: u64) -> bool {
        self.in_flight.lock().contains_key(&(*key, revision))
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn queued(&self) -> (usize, usize) {
        self.context.queue.lengths()
    }

    /// Pick a mode for `texels` of work; `None` declines the work for this frame.
    ///
    /// `cached` says the result will be loaded from the persistent cache,
    /// which is estimated from its own timing samples.
    pub fn choose_mode(
        &self,
        config: &EngineConfig,
        texels: u64,
        named: bool,
        cached: bool,
        remaining: Duration,
    ) -> Option<Mode> {
        let async_scaling = &config.async_scaling;
        if async_scaling.enabled
            && (named || async_scaling.enabled_for_unknown)
            && texels >= async_scaling.minimum_size_texels
        {
            return Some(Mode::Async);
        }
        if config.frame_budget.enabled {
            let estimate = self.context.timers.estimate(cached, false, texels);
            if !estimate.is_zero() && estimate > remaining {
                log::trace!("declining {} texels: estimate {:?} > remaining {:?}", texels, estimate, remaining);
                return None;
            }
        }
        Some(Mode::Sync)
    }

    /// Run a task on the calling thread.
    pub fn run_sync(&self, task: Arc<Task>) -> Completion {
        EngineStats::bump(&self.context.stats.dispatches_sync);
        self.context.execute(task, Mode::Sync)
    }

    /// Queue a task for the worker pool.
    pub fn spawn(&self, task: Arc<Task>) {
        EngineStats::bump(&self.context.stats.dispatches_async);
        self.context.queue.push(task);
        let context = self.context.clone();
        self.pool.spawn(move || {
            let Some(task) = context.queue.pop() else {
                return;
            };
            let completion = context.execute(task, Mode::Async);
            if context.completions.send(completion).is_err() {
                log::debug!("engine dropped before completion was delivered");
            }
        });
    }

    /// Hand a completion produced outside the pool to the render thread.
    pub fn deliver(&self, completion: Completion) {
        if self.context.completions.send(completion).is_err() {
            log::debug!("completion channel closed");
        }
    }

    pub fn try_recv(&self) -> Option<Completion> {
        self.receiver.try_recv().ok()
    }

    /// Block until a completion arrives or `timeout` passes.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Completion> {
        self.receiver.recv_timeout(timeout).ok()
    }

    pub fn begin_frame(&self, frame: u64, downgrade_after_frames: u64) {
        let moved = self.context.queue.downgrade_idle(frame, downgrade_after_frames);
        if moved > 0 {
            log::debug!("downgraded {} idle resample tasks", moved);
        }
    }
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("workers", &self.workers)
            .field("in_flight", &self.in_flight())
            .field("queued", &self.queued())
            .finish()
    }
}
