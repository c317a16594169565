//! One unit of resample work and what comes back from it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::cache::key::SpriteKey;
use crate::cache::sprite::ResampledSprite;
use crate::error::ResampleResult;
use crate::processing::ResampledPixels;

/// Work closure. The worker calls it again while the failure's retry budget lasts.
pub type ComputeFn = Box<dyn Fn() -> ResampleResult<Computed> + Send + 'static>;

/// Output of a compute closure.
#[derive(Debug)]
pub struct Computed {
    pub pixels: ResampledPixels,
    pub origin: Origin,
}

impl Computed {
    pub fn resampled(pixels: ResampledPixels) -> Self {
        Self {
            pixels,
            origin: Origin::Compute,
        }
    }

    pub fn loaded(pixels: ResampledPixels) -> Self {
        Self {
            pixels,
            origin: Origin::Persistent,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    Sync,
    Async,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Priority {
    Normal = 0,
    Downgraded = 1,
}

/// Where the pixels of a completion came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    Compute,
    Persistent,
}

pub struct Task {
    key: SpriteKey,
    revision: u64,
    texels: u64,
    requested_frame: AtomicU64,
    priority: AtomicU8,
    requests: AtomicUsize,
    entry: Mutex<Option<Arc<ResampledSprite>>>,
    compute: Mutex<Option<ComputeFn>>,
}

impl Task {
    pub(crate) fn new(key: SpriteKey, revision: u64, frame: u64) -> Self {
        Self {
            key,
            revision,
            texels: key.bounds.area(),
            requested_frame: AtomicU64::new(frame),
            priority: AtomicU8::new(Priority::Normal as u8),
            requests: AtomicUsize::new(1),
            entry: Mutex::new(None),
            compute: Mutex::new(None),
        }
    }

    pub fn key(&self) -> SpriteKey {
        self.key
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn binding(&self) -> (SpriteKey, u64) {
        (self.key, self.revision)
    }

    /// Source texels the task covers; the unit of the timing estimates.
    pub fn texels(&self) -> u64 {
        self.texels
    }

    pub fn requested_frame(&self) -> u64 {
        self.requested_frame.load(Ordering::Acquire)
    }

    /// Number of draw requests folded into this task.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Acquire)
    }

    pub fn priority(&self) -> Priority {
        match self.priority.load(Ordering::Acquire) {
            0 => Priority::Normal,
            _ => Priority::Downgraded,
        }
    }

    pub(crate) fn set_priority(&self, priority: Priority) {
        self.priority.store(priority as u8, Ordering::Release);
    }

    pub(crate) fn touch(&self, frame: u64) {
        self.requested_frame.fetch_max(frame, Ordering::AcqRel);
        self.requests.fetch_add(1, Ordering::AcqRel);
    }

    /// The pending entry this task will make ready.
    pub fn entry(&self) -> Option<Arc<ResampledSprite>> {
        self.entry.lock().clone()
    }

    pub fn set_entry(&self, entry: Arc<ResampledSprite>) {
        *self.entry.lock() = Some(entry);
    }

    pub fn set_compute(&self, compute: ComputeFn) {
        *self.compute.lock() = Some(compute);
    }

    pub(crate) fn take_compute(&self) -> Option<ComputeFn> {
        self.compute.lock().take()
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("key", &self.key)
            .field("revision", &self.revision)
            .field("priority", &self.priority())
            .field("requests", &self.requests())
            .finish()
    }
}

/// A finished task, delivered to the render thread for installation.
#[derive(Debug)]
pub struct Completion {
    pub task: Arc<Task>,
    pub result: ResampleResult<ResampledPixels>,
    pub elapsed: Duration,
    pub mode: Mode,
    pub origin: Origin,
}

/// Result of claiming a `(key, revision)` binding.
#[derive(Debug)]
pub enum Claim {
    /// The caller owns the new task and must dispatch or release it.
    New(Arc<Task>),
    /// Another request already owns it.
    Attached(Arc<Task>),
}
