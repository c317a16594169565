//! # Resampled Sprite
//!
//! One cache entry and its lifecycle:
//!
//! ```text
//!            ┌────────── invalidate ─────────┐
//!            │                               ▼
//!  Pending ──┴─ make_ready ─▶ Ready ◀──▶ Invalidated
//!                             │  ▲   revalidate
//!                     suspend │  │ resurrect
//!                             ▼  │
//!                           Suspended
//!
//!  any state ── dispose ──▶ Disposed (terminal)
//! ```
//!
//! State is swapped whole under a lock; readers clone the current
//! [`SpriteState`] (a few `Arc` bumps) and never observe a half-applied
//! transition. Dropping the last `Arc<SpriteImage>` releases the texture
//! through the render release queue, so disposal is idempotent and the
//! texture is destroyed exactly once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use sprite_scale::presets::ScalerKind;

use crate::cache::key::SpriteKey;
use crate::core::hash::ContentHash;
use crate::error::{ResampleError, ResampleResult};
use crate::processing::PipelineFingerprint;
use crate::render::SpriteImage;

static NEXT_SPRITE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Debug)]
pub enum SpriteState {
    Pending,
    Ready(Arc<SpriteImage>),
    /// Source changed; the old image, if any, is still served while a new one is computed.
    Invalidated(Option<Arc<SpriteImage>>),
    Suspended(Arc<SpriteImage>),
    Disposed,
}

impl SpriteState {
    pub fn name(&self) -> &'static str {
        match self {
            SpriteState::Pending => "pending",
            SpriteState::Ready(_) => "ready",
            SpriteState::Invalidated(_) => "invalidated",
            SpriteState::Suspended(_) => "suspended",
            SpriteState::Disposed => "disposed",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SpriteState::Ready(_))
    }

    pub fn image(&self) -> Option<&Arc<SpriteImage>> {
        match self {
            SpriteState::Ready(image) | SpriteState::Suspended(image) => Some(image),
            SpriteState::Invalidated(image) => image.as_ref(),
            SpriteState::Pending | SpriteState::Disposed => None,
        }
    }
}

#[derive(Debug)]
pub struct ResampledSprite {
    id: u64,
    /// Cleared while suspended.
    key: Mutex<Option<SpriteKey>>,
    content_hash: ContentHash,
    source_revision: AtomicU64,
    fingerprint: PipelineFingerprint,
    state: RwLock<SpriteState>,
    previous: Mutex<Option<Weak<ResampledSprite>>>,
    last_referenced_frame: AtomicU64,
}

impl ResampledSprite {
    pub fn pending(
        key: SpriteKey,
        content_hash: ContentHash,
        source_revision: u64,
        fingerprint: PipelineFingerprint,
        previous: Option<&Arc<ResampledSprite>>,
        frame: u64,
    ) -> Self {
        Self {
            id: NEXT_SPRITE_ID.fetch_add(1, Ordering::Relaxed),
            key: Mutex::new(Some(key)),
            content_hash,
            source_revision: AtomicU64::new(source_revision),
            fingerprint,
            state: RwLock::new(SpriteState::Pending),
            previous: Mutex::new(previous.map(Arc::downgrade)),
            last_referenced_frame: AtomicU64::new(frame),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> Option<SpriteKey> {
        *self.key.lock()
    }

    pub fn content_hash(&self) -> ContentHash {
        self.content_hash
    }

    pub fn source_revision(&self) -> u64 {
        self.source_revision.load(Ordering::Acquire)
    }

    pub fn scaler(&self) -> ScalerKind {
        self.fingerprint.scaler
    }

    /// Scaler and settings the image was (or will be) produced with.
    pub fn fingerprint(&self) -> PipelineFingerprint {
        self.fingerprint
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> SpriteState {
        self.state.read().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.state.read().is_ready()
    }

    pub fn is_disposed(&self) -> bool {
        matches!(*self.state.read(), SpriteState::Disposed)
    }

    /// The image to draw: the ready one, or a stale one while invalidated.
    pub fn image(&self) -> Option<Arc<SpriteImage>> {
        match &*self.state.read() {
            SpriteState::Ready(image) => Some(image.clone()),
            SpriteState::Invalidated(image) => image.clone(),
            _ => None,
        }
    }

    /// Texture bytes held by this entry.
    pub fn byte_size(&self) -> usize {
        self.state.read().image().map_or(0, |image| image.byte_size())
    }

    pub fn last_referenced_frame(&self) -> u64 {
        self.last_referenced_frame.load(Ordering::Acquire)
    }

    pub fn touch(&self, frame: u64) {
        self.last_referenced_frame.fetch_max(frame, Ordering::AcqRel);
    }

    /// The entry this one replaces, if it is still alive and not disposed.
    pub fn previous(&self) -> Option<Arc<ResampledSprite>> {
        let previous = self.previous.lock().as_ref()?.upgrade()?;
        if previous.is_disposed() {
            None
        } else {
            Some(previous)
        }
    }

    /// Image to serve while this entry is not ready yet.
    pub fn stale_image(&self) -> Option<Arc<SpriteImage>> {
        self.image().or_else(|| self.previous().and_then(|p| p.image()))
    }

    fn transition<F>(&self, attempted: &str, f: F) -> ResampleResult<()>
    where
        F: FnOnce(&SpriteState) -> Option<SpriteState>,
    {
        let mut state = self.state.write();
        match f(&state) {
            Some(next) => {
                log::trace!("sprite {} {} -> {}", self.id, state.name(), next.name());
                *state = next;
                Ok(())
            }
            None => Err(ResampleError::state(state.name(), attempted)),
        }
    }

    /// Pending -> Ready. Drops the link to the previous entry.
    pub fn make_ready(&self, image: SpriteImage) -> ResampleResult<()> {
        let image = Arc::new(image);
        self.transition("make_ready", |state| match state {
            SpriteState::Pending => Some(SpriteState::Ready(image.clone())),
            _ => None,
        })?;
        *self.previous.lock() = None;
        Ok(())
    }

    /// Ready/Pending -> Invalidated, keeping any image for stale-serve.
    pub fn invalidate(&self) -> bool {
        self.transition("invalidate", |state| match state {
            SpriteState::Ready(image) => Some(SpriteState::Invalidated(Some(image.clone()))),
            SpriteState::Pending => Some(SpriteState::Invalidated(None)),
            _ => None,
        })
        .is_ok()
    }

    /// Invalidated -> Ready at `source_revision`, for a change that left the content hash intact.
    ///
    /// Fails when there is no image to keep.
    pub fn revalidate(&self, source_revision: u64, frame: u64) -> ResampleResult<()> {
        self.transition("revalidate", |state| match state {
            SpriteState::Invalidated(Some(image)) => Some(SpriteState::Ready(image.clone())),
            _ => None,
        })?;
        self.source_revision.store(source_revision, Ordering::Release);
        self.touch(frame);
        Ok(())
    }

    /// Carry a ready entry over to a newer source revision whose change did not touch it.
    pub fn rebind_revision(&self, source_revision: u64) {
        let state = self.state.read();
        if state.is_ready() {
            self.source_revision.fetch_max(source_revision, Ordering::AcqRel);
        }
    }

    /// Ready -> Suspended. Clears the source back-reference.
    pub fn suspend(&self, frame: u64) -> ResampleResult<()> {
        self.transition("suspend", |state| match state {
            SpriteState::Ready(image) => Some(SpriteState::Suspended(image.clone())),
            _ => None,
        })?;
        *self.key.lock() = None;
        *self.previous.lock() = None;
        self.touch(frame);
        Ok(())
    }

    /// Suspended -> Ready under a new key. Fails if the entry was disposed meanwhile.
    pub fn resurrect(&self, key: SpriteKey, source_revision: u64, frame: u64) -> ResampleResult<()> {
        self.transition("resurrect", |state| match state {
            SpriteState::Suspended(image) => Some(SpriteState::Ready(image.clone())),
            _ => None,
        })?;
        *self.key.lock() = Some(key);
        self.source_revision.store(source_revision, Ordering::Release);
        self.touch(frame);
        Ok(())
    }

    /// Any state -> Disposed. Returns false when already disposed.
    pub fn dispose(&self) -> bool {
        let mut state = self.state.write();
        if matches!(*state, SpriteState::Disposed) {
            return false;
        }
        log::trace!("sprite {} {} -> disposed", self.id, state.name());
        // The image (and its texture) is released when the last Arc drops.
        *state = SpriteState::Disposed;
        drop(state);
        *self.previous.lock() = None;
        true
    }
}
