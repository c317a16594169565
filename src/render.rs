//! # Render Resources
//!
//! The boundary to the host's renderer. Only the render thread may create or
//! destroy textures, but resampled sprites are dropped from whichever thread
//! lets go of the last reference. [`RenderResource`] bridges the two: its
//! `Drop` only enqueues the texture id on a channel, and the render thread
//! drains that channel in `SpriteEngine::end_frame` / `pump`.
//!
//! ```text
//!  any thread                          render thread
//!  ──────────                          ─────────────
//!  drop(RenderResource) ──release──▶  ReleaseQueue::drain ──▶ destroy_texture
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use sprite_scale::{Size, Wrapped};

use crate::core::geometry::Quad;
use crate::error::{ResampleError, ResampleResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    /// Debug label, e.g. the source name and bounds.
    pub label: String,
}

/// Host renderer. Called only from the render thread.
pub trait RenderDevice: Send + Sync {
    /// Create an RGBA8 texture initialised with `pixels`.
    fn create_texture(&self, desc: &TextureDesc, pixels: &[u8]) -> ResampleResult<TextureId>;

    fn destroy_texture(&self, id: TextureId);
}

/// Owned texture. Dropping it schedules destruction on the render thread.
#[derive(Debug)]
pub struct RenderResource {
    id: TextureId,
    bytes: usize,
    release: Sender<TextureId>,
}

impl RenderResource {
    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn byte_size(&self) -> usize {
        self.bytes
    }
}

impl Drop for RenderResource {
    fn drop(&mut self) {
        if self.release.send(self.id).is_err() {
            log::debug!("release queue closed, texture {:?} leaked to device teardown", self.id);
        }
    }
}

/// Channel of textures waiting to be destroyed.
#[derive(Debug)]
pub struct ReleaseQueue {
    tx: Sender<TextureId>,
    rx: Receiver<TextureId>,
}

impl ReleaseQueue {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    /// Create a texture and wrap it so that dropping it comes back through this queue.
    pub fn create(
        &self,
        device: &dyn RenderDevice,
        desc: &TextureDesc,
        pixels: &[u8],
    ) -> ResampleResult<RenderResource> {
        let id = device.create_texture(desc, pixels)?;
        Ok(RenderResource {
            id,
            bytes: pixels.len(),
            release: self.tx.clone(),
        })
    }

    /// Destroy every queued texture; returns how many were destroyed.
    pub fn drain(&self, device: &dyn RenderDevice) -> usize {
        let mut destroyed = 0;
        while let Ok(id) = self.rx.try_recv() {
            device.destroy_texture(id);
            destroyed += 1;
        }
        if destroyed > 0 {
            log::trace!("released {} textures", destroyed);
        }
        destroyed
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Default for ReleaseQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// A resampled sprite as the host draws it.
#[derive(Debug)]
pub struct SpriteImage {
    pub resource: RenderResource,
    /// Texture size including padding.
    pub size: Size,
    /// Region size times scale, without padding.
    pub unpadded_size: Size,
    /// Padding in texture texels.
    pub padding: Quad,
    pub scale_factor: (f32, f32),
    pub wrapped: Wrapped,
    pub scale: u32,
}

impl SpriteImage {
    pub fn texture(&self) -> TextureId {
        self.resource.id()
    }

    pub fn byte_size(&self) -> usize {
        self.resource.byte_size()
    }
}

/// In-memory device that keeps texture pixels, for tools and tests.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    next_id: AtomicU64,
    textures: Mutex<HashMap<TextureId, (TextureDesc, Vec<u8>)>>,
    created: AtomicUsize,
    destroyed: AtomicUsize,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pixels(&self, id: TextureId) -> Option<(TextureDesc, Vec<u8>)> {
        self.textures.lock().get(&id).cloned()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.lock().len()
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::Acquire)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::Acquire)
    }
}

impl RenderDevice for HeadlessDevice {
    fn create_texture(&self, desc: &TextureDesc, pixels: &[u8]) -> ResampleResult<TextureId> {
        let expected = desc.width as usize * desc.height as usize * 4;
        if pixels.len() != expected {
            return Err(ResampleError::render(
                "create_texture",
                format!("{} bytes for {}x{} texture", pixels.len(), desc.width, desc.height),
            ));
        }
        let id = TextureId(self.next_id.fetch_add(1, Ordering::AcqRel) + 1);
        self.textures.lock().insert(id, (desc.clone(), pixels.to_vec()));
        self.created.fetch_add(1, Ordering::AcqRel);
        Ok(id)
    }

    fn destroy_texture(&self, id: TextureId) {
        if self.textures.lock().remove(&id).is_some() {
            self.destroyed.fetch_add(1, Ordering::AcqRel);
        } else {
            log::warn!("destroy of unknown texture {:?}", id);
        }
    }
}
