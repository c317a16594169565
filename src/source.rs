//! # Source Images
//!
//! The host-side images sprites are cut from. The engine observes a source
//! through a generation-checked [`SourceHandle`]: once an image is unregistered
//! its handle can never resolve to a newer image that reuses the slot.
//!
//! ## Locking
//!
//! Pixel data sits behind a `parking_lot::RwLock`. Hashing and resampling take
//! shared access for as long as a copy takes; host writes take exclusive access.
//! The render thread never waits on a writer: it uses `try_read` and treats
//! failure as *Blocked*.
//!
//! Small per-image bookkeeping (memoised eligibility verdict, reasons already
//! reported, abandoned sprites) lives in a separate mutex so it never contends
//! with pixel access.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};

use crate::cache::key::SpriteClass;
use crate::core::geometry::Bounds;
use crate::eligibility::IneligibleReason;
use crate::error::{ResampleError, ResampleResult};

new_key_type! { pub struct SourceHandle; }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgba8,
    Bgra8,
    Dxt1,
    Dxt3,
    Dxt5,
    Rgba16F,
    R8,
}

impl PixelFormat {
    /// DXT3 is the host's font atlas format.
    pub fn is_font_format(self) -> bool {
        self == PixelFormat::Dxt3
    }
}

/// Everything the host tells us about an image when registering it.
///
/// `pixels` is always tightly packed RGBA8, whatever `format` the host stores
/// natively; block-compressed images arrive already decoded.
#[derive(Clone, Debug)]
pub struct SourceDesc {
    pub name: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub levels: u32,
    pub render_target: bool,
    pub pixels: Vec<u8>,
}

impl SourceDesc {
    pub fn rgba8(name: Option<&str>, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            name: name.map(str::to_string),
            width,
            height,
            format: PixelFormat::Rgba8,
            levels: 1,
            render_target: false,
            pixels,
        }
    }
}

/// Lowercase, forward-slash form used for pattern matching.
pub fn normalize_name(name: &str) -> String {
    name.replace('\\', "/").to_lowercase()
}

#[derive(Debug, Default)]
struct SourceMeta {
    /// (config generation, verdict)
    verdict: Option<(u64, Result<(), IneligibleReason>)>,
    reported: HashSet<IneligibleReason>,
    /// Sprites given up on, with the revision they were abandoned at.
    abandoned: HashMap<(Bounds, u32, SpriteClass), u64>,
}

#[derive(Debug)]
pub struct SourceImage {
    handle: SourceHandle,
    name: Option<String>,
    normalized_name: Option<String>,
    width: u32,
    height: u32,
    format: PixelFormat,
    levels: u32,
    render_target: bool,
    revision: AtomicU64,
    disposed: AtomicBool,
    pixels: RwLock<Vec<u8>>,
    meta: Mutex<SourceMeta>,
}

impl SourceImage {
    fn new(handle: SourceHandle, desc: SourceDesc) -> Self {
        let normalized_name = desc.name.as_deref().map(normalize_name);
        Self {
            handle,
            name: desc.name,
            normalized_name,
            width: desc.width,
            height: desc.height,
            format: desc.format,
            levels: desc.levels,
            render_target: desc.render_target,
            revision: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
            pixels: RwLock::new(desc.pixels),
            meta: Mutex::new(SourceMeta::default()),
        }
    }

    pub fn handle(&self) -> SourceHandle {
        self.handle
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn normalized_name(&self) -> Option<&str> {
        self.normalized_name.as_deref()
    }

    /// Name for log lines.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("<anonymous {:?}>", self.handle),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn levels(&self) -> u32 {
        self.levels
    }

    pub fn is_render_target(&self) -> bool {
        self.render_target
    }

    pub fn full_bounds(&self) -> Bounds {
        Bounds::full(self.width, self.height)
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Advance the revision; returns the new value.
    pub fn bump_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Returns false if the image was already disposed.
    pub(crate) fn mark_disposed(&self) -> bool {
        !self.disposed.swap(true, Ordering::AcqRel)
    }

    /// Non-blocking shared access; `None` while a writer holds the pixels.
    pub fn try_read_pixels(&self) -> Option<RwLockReadGuard<'_, Vec<u8>>> {
        self.pixels.try_read()
    }

    /// Blocking shared access, for worker threads.
    pub fn read_pixels(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.pixels.read()
    }

    /// Exclusive access to the pixels without bumping the revision.
    pub fn lock_for_write(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.pixels.write()
    }

    /// Copy the rows of `bounds` into `out`, which must be `bounds.area() * 4` bytes.
    pub fn copy_region(&self, bounds: Bounds, out: &mut [u8]) -> ResampleResult<()> {
        let pixels = self.read_pixels();
        copy_region_from(&pixels, self.width, bounds, out)
    }

    /// Overwrite `bounds` with `bytes` under the write lock and bump the revision.
    pub fn write_region(&self, bounds: Bounds, bytes: &[u8]) -> ResampleResult<u64> {
        if !bounds.fits_within(self.width, self.height) {
            return Err(ResampleError::config(
                "bounds",
                bounds.to_string(),
                format!("outside {}x{} image", self.width, self.height),
            ));
        }
        let row_bytes = bounds.width as usize * 4;
        if bytes.len() != row_bytes * bounds.height as usize {
            return Err(ResampleError::config(
                "bytes",
                bytes.len().to_string(),
                format!("expected {} bytes for {}", row_bytes * bounds.height as usize, bounds),
            ));
        }
        let mut pixels = self.lock_for_write();
        let stride = self.width as usize * 4;
        for (row, src) in bytes.chunks_exact(row_bytes).enumerate() {
            let start = (bounds.y as usize + row) * stride + bounds.x as usize * 4;
            pixels[start..start + row_bytes].copy_from_slice(src);
        }
        let revision = self.bump_revision();
        drop(pixels);
        Ok(revision)
    }

    pub(crate) fn cached_verdict(&self, generation: u64) -> Option<Result<(), IneligibleReason>> {
        let meta = self.meta.lock();
        match &meta.verdict {
            Some((g, verdict)) if *g == generation => Some(verdict.clone()),
            _ => None,
        }
    }

    pub(crate) fn store_verdict(&self, generation: u64, verdict: Result<(), IneligibleReason>) {
        self.meta.lock().verdict = Some((generation, verdict));
    }

    /// True the first time `reason` is seen for this image.
    pub(crate) fn first_report(&self, reason: &IneligibleReason) -> bool {
        self.meta.lock().reported.insert(reason.clone())
    }

    pub(crate) fn abandon(&self, bounds: Bounds, scale: u32, class: SpriteClass, revision: u64) {
        self.meta.lock().abandoned.insert((bounds, scale, class), revision);
    }

    pub(crate) fn is_abandoned(&self, bounds: Bounds, scale: u32, class: SpriteClass, revision: u64) -> bool {
        self.meta.lock().abandoned.get(&(bounds, scale, class)) == Some(&revision)
    }
}

/// Copy the rows of `bounds` out of an RGBA8 image `width` texels wide.
pub fn copy_region_from(pixels: &[u8], width: u32, bounds: Bounds, out: &mut [u8]) -> ResampleResult<()> {
    let row_bytes = bounds.width as usize * 4;
    let stride = width as usize * 4;
    let needed_src = (bounds.bottom() as usize).saturating_sub(1) * stride + bounds.right() as usize * 4;
    if out.len() != row_bytes * bounds.height as usize || (!bounds.is_degenerate() && pixels.len() < needed_src) {
        return Err(ResampleError::state("copy_region", format!("copy {} out of {} bytes", bounds, pixels.len())));
    }
    for (row, dst) in out.chunks_exact_mut(row_bytes.max(1)).enumerate().take(bounds.height as usize) {
        let start = (bounds.y as usize + row) * stride + bounds.x as usize * 4;
        dst.copy_from_slice(&pixels[start..start + row_bytes]);
    }
    Ok(())
}

/// Arena of live source images.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    images: RwLock<SlotMap<SourceHandle, Arc<SourceImage>>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, desc: SourceDesc) -> ResampleResult<SourceHandle> {
        let expected = desc.width as usize * desc.height as usize * 4;
        if desc.pixels.len() != expected {
            return Err(ResampleError::config(
                "pixels",
                desc.pixels.len().to_string(),
                format!("expected {} RGBA8 bytes for {}x{}", expected, desc.width, desc.height),
            ));
        }
        let mut images = self.images.write();
        let handle = images.insert_with_key(|handle| Arc::new(SourceImage::new(handle, desc)));
        Ok(handle)
    }

    pub fn get(&self, handle: SourceHandle) -> Option<Arc<SourceImage>> {
        self.images.read().get(handle).cloned()
    }

    pub fn remove(&self, handle: SourceHandle) -> Option<Arc<SourceImage>> {
        self.images.write().remove(handle)
    }

    pub fn len(&self) -> usize {
        self.images.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
