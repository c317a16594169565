//! Content-addressed storage that outlives the process.
//!
//! Entries are opaque blobs produced by [`crate::cache::codec`]. Failures
//! never reach the caller: a failed load is a miss and a failed store is
//! logged and dropped.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use memmap2::Mmap;
use parking_lot::Mutex;
use tempfile::NamedTempFile;

use crate::core::hash::ContentHash;
use crate::error::{ResampleError, ResampleResult};

/// Bytes of a loaded entry: the mapped file itself, or an owned copy.
#[derive(Debug)]
pub enum EntryBytes {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for EntryBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            EntryBytes::Mapped(map) => map,
            EntryBytes::Owned(bytes) => bytes,
        }
    }
}

pub trait PersistentCache: Send + Sync {
    fn load(&self, hash: ContentHash) -> Option<EntryBytes>;

    /// Whether an entry exists, without reading it.
    fn contains(&self, hash: ContentHash) -> bool;

    fn store(&self, hash: ContentHash, bytes: &[u8]);

    /// Drop an entry, e.g. one that failed to decode.
    fn remove(&self, hash: ContentHash);
}

/// One file per entry, `<hash>.spr`, under a single directory.
#[derive(Debug)]
pub struct DiskCache {
    directory: PathBuf,
}

impl DiskCache {
    pub const EXTENSION: &'static str = "spr";

    /// Open (creating if needed) a cache rooted at `directory`.
    pub fn open(directory: impl Into<PathBuf>) -> ResampleResult<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|e| ResampleError::io_at("create cache directory", &directory, e))?;
        log::info!("persistent sprite cache at {}", directory.display());
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_for(&self, hash: ContentHash) -> PathBuf {
        self.directory.join(format!("{}.{}", hash, Self::EXTENSION))
    }

    fn read(&self, path: &Path) -> std::io::Result<Option<Mmap>> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(None);
        }
        // SAFETY: entries are only ever replaced by rename, never written in place.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Some(map))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut temp = NamedTempFile::new_in(&self.directory)?;
        temp.write_all(bytes)?;
        temp.as_file().sync_data()?;
        temp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl PersistentCache for DiskCache {
    fn load(&self, hash: ContentHash) -> Option<EntryBytes> {
        let path = self.path_for(hash);
        match self.read(&path) {
            Ok(map) => map.map(EntryBytes::Mapped),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                log::warn!("failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    fn contains(&self, hash: ContentHash) -> bool {
        self.path_for(hash).is_file()
    }

    fn store(&self, hash: ContentHash, bytes: &[u8]) {
        let path = self.path_for(hash);
        if let Err(e) = self.write(&path, bytes) {
            log::warn!("failed to write {}: {}", path.display(), e);
        }
    }

    fn remove(&self, hash: ContentHash) {
        let path = self.path_for(hash);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("failed to remove {}: {}", path.display(), e);
            }
        }
    }
}

/// In-process stand-in, used when no directory is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<ContentHash, Vec<u8>>>,
    loads: AtomicU64,
    stores: AtomicU64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn stores(&self) -> u64 {
        self.stores.load(Ordering::Relaxed)
    }

    /// Overwrite an entry's raw bytes.
    pub fn corrupt(&self, hash: ContentHash, bytes: Vec<u8>) {
        self.entries.lock().insert(hash, bytes);
    }
}

impl PersistentCache for MemoryCache {
    fn load(&self, hash: ContentHash) -> Option<EntryBytes> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().get(&hash).cloned().map(EntryBytes::Owned)
    }

    fn contains(&self, hash: ContentHash) -> bool {
        self.entries.lock().contains_key(&hash)
    }

    fn store(&self, hash: ContentHash, bytes: &[u8]) {
        self.stores.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().insert(hash, bytes.to_vec());
    }

    fn remove(&self, hash: ContentHash) {
        self.entries.lock().remove(&hash);
    }
}
