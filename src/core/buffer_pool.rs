//! # Buffer Pool Module
//!
//! Reusable scratch buffers for the resample pipeline. Every compute copies a
//! sprite region out of its source and usually pads it; those intermediate
//! buffers come from here instead of the allocator.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │   Worker        │───▶│  Buffer Pool    │───▶│   Scaler        │
//! │   Thread        │    │                 │    │   input         │
//! └─────────────────┘    │  ┌─────────────┐│    └─────────────────┘
//!                        │  │ Buffer 1    ││
//!                        │  │ Buffer 2    ││    Reused buffers
//!                        │  │ Buffer N    ││    prevent allocations
//!                        │  └─────────────┘│
//!                        └─────────────────┘
//! ```
//!
//! Unlike a fixed-frame pool, sprite regions vary in size, so buffers are
//! handed out by capacity: the smallest pooled buffer large enough wins.
//! Buffers above `max_buffer_bytes` are never pooled, so one huge sprite
//! cannot pin its scratch memory for the rest of the session.
//!
//! ## Out-of-memory
//!
//! Allocation goes through `try_reserve_exact`, so a failed allocation comes
//! back as `None` and the caller can reclaim memory (including [`BufferPool::clear`])
//! before retrying.
//!
//! ## Example
//!
//! ```rust
//! use sprite_resampler::core::buffer_pool::BufferPool;
//!
//! let pool = BufferPool::new(4);
//! let buffer = pool.get_buffer(16 * 16 * 4).unwrap();
//! assert_eq!(buffer.len(), 1024);
//! pool.return_buffer(buffer);
//! assert_eq!(pool.stats(), (1, 4));
//! ```

use std::collections::VecDeque;

use parking_lot::Mutex;

#[derive(Debug)]
pub struct BufferPool {
    buffers: Mutex<VecDeque<Vec<u8>>>,
    /// Maximum number of buffers to keep in the pool
    max_buffers: usize,
    /// Largest capacity a pooled buffer may have
    max_buffer_bytes: usize,
}

impl BufferPool {
    pub fn new(max_buffers: usize) -> Self {
        Self::with_limit(max_buffers, usize::MAX)
    }

    /// Pool that drops returned buffers whose capacity exceeds `max_buffer_bytes`.
    pub fn with_limit(max_buffers: usize, max_buffer_bytes: usize) -> Self {
        Self {
            buffers: Mutex::new(VecDeque::with_capacity(max_buffers)),
            max_buffers,
            max_buffer_bytes,
        }
    }

    /// Retrieves a zeroed buffer of exactly `len` bytes.
    ///
    /// Reuses the smallest pooled buffer with enough capacity when one
    /// exists, otherwise allocates. Returns `None` when the allocation fails.
    pub fn get_buffer(&self, len: usize) -> Option<Vec<u8>> {
        let reused = {
            let mut buffers = self.buffers.lock();
            buffers
                .iter()
                .enumerate()
                .filter(|(_, b)| b.capacity() >= len)
                .min_by_key(|(_, b)| b.capacity())
                .map(|(i, _)| i)
                .and_then(|i| buffers.remove(i))
        };

        let mut buffer = match reused {
            Some(buffer) => buffer,
            None => {
                let mut fresh = Vec::new();
                fresh.try_reserve_exact(len).ok()?;
                fresh
            }
        };
        buffer.clear();
        buffer.resize(len, 0);
        Some(buffer)
    }

    /// Returns a buffer to the pool for future reuse.
    ///
    /// If the pool is full, or the buffer is over the size limit, it is
    /// dropped and its memory freed.
    pub fn return_buffer(&self, mut buffer: Vec<u8>) {
        if buffer.capacity() > self.max_buffer_bytes {
            return;
        }
        buffer.clear();
        let mut buffers = self.buffers.lock();
        if buffers.len() < self.max_buffers {
            buffers.push_back(buffer);
        }
    }

    /// `(available_buffers, max_buffers)`
    pub fn stats(&self) -> (usize, usize) {
        let buffers = self.buffers.lock();
        (buffers.len(), self.max_buffers)
    }

    /// Bytes currently parked in the pool.
    pub fn pooled_bytes(&self) -> usize {
        self.buffers.lock().iter().map(Vec::capacity).sum()
    }

    /// Drops every pooled buffer and returns the bytes released.
    pub fn clear(&self) -> usize {
        let mut buffers = self.buffers.lock();
        let released = buffers.iter().map(Vec::capacity).sum();
        buffers.clear();
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_pool_basic() {
        let pool = BufferPool::new(3);

        let buf1 = pool.get_buffer(1024).unwrap();
        assert_eq!(buf1.len(), 1024);
        pool.return_buffer(buf1);

        let buf2 = pool.get_buffer(512).unwrap();
        assert_eq!(buf2.len(), 512);
        assert!(buf2.capacity() >= 1024);
        assert!(buf2.iter().all(|&b| b == 0));

        let (available, max) = pool.stats();
        assert_eq!(available, 0); // buf2 is checked out
        assert_eq!(max, 3);
    }

    #[test]
    fn test_buffer_pool_overflow() {
        let pool = BufferPool::new(2);

        let buf1 = pool.get_buffer(64).unwrap();
        let buf2 = pool.get_buffer(64).unwrap();
        let buf3 = pool.get_buffer(64).unwrap();

        pool.return_buffer(buf1);
        pool.return_buffer(buf2);
        pool.return_buffer(buf3);

        let (available, _) = pool.stats();
        assert_eq!(available, 2);
    }

    #[test]
    fn test_reused_buffer_is_zeroed() {
        let pool = BufferPool::new(1);
        let mut buf = pool.get_buffer(8).unwrap();
        buf.fill(0xAB);
        pool.return_buffer(buf);
        assert_eq!(pool.get_buffer(8).unwrap(), vec![0u8; 8]);
    }

    #[test]
    fn test_clear_releases_bytes() {
        let pool = BufferPool::new(4);
        pool.return_buffer(pool.get_buffer(100).unwrap());
        assert!(pool.pooled_bytes() >= 100);
        assert!(pool.clear() >= 100);
        assert_eq!(pool.stats().0, 0);
    }

    #[test]
    fn test_smallest_fitting_buffer_is_reused() {
        let pool = BufferPool::new(4);
        let large = pool.get_buffer(4096).unwrap();
        let small = pool.get_buffer(256).unwrap();
        pool.return_buffer(large);
        pool.return_buffer(small);

        let reused = pool.get_buffer(200).unwrap();
        assert!(reused.capacity() < 4096);
        assert_eq!(pool.stats().0, 1);
        assert!(pool.pooled_bytes() >= 4096);
    }

    #[test]
    fn test_oversized_buffers_are_not_pooled() {
        let pool = BufferPool::with_limit(4, 1024);
        pool.return_buffer(pool.get_buffer(512).unwrap());
        pool.return_buffer(pool.get_buffer(64 * 1024).unwrap());
        assert_eq!(pool.stats().0, 1);
        assert!(pool.pooled_bytes() <= 1024);
    }

    #[test]
    fn test_impossible_allocation_fails() {
        let pool = BufferPool::new(1);
        assert!(pool.get_buffer(usize::MAX).is_none());
    }
}
