//! Reusable byte buffers with a memory ceiling.
//!
//! [`BufferPool::allocate`] hands out a [`PooledBuffer`]; dropping the guard
//! gives the buffer and its share of the ceiling back. The accounting is
//! released exactly once no matter which thread drops the guard.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::BUFFER_POOL_KEEP;
use crate::error::{Lzma2Error, Result};

struct PoolState {
    /// Bytes accounted to buffers currently handed out.
    in_use: usize,
    idle: Vec<Vec<u8>>,
}

struct PoolInner {
    limit: usize,
    state: Mutex<PoolState>,
}

impl PoolInner {
    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared pool handle; clones refer to the same pool.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.inner.lock();
        f.debug_struct("BufferPool")
            .field("limit", &self.inner.limit)
            .field("in_use", &s.in_use)
            .field("idle", &s.idle.len())
            .finish()
    }
}

impl BufferPool {
    /// Pool that never accounts more than `limit` bytes to live buffers.
    pub fn new(limit: usize) -> Self {
        BufferPool {
            inner: Arc::new(PoolInner {
                limit,
                state: Mutex::new(PoolState {
                    in_use: 0,
                    idle: Vec::new(),
                }),
            }),
        }
    }

    pub fn limit(&self) -> usize {
        self.inner.limit
    }

    /// Bytes accounted to buffers currently handed out.
    pub fn in_use(&self) -> usize {
        self.inner.lock().in_use
    }

    /// Bytes that can still be handed out.
    pub fn available(&self) -> usize {
        self.inner.limit.saturating_sub(self.in_use())
    }

    /// An empty buffer with room for at least `size_hint` bytes.
    pub fn allocate(&self, size_hint: usize) -> Result<PooledBuffer> {
        let mut s = self.inner.lock();
        let available = self.inner.limit.saturating_sub(s.in_use);
        if size_hint > available {
            return Err(Lzma2Error::ResourceExhausted {
                requested: size_hint,
                available,
            });
        }
        s.in_use += size_hint;
        // Prefer the smallest idle buffer that is large enough.
        let pick = s
            .idle
            .iter()
            .enumerate()
            .filter(|(_, b)| b.capacity() >= size_hint)
            .min_by_key(|(_, b)| b.capacity())
            .map(|(i, _)| i);
        let mut buf = match pick {
            Some(i) => s.idle.swap_remove(i),
            None => Vec::new(),
        };
        drop(s);
        buf.clear();
        buf.reserve(size_hint);
        Ok(PooledBuffer {
            buf,
            accounted: size_hint,
            pool: Arc::clone(&self.inner),
        })
    }
}

/// Buffer on loan from a [`BufferPool`].
pub struct PooledBuffer {
    buf: Vec<u8>,
    accounted: usize,
    pool: Arc<PoolInner>,
}

impl PooledBuffer {
    /// Bytes this buffer counts against the pool ceiling.
    pub fn accounted(&self) -> usize {
        self.accounted
    }
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.buf.len())
            .field("accounted", &self.accounted)
            .finish()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        let mut s = self.pool.lock();
        s.in_use -= self.accounted;
        if s.idle.len() < BUFFER_POOL_KEEP && buf.capacity() > 0 {
            s.idle.push(buf);
        }
    }
}
