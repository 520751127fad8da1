//! Parallel block manager.
//!
//! A [`ParallelManager`] is built lazily from [`StreamOptions`] that carry a
//! [`ParallelConfig`]. It owns the task pool and the buffer pool shared by
//! every parallel stream created from those options. Each stream opens its
//! own [`Session`], which bounds how many of its workers run at once and
//! hands out task ids.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::config::{KB, TASK_QUEUE_PER_THREAD};
use crate::error::{Lzma2Error, Result};
use crate::frame::writer::ChunkEncoder;
use crate::io::buffer_pool::{BufferPool, PooledBuffer};
use crate::options::{DictMode, ParallelConfig, StreamOptions};
use crate::threadpool::{JobFn, TPool};

// ─────────────────────────────────────────────────────────────────────────────
// ParallelManager
// ─────────────────────────────────────────────────────────────────────────────

pub struct ParallelManager {
    config: ParallelConfig,
    block_size: usize,
    encoder_memory_kib: usize,
    pool: TPool,
    buffers: BufferPool,
}

impl std::fmt::Debug for ParallelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelManager")
            .field("config", &self.config)
            .field("block_size", &self.block_size)
            .field("buffers", &self.buffers)
            .finish()
    }
}

impl ParallelManager {
    /// Manager for `options`, which must carry a parallel configuration.
    pub fn new(options: &StreamOptions) -> Result<Self> {
        let config = options
            .parallel()
            .cloned()
            .ok_or_else(|| Lzma2Error::config("options have no parallel configuration"))?;
        let affinity = config.affinity();
        let pool = TPool::new(affinity, TASK_QUEUE_PER_THREAD * affinity)?;
        let block_size = config.block_size_for(options.dict_size());
        crate::displaylevel!(
            3,
            "lzma2: parallel manager: {} workers, block size {} KiB, dict mode {:?}\n",
            affinity,
            block_size / KB,
            config.dict_mode()
        );
        Ok(ParallelManager {
            buffers: BufferPool::new(config.buffer_pool_limit()),
            config,
            block_size,
            encoder_memory_kib: ChunkEncoder::memory_usage(options),
            pool,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn dict_mode(&self) -> DictMode {
        self.config.dict_mode()
    }

    pub fn affinity(&self) -> usize {
        self.config.affinity()
    }

    pub fn buffers(&self) -> &BufferPool {
        &self.buffers
    }

    /// Memory in KiB a fully busy session adds on top of a single-stream
    /// encoder: per worker, its encoder plus one input and one output block.
    pub fn extra_memory_usage(&self) -> usize {
        let worker = self.encoder_memory_kib;
        let session = 2 * self.block_size / KB;
        self.affinity() * (worker + session)
    }

    pub(crate) fn submit(&self, job: JobFn) -> Result<()> {
        self.pool.submit_job(job)
    }

    /// Output buffer for a block of `block_len` bytes: room for the worst
    /// case where every chunk is stored raw.
    pub(crate) fn allocate_output(&self, block_len: usize) -> Result<PooledBuffer> {
        self.buffers.allocate(block_len + block_len / 1024 * 4 + 64)
    }
}

/// Length of the preset handed to a block starting `offset` bytes into the
/// stream when the dictionary carries over.
///
/// `user_len` is the caller's preset dictionary length. The decoder sees one
/// continuous history of `min(user_len, dict) + offset` bytes; the preset is
/// that history capped to `dict_size`, cut so its length stays congruent
/// modulo 16 to the decoder's position. Literal and position contexts then
/// agree on both sides.
pub fn preset_len(dict_size: usize, user_len: usize, offset: u64) -> usize {
    let history = (user_len.min(dict_size) as u64).saturating_add(offset);
    if history <= dict_size as u64 {
        history as usize
    } else {
        dict_size - ((dict_size as u64).wrapping_sub(history) & 15) as usize
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

struct SessionState<T> {
    idle: Vec<T>,
    busy: usize,
    next_task: u64,
    closed: bool,
}

/// Per-stream worker accounting shared by a frontend and its jobs.
///
/// At most `affinity` workers are busy at once. Worker state (`T`) is created
/// lazily by the caller when [`acquire`](Self::acquire) returns `None`, and
/// parked in the idle list by [`release`](Self::release).
pub struct Session<T> {
    state: Mutex<SessionState<T>>,
    cond: Condvar,
    affinity: usize,
}

impl<T> Session<T> {
    pub fn new(affinity: usize) -> Arc<Self> {
        Arc::new(Session {
            state: Mutex::new(SessionState {
                idle: Vec::new(),
                busy: 0,
                next_task: 0,
                closed: false,
            }),
            cond: Condvar::new(),
            affinity,
        })
    }

    fn lock(&self) -> MutexGuard<'_, SessionState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn affinity(&self) -> usize {
        self.affinity
    }

    /// Take a worker slot, blocking while all are busy. Returns a parked
    /// worker if one exists.
    pub fn acquire(&self) -> Result<Option<T>> {
        let mut s = self.lock();
        loop {
            if s.closed {
                return Err(Lzma2Error::CancelledOrClosed);
            }
            if s.busy < self.affinity {
                s.busy += 1;
                return Ok(s.idle.pop());
            }
            s = self.cond.wait(s).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Non-blocking [`acquire`](Self::acquire): `Ok(None)` when no slot is
    /// free.
    pub fn try_acquire(&self) -> Result<Option<Option<T>>> {
        let mut s = self.lock();
        if s.closed {
            return Err(Lzma2Error::CancelledOrClosed);
        }
        if s.busy < self.affinity {
            s.busy += 1;
            return Ok(Some(s.idle.pop()));
        }
        Ok(None)
    }

    pub fn has_free_slot(&self) -> bool {
        let s = self.lock();
        !s.closed && s.busy < self.affinity
    }

    /// Give a slot back; `worker` is parked for reuse, `None` drops it.
    pub fn release(&self, worker: Option<T>) {
        let mut s = self.lock();
        s.busy -= 1;
        if let Some(w) = worker {
            if !s.closed {
                s.idle.push(w);
            }
        }
        self.cond.notify_all();
    }

    pub fn next_task_id(&self) -> u64 {
        let mut s = self.lock();
        let id = s.next_task;
        s.next_task += 1;
        id
    }

    /// Refuse further dispatches and wake every blocked `acquire`. Parked
    /// workers are dropped.
    pub fn close(&self) {
        let mut s = self.lock();
        if !s.closed {
            s.closed = true;
            s.idle.clear();
            crate::displaylevel!(4, "lzma2: session closed after {} tasks\n", s.next_task);
        }
        self.cond.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CloseHandle
// ─────────────────────────────────────────────────────────────────────────────

/// Something a [`CloseHandle`] can shut down.
pub(crate) trait Closable: Send + Sync {
    fn close(&self);
    fn is_closed(&self) -> bool;
}

/// Cloneable handle that closes a parallel stream from any thread.
///
/// Closing stops new dispatches and wakes blocked calls, which then fail with
/// [`Lzma2Error::CancelledOrClosed`].
#[derive(Clone)]
pub struct CloseHandle {
    target: Arc<dyn Closable>,
}

impl CloseHandle {
    pub(crate) fn new(target: Arc<dyn Closable>) -> Self {
        CloseHandle { target }
    }

    pub fn close(&self) {
        self.target.close();
    }

    pub fn is_closed(&self) -> bool {
        self.target.is_closed()
    }
}

impl std::fmt::Debug for CloseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloseHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Describe a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Error standing for a worker that panicked.
pub(crate) fn panic_error(payload: &(dyn std::any::Any + Send)) -> Lzma2Error {
    Lzma2Error::Io(Arc::new(std::io::Error::other(format!(
        "worker panicked: {}",
        panic_message(payload)
    ))))
}
