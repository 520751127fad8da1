//! Block-parallel decoder frontend.
//!
//! The frontend reads chunk headers from the input and splits the stream into
//! groups at every dictionary reset (`0x01` or control `>= 0xE0`). Each group
//! is independently decodable, so it gets its own worker: the frontend
//! streams the group's chunks to it over a channel, terminated by an end
//! marker, and the worker runs an [`Lzma2Reader`] over them.
//!
//! Decoded pieces are published under the group's task id. The group at the
//! done cursor is bounded by the output cap: its worker waits until `read`
//! drains it. Later groups buffer until the cursor reaches them.
//!
//! Pieces come from the manager's buffer pool. A worker that finds the pool
//! exhausted waits for `read` to free pieces instead of failing, and groups
//! behind the cursor always leave one piece of headroom so the cursor group
//! can make progress.

use std::collections::{BTreeMap, VecDeque};
use std::io::{self, Read};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::config::{DECODE_PIECE_SIZE, INPUT_READ_AHEAD_DEFAULT, OUTPUT_CAP_DEFAULT};
use crate::displaylevel;
use crate::error::{Lzma2Error, Result};
use crate::frame::chunk::{ChunkHeader, END_MARKER};
use crate::frame::reader::Lzma2Reader;
use crate::io::buffer_pool::{BufferPool, PooledBuffer};
use crate::io::manager::{panic_error, CloseHandle, Closable, ParallelManager, Session};
use crate::options::StreamOptions;

// ─────────────────────────────────────────────────────────────────────────────
// Shared state
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct GroupOutput {
    pieces: VecDeque<PooledBuffer>,
    /// Decoded bytes waiting in `pieces`.
    buffered: usize,
    done: bool,
}

struct DecodeState {
    groups: BTreeMap<u64, GroupOutput>,
    /// Task id of the group `read` is serving.
    cursor: u64,
    /// Compressed bytes sent to workers and not yet consumed by them.
    queued_input: usize,
    closed: bool,
    failure: Option<Lzma2Error>,
}

struct DecodeShared {
    state: Mutex<DecodeState>,
    cond: Condvar,
    output_cap: usize,
}

impl DecodeShared {
    fn lock(&self) -> MutexGuard<'_, DecodeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn input_consumed(&self, n: usize) {
        let mut st = self.lock();
        st.queued_input = st.queued_input.saturating_sub(n);
        self.cond.notify_all();
    }

    /// Wake workers waiting for pool memory after the reader freed a piece.
    fn piece_freed(&self) {
        let _st = self.lock();
        self.cond.notify_all();
    }

    /// A piece of `size` bytes for group `task_id`, waiting while the pool
    /// cannot spare it. Groups other than the one at the cursor only take
    /// memory while another piece stays available for the cursor group.
    fn allocate(&self, task_id: u64, buffers: &BufferPool, size: usize) -> Result<PooledBuffer> {
        let mut st = self.lock();
        loop {
            if st.closed {
                return Err(Lzma2Error::CancelledOrClosed);
            }
            let headroom = if st.cursor == task_id { 0 } else { size };
            if buffers.available() >= size.saturating_add(headroom) {
                match buffers.allocate(size) {
                    Ok(piece) => return Ok(piece),
                    // Another pool user got there first.
                    Err(Lzma2Error::ResourceExhausted { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
            st = self.cond.wait(st).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Hand a decoded piece of group `task_id` to the reader, waiting while
    /// that group is at the cursor and over the output cap.
    fn publish(&self, task_id: u64, piece: PooledBuffer) -> Result<()> {
        let mut st = self.lock();
        loop {
            if st.closed {
                return Err(Lzma2Error::CancelledOrClosed);
            }
            let at_cursor = st.cursor == task_id;
            let cap = self.output_cap;
            let Some(g) = st.groups.get_mut(&task_id) else {
                return Err(Lzma2Error::CancelledOrClosed);
            };
            if !at_cursor || g.buffered < cap {
                g.buffered += piece.len();
                g.pieces.push_back(piece);
                self.cond.notify_all();
                return Ok(());
            }
            st = self.cond.wait(st).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn finish_group(&self, task_id: u64, result: Result<()>) {
        let mut st = self.lock();
        match result {
            Ok(()) => {
                if let Some(g) = st.groups.get_mut(&task_id) {
                    g.done = true;
                }
            }
            Err(e) => {
                if !st.closed && st.failure.is_none() {
                    displaylevel!(1, "lzma2: decoding group {} failed: {}\n", task_id, e);
                    st.failure = Some(Lzma2Error::WorkerFailure {
                        task_id,
                        cause: Box::new(e),
                    });
                }
            }
        }
        self.cond.notify_all();
    }
}

struct ReaderCloser {
    shared: Arc<DecodeShared>,
    session: Arc<Session<()>>,
}

impl Closable for ReaderCloser {
    fn close(&self) {
        self.session.close();
        let mut st = self.shared.lock();
        st.closed = true;
        self.shared.cond.notify_all();
    }

    fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker
// ─────────────────────────────────────────────────────────────────────────────

/// `Read` over the chunk bytes the frontend sends to one group.
struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    cur: Vec<u8>,
    pos: usize,
    shared: Arc<DecodeShared>,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos == self.cur.len() {
            match self.rx.recv() {
                Ok(v) => {
                    self.shared.input_consumed(v.len());
                    self.cur = v;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = (self.cur.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.cur[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

struct GroupJob {
    task_id: u64,
    input: ChannelReader,
    dict_size: usize,
    preset: Option<Arc<[u8]>>,
    buffers: BufferPool,
    shared: Arc<DecodeShared>,
    session: Arc<Session<()>>,
}

impl GroupJob {
    fn decode(
        input: ChannelReader,
        task_id: u64,
        dict_size: usize,
        preset: &[u8],
        buffers: &BufferPool,
        shared: &DecodeShared,
    ) -> Result<()> {
        let mut reader = Lzma2Reader::with_dict(input, dict_size, preset);
        let piece_size = DECODE_PIECE_SIZE.min(buffers.limit());
        loop {
            let mut piece = shared.allocate(task_id, buffers, piece_size)?;
            piece.resize(piece_size, 0);
            let mut filled = 0;
            while filled < piece_size {
                let n = reader.read(&mut piece[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            piece.truncate(filled);
            if filled > 0 {
                shared.publish(task_id, piece)?;
            }
            if filled < piece_size {
                return Ok(());
            }
        }
    }

    fn run(self) {
        let GroupJob {
            task_id,
            input,
            dict_size,
            preset,
            buffers,
            shared,
            session,
        } = self;
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            Self::decode(
                input,
                task_id,
                dict_size,
                preset.as_deref().unwrap_or(&[]),
                &buffers,
                &shared,
            )
        }));
        let result = match outcome {
            Ok(r) => r,
            Err(payload) => Err(panic_error(payload.as_ref())),
        };
        // Free the slot before waking the frontend, which may be waiting
        // for exactly that.
        session.release(None);
        shared.finish_group(task_id, result);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ParallelReader
// ─────────────────────────────────────────────────────────────────────────────

/// `Read` adapter decoding independent groups of a stream in parallel.
///
/// Streams with a single group (anything written with a dictionary carried
/// across blocks) decode on one worker; streams written with
/// [`DictMode::None`](crate::options::DictMode::None) decode with up to
/// `affinity` groups in flight.
pub struct ParallelReader<R: Read> {
    inner: R,
    manager: Arc<ParallelManager>,
    session: Arc<Session<()>>,
    shared: Arc<DecodeShared>,
    closer: Arc<ReaderCloser>,
    dict_size: usize,
    preset: Option<Arc<[u8]>>,
    /// Feed of the group currently being read from the input.
    current: Option<Sender<Vec<u8>>>,
    /// Header of a new group waiting for a free worker slot.
    stashed: Option<ChunkHeader>,
    next_task: u64,
    input_done: bool,
    /// Piece being copied out and the read position in it.
    front: Option<(PooledBuffer, usize)>,
    error: Option<Lzma2Error>,
}

impl<R: Read> ParallelReader<R> {
    /// Parallel decoder for `options`, which must carry a parallel
    /// configuration.
    pub fn new(inner: R, options: &StreamOptions) -> Result<Self> {
        Self::with_output_cap(inner, options, OUTPUT_CAP_DEFAULT)
    }

    /// Like [`new`](Self::new) with an explicit cap on the decoded bytes the
    /// group at the cursor may buffer.
    pub fn with_output_cap(inner: R, options: &StreamOptions, output_cap: usize) -> Result<Self> {
        if output_cap == 0 {
            return Err(Lzma2Error::config("output cap must be positive"));
        }
        let manager = options
            .parallel_manager()?
            .ok_or_else(|| Lzma2Error::config("options have no parallel configuration"))?;
        let session = Session::new(manager.affinity());
        let shared = Arc::new(DecodeShared {
            state: Mutex::new(DecodeState {
                groups: BTreeMap::new(),
                cursor: 0,
                queued_input: 0,
                closed: false,
                failure: None,
            }),
            cond: Condvar::new(),
            output_cap,
        });
        let closer = Arc::new(ReaderCloser {
            shared: Arc::clone(&shared),
            session: Arc::clone(&session),
        });
        displaylevel!(3, "lzma2: parallel decoder open ({} workers)\n", manager.affinity());
        Ok(ParallelReader {
            inner,
            manager,
            session,
            shared,
            closer,
            dict_size: options.dict_size(),
            preset: options.preset_dict_arc(),
            current: None,
            stashed: None,
            next_task: 0,
            input_done: false,
            front: None,
            error: None,
        })
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Handle that closes this reader from another thread.
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle::new(Arc::clone(&self.closer) as Arc<dyn Closable>)
    }

    fn fail(&mut self, e: Lzma2Error) -> Lzma2Error {
        if self.error.is_none() {
            self.error = Some(e);
            self.current = None;
            self.closer.close();
        }
        self.error.clone().unwrap_or(Lzma2Error::CancelledOrClosed)
    }

    /// Start a worker for a new group. `false` when no slot is free.
    fn start_group(&mut self) -> Result<bool> {
        let Some(_) = self.session.try_acquire()? else {
            return Ok(false);
        };
        let task_id = self.next_task;
        self.next_task += 1;
        self.shared.lock().groups.insert(task_id, GroupOutput::default());

        let (tx, rx) = unbounded();
        let job = GroupJob {
            task_id,
            input: ChannelReader {
                rx,
                cur: Vec::new(),
                pos: 0,
                shared: Arc::clone(&self.shared),
            },
            dict_size: self.dict_size,
            preset: if task_id == 0 { self.preset.clone() } else { None },
            buffers: self.manager.buffers().clone(),
            shared: Arc::clone(&self.shared),
            session: Arc::clone(&self.session),
        };
        displaylevel!(4, "lzma2: dispatch group {}\n", task_id);
        if let Err(e) = self.manager.submit(Box::new(move || job.run())) {
            self.session.release(None);
            return Err(e);
        }
        self.current = Some(tx);
        Ok(true)
    }

    /// Move one chunk from the input to its group's worker. `false` when the
    /// chunk starts a group and no worker slot is free.
    fn pump(&mut self) -> Result<bool> {
        let header = match self.stashed.take() {
            Some(h) => h,
            None => ChunkHeader::read_from(&mut self.inner)?,
        };

        if header == ChunkHeader::End {
            if let Some(tx) = self.current.take() {
                let _ = tx.send(vec![END_MARKER]);
            }
            self.input_done = true;
            displaylevel!(3, "lzma2: parallel decoder read {} groups\n", self.next_task);
            return Ok(true);
        }

        if header.is_dict_reset() {
            // The previous group must end before its slot can come back.
            if let Some(tx) = self.current.take() {
                let _ = tx.send(vec![END_MARKER]);
            }
        }
        if self.current.is_none() && !self.start_group()? {
            self.stashed = Some(header);
            return Ok(false);
        }

        let mut bytes = Vec::with_capacity(header.encoded_len() + header.payload_len());
        header.write_to(&mut bytes);
        let head_len = bytes.len();
        bytes.resize(head_len + header.payload_len(), 0);
        self.inner.read_exact(&mut bytes[head_len..])?;

        self.shared.lock().queued_input += bytes.len();
        if let Some(tx) = &self.current {
            // A worker that already failed drops its receiver; the failure
            // is reported through the shared state.
            let _ = tx.send(bytes);
        }
        Ok(true)
    }

    fn read_inner(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            if let Some((piece, pos)) = &mut self.front {
                let n = (piece.len() - *pos).min(buf.len());
                buf[..n].copy_from_slice(&piece[*pos..*pos + n]);
                *pos += n;
                if *pos == piece.len() {
                    self.front = None;
                    self.shared.piece_freed();
                }
                return Ok(n);
            }

            let can_pump = {
                let mut st = self.shared.lock();
                if let Some(e) = &st.failure {
                    return Err(e.clone());
                }
                if st.closed {
                    return Err(Lzma2Error::CancelledOrClosed);
                }
                let cursor = st.cursor;
                if let Some(g) = st.groups.get_mut(&cursor) {
                    if let Some(piece) = g.pieces.pop_front() {
                        g.buffered -= piece.len();
                        self.shared.cond.notify_all();
                        drop(st);
                        self.front = Some((piece, 0));
                        continue;
                    }
                    if g.done {
                        st.groups.remove(&cursor);
                        st.cursor += 1;
                        self.shared.cond.notify_all();
                        continue;
                    }
                } else if self.input_done && cursor >= self.next_task {
                    return Ok(0);
                }

                let can_pump = !self.input_done
                    && st.queued_input < INPUT_READ_AHEAD_DEFAULT
                    && (self.stashed.is_none() || self.session.has_free_slot());
                if !can_pump {
                    let _st = self
                        .shared
                        .cond
                        .wait(st)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                can_pump
            };

            if can_pump {
                self.pump()?;
            }
        }
    }
}

impl<R: Read> Read for ParallelReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(e) = &self.error {
            return Err(e.clone().into());
        }
        if buf.is_empty() {
            return Ok(0);
        }
        match self.read_inner(buf) {
            Ok(n) => Ok(n),
            Err(e) => Err(self.fail(e).into()),
        }
    }
}

impl<R: Read> Drop for ParallelReader<R> {
    fn drop(&mut self) {
        self.current = None;
        self.closer.close();
    }
}
