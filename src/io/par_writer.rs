//! Block-parallel encoder frontend.
//!
//! Input is cut into blocks of the manager's block size. Each full block is
//! handed to a worker job that primes a [`ChunkEncoder`] with the block's
//! preset dictionary, encodes the block into chunks and sends the result back
//! over a channel. Results go through a [`ReorderBuffer`] so the sink sees
//! them strictly in block order; `finish` appends the end marker.
//!
//! With [`DictMode::Sync`] or [`DictMode::Async`] every block after the first
//! starts with a properties reset and inherits the preceding history as its
//! preset, so the output decodes as one stream. Both modes produce the same
//! bytes; they differ only in which thread copies the preset.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::displaylevel;
use crate::error::{Lzma2Error, Result};
use crate::frame::chunk::END_MARKER;
use crate::frame::writer::ChunkEncoder;
use crate::io::buffer_pool::PooledBuffer;
use crate::io::manager::{panic_error, preset_len, CloseHandle, Closable, ParallelManager, Session};
use crate::io::reorder::ReorderBuffer;
use crate::options::{DictMode, StreamOptions};

// ─────────────────────────────────────────────────────────────────────────────
// Jobs
// ─────────────────────────────────────────────────────────────────────────────

enum Completion {
    Done {
        task_id: u64,
        result: Result<PooledBuffer>,
    },
    /// Sent by a [`CloseHandle`] to wake a frontend waiting for results.
    Wake,
}

/// Where a block's preset dictionary comes from.
enum PresetSource {
    Empty,
    /// The caller's preset dictionary, used as is.
    Shared(Arc<[u8]>),
    /// Copied by the frontend before dispatch.
    Ready(Vec<u8>),
    /// Assembled by the worker from the retained history.
    Parts {
        user: Option<Arc<[u8]>>,
        blocks: Vec<Arc<PooledBuffer>>,
        len: usize,
    },
}

impl PresetSource {
    fn bytes(&self) -> Cow<'_, [u8]> {
        match self {
            PresetSource::Empty => Cow::Borrowed(&[]),
            PresetSource::Shared(p) => Cow::Borrowed(&p[..]),
            PresetSource::Ready(v) => Cow::Borrowed(&v[..]),
            PresetSource::Parts { user, blocks, len } => {
                Cow::Owned(assemble_preset(user.as_deref(), blocks, *len))
            }
        }
    }
}

/// The last `len` bytes of the user preset followed by `blocks`.
fn assemble_preset(user: Option<&[u8]>, blocks: &[Arc<PooledBuffer>], len: usize) -> Vec<u8> {
    let mut need = len;
    let mut parts: Vec<&[u8]> = Vec::new();
    for b in blocks.iter().rev() {
        if need == 0 {
            break;
        }
        let take = need.min(b.len());
        parts.push(&b[b.len() - take..]);
        need -= take;
    }
    if need > 0 {
        if let Some(u) = user {
            let take = need.min(u.len());
            parts.push(&u[u.len() - take..]);
        }
    }
    let mut out = Vec::with_capacity(len);
    for p in parts.iter().rev() {
        out.extend_from_slice(p);
    }
    out
}

struct BlockJob {
    task_id: u64,
    input: Arc<PooledBuffer>,
    preset: PresetSource,
    output: PooledBuffer,
    encoder: Option<ChunkEncoder>,
    options: Arc<StreamOptions>,
    session: Arc<Session<ChunkEncoder>>,
    done: Sender<Completion>,
}

impl BlockJob {
    fn run(self) {
        let BlockJob {
            task_id,
            input,
            preset,
            mut output,
            encoder,
            options,
            session,
            done,
        } = self;

        if session.is_closed() {
            session.release(encoder);
            let _ = done.send(Completion::Done {
                task_id,
                result: Err(Lzma2Error::CancelledOrClosed),
            });
            return;
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| -> Result<ChunkEncoder> {
            let preset = preset.bytes();
            let mut enc = match encoder {
                Some(mut e) => {
                    e.reset_with_preset(&preset);
                    e
                }
                None => ChunkEncoder::with_preset(&options, &preset),
            };
            enc.write(&input, &mut output)?;
            enc.finish_chunks(&mut output)?;
            Ok(enc)
        }));
        drop(input);

        let result = match outcome {
            Ok(Ok(enc)) => {
                session.release(Some(enc));
                Ok(output)
            }
            Ok(Err(e)) => {
                session.release(None);
                Err(Lzma2Error::WorkerFailure {
                    task_id,
                    cause: Box::new(e),
                })
            }
            Err(payload) => {
                session.release(None);
                Err(Lzma2Error::WorkerFailure {
                    task_id,
                    cause: Box::new(panic_error(payload.as_ref())),
                })
            }
        };
        let _ = done.send(Completion::Done { task_id, result });
    }
}

struct WriterCloser {
    session: Arc<Session<ChunkEncoder>>,
    wake: Sender<Completion>,
}

impl Closable for WriterCloser {
    fn close(&self) {
        self.session.close();
        let _ = self.wake.send(Completion::Wake);
    }

    fn is_closed(&self) -> bool {
        self.session.is_closed()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ParallelWriter
// ─────────────────────────────────────────────────────────────────────────────

/// `Write` adapter compressing blocks on the manager's worker pool.
///
/// Output order equals input order whatever order the workers finish in. Any
/// worker failure closes the writer: later calls fail fast, and `finish`
/// returns the original cause.
pub struct ParallelWriter<W: Write> {
    inner: Option<W>,
    manager: Arc<ParallelManager>,
    options: Arc<StreamOptions>,
    session: Arc<Session<ChunkEncoder>>,
    closer: Arc<WriterCloser>,
    done_rx: Receiver<Completion>,
    block: Option<PooledBuffer>,
    block_size: usize,
    dict_size: usize,
    dict_mode: DictMode,
    user_preset: Option<Arc<[u8]>>,
    /// Dispatched blocks still within dictionary reach of the next one.
    retained: VecDeque<Arc<PooledBuffer>>,
    retained_len: usize,
    /// Plaintext bytes dispatched so far.
    offset: u64,
    outstanding: usize,
    reorder: ReorderBuffer<PooledBuffer>,
    error: Option<Lzma2Error>,
}

impl<W: Write> ParallelWriter<W> {
    /// Parallel encoder for `options`, which must carry a parallel
    /// configuration.
    pub fn new(inner: W, options: &StreamOptions) -> Result<Self> {
        let manager = options
            .parallel_manager()?
            .ok_or_else(|| Lzma2Error::config("options have no parallel configuration"))?;
        let session = Session::new(manager.affinity());
        let (done_tx, done_rx) = unbounded();
        let closer = Arc::new(WriterCloser {
            session: Arc::clone(&session),
            wake: done_tx,
        });
        displaylevel!(
            3,
            "lzma2: parallel encoder open ({} workers, {} byte blocks)\n",
            manager.affinity(),
            manager.block_size()
        );
        Ok(ParallelWriter {
            inner: Some(inner),
            block_size: manager.block_size(),
            dict_size: options.dict_size(),
            dict_mode: manager.dict_mode(),
            user_preset: options.preset_dict_arc(),
            manager,
            options: Arc::new(options.clone()),
            session,
            closer,
            done_rx,
            block: None,
            retained: VecDeque::new(),
            retained_len: 0,
            offset: 0,
            outstanding: 0,
            reorder: ReorderBuffer::new(),
            error: None,
        })
    }

    /// Handle that closes this writer from another thread.
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle::new(Arc::clone(&self.closer) as Arc<dyn Closable>)
    }

    pub fn get_ref(&self) -> Option<&W> {
        self.inner.as_ref()
    }

    /// Record the first fatal error, close the session and return it.
    fn fail(&mut self, e: Lzma2Error) -> Lzma2Error {
        if self.error.is_none() {
            if !matches!(e, Lzma2Error::CancelledOrClosed) {
                displaylevel!(1, "lzma2: parallel encoder failed: {}\n", e);
            }
            self.error = Some(e);
            self.session.close();
        }
        self.error.clone().unwrap_or(Lzma2Error::CancelledOrClosed)
    }

    fn check_open(&mut self) -> Result<()> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        if self.session.is_closed() {
            return Err(self.fail(Lzma2Error::CancelledOrClosed));
        }
        Ok(())
    }

    fn handle(&mut self, c: Completion) -> Result<()> {
        if let Completion::Done { task_id, result } = c {
            self.outstanding -= 1;
            match result {
                Ok(out) => {
                    displaylevel!(4, "lzma2: block {} done ({} bytes)\n", task_id, out.len());
                    if self.reorder.insert(task_id, out).is_err() {
                        return Err(self.fail(Lzma2Error::CancelledOrClosed));
                    }
                }
                Err(e) => return Err(self.fail(e)),
            }
        }
        self.check_open()?;
        self.write_ready()
    }

    fn write_ready(&mut self) -> Result<()> {
        while let Some(out) = self.reorder.pop_ready() {
            let Some(inner) = self.inner.as_mut() else {
                return Err(self.fail(Lzma2Error::CancelledOrClosed));
            };
            if let Err(e) = inner.write_all(&out) {
                return Err(self.fail(e.into()));
            }
        }
        Ok(())
    }

    /// Process the results that already arrived.
    fn drain_ready(&mut self) -> Result<()> {
        while let Ok(c) = self.done_rx.try_recv() {
            self.handle(c)?;
        }
        self.check_open()
    }

    /// Block until every dispatched block has been written.
    fn wait_all(&mut self) -> Result<()> {
        while self.outstanding > 0 {
            let c = self
                .done_rx
                .recv()
                .map_err(|_| Lzma2Error::CancelledOrClosed)?;
            self.handle(c)?;
        }
        self.check_open()
    }

    /// Run `alloc` against the manager; on exhaustion wait for the
    /// outstanding workers to give their buffers back and try once more.
    fn allocate_with<F>(&mut self, alloc: F) -> Result<PooledBuffer>
    where
        F: Fn(&ParallelManager) -> Result<PooledBuffer>,
    {
        let manager = Arc::clone(&self.manager);
        match alloc(&manager) {
            Err(e) if e.is_recoverable() && self.outstanding > 0 => {
                self.wait_all()?;
                alloc(&manager)
            }
            r => r,
        }
    }

    fn preset_for(&self, task_id: u64) -> PresetSource {
        match self.dict_mode {
            DictMode::None => match (&self.user_preset, task_id) {
                (Some(p), 0) => PresetSource::Shared(Arc::clone(p)),
                _ => PresetSource::Empty,
            },
            mode => {
                let user_len = self.user_preset.as_ref().map_or(0, |p| p.len());
                let len = preset_len(self.dict_size, user_len, self.offset);
                if len == 0 {
                    return PresetSource::Empty;
                }
                let blocks: Vec<Arc<PooledBuffer>> = self.retained.iter().cloned().collect();
                if mode == DictMode::Sync {
                    PresetSource::Ready(assemble_preset(self.user_preset.as_deref(), &blocks, len))
                } else {
                    PresetSource::Parts {
                        user: self.user_preset.clone(),
                        blocks,
                        len,
                    }
                }
            }
        }
    }

    fn retain(&mut self, block: Arc<PooledBuffer>) {
        self.retained_len += block.len();
        self.retained.push_back(block);
        while let Some(front) = self.retained.front() {
            if self.retained_len - front.len() < self.dict_size {
                break;
            }
            self.retained_len -= front.len();
            self.retained.pop_front();
        }
    }

    /// Hand the current block to a worker. On a recoverable error the block
    /// stays in place for a later retry.
    fn dispatch(&mut self) -> Result<()> {
        let block_len = self.block.as_ref().map_or(0, |b| b.len());
        if block_len == 0 {
            return Ok(());
        }
        let output = self.allocate_with(|m| m.allocate_output(block_len))?;

        let encoder = match self.session.acquire() {
            Ok(w) => w,
            Err(e) => return Err(self.fail(e)),
        };
        // A worker may have failed while we waited for its slot.
        if let Err(e) = self.drain_ready() {
            self.session.release(encoder);
            return Err(e);
        }

        let Some(block) = self.block.take() else {
            self.session.release(encoder);
            return Ok(());
        };
        let task_id = self.session.next_task_id();
        let preset = self.preset_for(task_id);
        let input = Arc::new(block);
        if self.dict_mode != DictMode::None {
            self.retain(Arc::clone(&input));
        }
        self.offset += block_len as u64;

        let job = BlockJob {
            task_id,
            input,
            preset,
            output,
            encoder,
            options: Arc::clone(&self.options),
            session: Arc::clone(&self.session),
            done: self.closer.wake.clone(),
        };
        displaylevel!(4, "lzma2: dispatch block {} ({} bytes)\n", task_id, block_len);
        if let Err(e) = self.manager.submit(Box::new(move || job.run())) {
            self.session.release(None);
            return Err(self.fail(e));
        }
        self.outstanding += 1;
        self.drain_ready()
    }

    fn block_is_full(&self) -> bool {
        self.block.as_ref().is_some_and(|b| b.len() >= self.block_size)
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<usize> {
        self.drain_ready()?;
        if buf.is_empty() {
            return Ok(0);
        }
        if self.block_is_full() {
            // A dispatch deferred by buffer exhaustion.
            self.dispatch()?;
        }
        if self.block.is_none() {
            let block_size = self.block_size;
            self.block = Some(self.allocate_with(|m| m.buffers().allocate(block_size))?);
        }
        let block_size = self.block_size;
        let n = match self.block.as_mut() {
            Some(block) => {
                let n = (block_size - block.len()).min(buf.len());
                block.extend_from_slice(&buf[..n]);
                n
            }
            None => 0,
        };
        if self.block_is_full() {
            match self.dispatch() {
                Err(e) if !e.is_recoverable() => return Err(e),
                _ => {}
            }
        }
        Ok(n)
    }

    /// Dispatch the partial block, write every result and flush the sink.
    fn flush_all(&mut self) -> Result<()> {
        self.check_open()?;
        self.dispatch()?;
        self.wait_all()?;
        let flushed = match self.inner.as_mut() {
            Some(inner) => inner.flush(),
            None => return Err(Lzma2Error::CancelledOrClosed),
        };
        flushed.map_err(|e| self.fail(e.into()))
    }

    /// Encode the trailing partial block, wait for every worker, write the
    /// end marker, flush and return the sink.
    pub fn finish(mut self) -> Result<W> {
        self.flush_all()?;
        let mut inner = self.inner.take().ok_or(Lzma2Error::CancelledOrClosed)?;
        inner.write_all(&[END_MARKER])?;
        inner.flush()?;
        displaylevel!(
            3,
            "lzma2: parallel encoder finished: {} bytes in {} blocks\n",
            self.offset,
            self.reorder.next_id()
        );
        self.session.close();
        Ok(inner)
    }
}

impl<W: Write> Write for ParallelWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_bytes(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.flush_all()?)
    }
}

impl<W: Write> Drop for ParallelWriter<W> {
    fn drop(&mut self) {
        self.session.close();
    }
}
