//! Fixed-size task pool shared by the parallel sessions of one manager.
//!
//! Backed by `rayon::ThreadPool`. Bounded-queue / blocking-submit semantics
//! come from a `crossbeam_channel::bounded` channel pre-filled with one token
//! per slot: a submitter takes a token, the job gives it back when it ends.

use crossbeam_channel::{bounded, Receiver, Sender};
use rayon::ThreadPool as RayonPool;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use crate::error::{Lzma2Error, Result};

/// Unit of work run on a pool thread.
pub type JobFn = Box<dyn FnOnce() + Send + 'static>;

/// Count of unfinished jobs, signalled when it drops to zero.
#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn lock(&self) -> std::sync::MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn leave(&self) {
        let mut n = self.lock();
        *n -= 1;
        if *n == 0 {
            self.idle.notify_all();
        }
    }
}

/// Thread pool handle.
///
/// Dropping the pool waits for every submitted job, then joins the threads.
pub struct TPool {
    workers: RayonPool,
    // `queue_size + nb_threads` tokens.
    tokens_in: Sender<()>,
    tokens_out: Receiver<()>,
    in_flight: Arc<InFlight>,
    nb_threads: usize,
}

impl TPool {
    /// Pool of `nb_threads` threads accepting `queue_size` queued jobs on top
    /// of the running ones. Both must be at least 1.
    pub fn new(nb_threads: usize, queue_size: usize) -> Result<Self> {
        if nb_threads < 1 || queue_size < 1 {
            return Err(Lzma2Error::config(format!(
                "thread pool needs at least one thread and one queue slot (got {nb_threads}, {queue_size})"
            )));
        }
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(nb_threads)
            .thread_name(|i| format!("lzma2-worker-{i}"))
            .build()
            .map_err(|e| Lzma2Error::config(format!("cannot start worker threads: {e}")))?;

        let capacity = queue_size + nb_threads;
        let (tokens_in, tokens_out) = bounded(capacity);
        for _ in 0..capacity {
            tokens_in.send(()).map_err(|_| Lzma2Error::CancelledOrClosed)?;
        }

        Ok(TPool {
            workers,
            tokens_in,
            tokens_out,
            in_flight: Arc::new(InFlight::default()),
            nb_threads,
        })
    }

    pub fn nb_threads(&self) -> usize {
        self.nb_threads
    }

    /// Queue `job`; blocks while every slot is taken.
    ///
    /// A panicking job is contained: the pool keeps its thread and its slot
    /// accounting. Jobs that need to report a panic catch it themselves.
    pub fn submit_job(&self, job: JobFn) -> Result<()> {
        self.tokens_out.recv().map_err(|_| Lzma2Error::CancelledOrClosed)?;
        // Counted before the spawn so `jobs_completed` never sees a gap.
        *self.in_flight.lock() += 1;

        let in_flight = Arc::clone(&self.in_flight);
        let token = self.tokens_in.clone();
        self.workers.spawn(move || {
            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                crate::displaylevel!(1, "lzma2: a pool job panicked\n");
            }
            in_flight.leave();
            let _ = token.send(());
        });
        Ok(())
    }

    /// Number of submitted jobs that have not finished yet.
    pub fn pending(&self) -> usize {
        *self.in_flight.lock()
    }

    /// Block until every submitted job has finished. The pool stays usable.
    pub fn jobs_completed(&self) {
        let mut n = self.in_flight.lock();
        while *n > 0 {
            n = self.in_flight.idle.wait(n).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Drop for TPool {
    /// Waits for in-flight jobs; rayon joins the threads when the inner pool
    /// drops.
    fn drop(&mut self) {
        self.jobs_completed();
    }
}
