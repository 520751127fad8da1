//! Crate-wide error type.
//!
//! Every fallible operation in the library returns [`Result`]. The enum is
//! `Clone` so that a parallel session which failed once can hand the same
//! cause to every later call on it.

use std::fmt;
use std::io;
use std::sync::Arc;

// ─────────────────────────────────────────────────────────────────────────────
// Lzma2Error
// ─────────────────────────────────────────────────────────────────────────────

/// Errors produced by the chunk container, the engine and the parallel layer.
#[derive(Debug, Clone)]
pub enum Lzma2Error {
    /// An option value or combination is invalid. Detected when the option
    /// is set; values are never clamped silently.
    Configuration(String),
    /// The buffer pool could not satisfy an allocation.
    ResourceExhausted {
        /// Bytes asked for.
        requested: usize,
        /// Bytes still available under the pool ceiling.
        available: usize,
    },
    /// The compressed input is malformed. Fatal for the decoding session.
    CorruptedInput(&'static str),
    /// A parallel worker failed; `cause` is the error the worker hit.
    WorkerFailure {
        /// Task id (block or group index) of the failed worker.
        task_id: u64,
        /// Original error raised inside the worker.
        cause: Box<Lzma2Error>,
    },
    /// The session was closed or cancelled.
    CancelledOrClosed,
    /// Underlying reader or writer failed.
    Io(Arc<io::Error>),
}

/// Crate result alias.
pub type Result<T> = std::result::Result<T, Lzma2Error>;

impl Lzma2Error {
    /// Shorthand for a [`Lzma2Error::Configuration`] error.
    pub fn config(msg: impl Into<String>) -> Self {
        Lzma2Error::Configuration(msg.into())
    }

    /// Returns `true` for errors after which the caller may retry the same
    /// operation (currently only buffer exhaustion).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Lzma2Error::ResourceExhausted { .. })
    }

    /// Follow `WorkerFailure` chains down to the error that started them.
    pub fn root_cause(&self) -> &Lzma2Error {
        let mut e = self;
        while let Lzma2Error::WorkerFailure { cause, .. } = e {
            e = cause;
        }
        e
    }
}

impl fmt::Display for Lzma2Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lzma2Error::Configuration(msg) => write!(f, "invalid configuration: {msg}"),
            Lzma2Error::ResourceExhausted {
                requested,
                available,
            } => write!(
                f,
                "buffer pool exhausted: requested {requested} bytes, {available} available"
            ),
            Lzma2Error::CorruptedInput(what) => write!(f, "corrupted input: {what}"),
            Lzma2Error::WorkerFailure { task_id, cause } => {
                write!(f, "worker for task {task_id} failed: {cause}")
            }
            Lzma2Error::CancelledOrClosed => f.write_str("session cancelled or closed"),
            Lzma2Error::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Lzma2Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Lzma2Error::WorkerFailure { cause, .. } => Some(cause.as_ref()),
            Lzma2Error::Io(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// io::Error conversions
// ─────────────────────────────────────────────────────────────────────────────

impl From<io::Error> for Lzma2Error {
    fn from(e: io::Error) -> Self {
        // Unwrap errors that were ours to begin with (round trip through a
        // Read/Write impl) so callers still see the precise variant.
        if e.get_ref().is_some_and(|inner| inner.is::<Lzma2Error>()) {
            if let Some(inner) = e.into_inner() {
                if let Ok(ours) = inner.downcast::<Lzma2Error>() {
                    return *ours;
                }
            }
            return Lzma2Error::CorruptedInput("unrecoverable wrapped error");
        }
        if e.kind() == io::ErrorKind::UnexpectedEof {
            return Lzma2Error::CorruptedInput("unexpected end of input");
        }
        Lzma2Error::Io(Arc::new(e))
    }
}

impl From<Lzma2Error> for io::Error {
    fn from(e: Lzma2Error) -> Self {
        let kind = match &e {
            Lzma2Error::Io(inner) => inner.kind(),
            Lzma2Error::CorruptedInput(_) => io::ErrorKind::InvalidData,
            Lzma2Error::Configuration(_) => io::ErrorKind::InvalidInput,
            Lzma2Error::ResourceExhausted { .. } => io::ErrorKind::OutOfMemory,
            Lzma2Error::CancelledOrClosed => io::ErrorKind::BrokenPipe,
            Lzma2Error::WorkerFailure { .. } => io::ErrorKind::Other,
        };
        io::Error::new(kind, e)
    }
}
