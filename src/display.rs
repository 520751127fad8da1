//! Diagnostic output on stderr.
//!
//! Library and binary share one process-wide level:
//! 0 silent, 1 errors, 2 per-file results, 3 stream events, 4 per-block
//! events. The library never raises it; `lzma2` starts at 2.

use std::sync::atomic::{AtomicU32, Ordering};

static LEVEL: AtomicU32 = AtomicU32::new(0);

/// Level at which every pipeline task is reported.
pub const LEVEL_TRACE: u32 = 4;

#[inline]
pub fn display_level() -> u32 {
    LEVEL.load(Ordering::Relaxed)
}

#[inline]
pub fn set_display_level(level: u32) {
    LEVEL.store(level, Ordering::Relaxed);
}

/// True when messages of `level` are printed.
#[inline]
pub fn display_enabled(level: u32) -> bool {
    display_level() >= level
}

/// `eprint!` gated on the display level. Trace lines are flushed at once so
/// they interleave sensibly with worker threads.
#[macro_export]
macro_rules! displaylevel {
    ($level:expr, $($arg:tt)*) => {
        if $crate::display::display_enabled($level) {
            eprint!($($arg)*);
            if $level >= $crate::display::LEVEL_TRACE {
                use std::io::Write as _;
                let _ = std::io::stderr().flush();
            }
        }
    };
}
