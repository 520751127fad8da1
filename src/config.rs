// config.rs: compile-time configuration constants and runtime defaults.
//
// Values that callers may override at runtime (preset, worker count, block
// size) have a default here; the validated ranges live next to the option
// setters in `crate::options`.

// ---------------------------------------------------------------------------
// Size units
// ---------------------------------------------------------------------------
pub const KB: usize = 1 << 10;
pub const MB: usize = 1 << 20;
pub const GB: usize = 1 << 30;

// Default compression preset (0..=9).
// Can be overridden by the `-#` command-line flag.
pub const PRESET_DEFAULT: u32 = 6;

// Default number of parallel workers per session.
// 0 means "detect from the number of logical CPUs" (see `default_affinity`).
// Can be overridden by the LZMA2_NBWORKERS environment variable,
// or by the -T# command-line flag.
pub const NB_WORKERS_DEFAULT: usize = 0;

// Maximum number of concurrent workers in one parallel session.
pub const AFFINITY_MAX: usize = 255;

// Number of queued jobs the shared task pool accepts per worker thread before
// `submit_job` blocks.
pub const TASK_QUEUE_PER_THREAD: usize = 2;

// Decoded bytes the parallel reader lets the group at the done cursor buffer
// before its worker waits for the consumer.
pub const OUTPUT_CAP_DEFAULT: usize = MB;

// Compressed bytes the parallel reader may have queued towards workers that
// have not consumed them yet.
pub const INPUT_READ_AHEAD_DEFAULT: usize = 4 * MB;

// Size of the pieces a decoding worker publishes to the reader.
pub const DECODE_PIECE_SIZE: usize = 64 * KB;

// Upper bound on pooled buffer memory when the caller does not set one.
pub const BUFFER_POOL_LIMIT_DEFAULT: usize = 4 * GB;

// Number of idle buffers the pool keeps for reuse.
pub const BUFFER_POOL_KEEP: usize = 64;

/// Resolve the default affinity: `NB_WORKERS_DEFAULT` when non-zero, otherwise
/// the logical CPU count, capped at `AFFINITY_MAX`.
pub fn default_affinity() -> usize {
    let n = if NB_WORKERS_DEFAULT > 0 {
        NB_WORKERS_DEFAULT
    } else {
        num_cpus::get()
    };
    n.clamp(1, AFFINITY_MAX)
}
