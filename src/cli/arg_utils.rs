// arg_utils.rs: small parsing helpers shared by the argument parser and
// the environment lookups.

use std::ffi::OsString;

use crate::display::display_level;

/// Parses an unsigned size with an optional binary suffix.
///
/// Recognised suffixes: `K`/`KB`/`KiB`, `M`/`MB`/`MiB`, `G`/`GB`/`GiB`.
/// Returns `None` on anything else, including overflow.
pub fn read_size(s: &str) -> Option<usize> {
    let digits = s.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let value: u64 = s[..digits].parse().ok()?;
    let shift = match &s[digits..] {
        "" => 0,
        "K" | "KB" | "KiB" => 10,
        "M" | "MB" | "MiB" => 20,
        "G" | "GB" | "GiB" => 30,
        _ => return None,
    };
    let scaled = value.checked_mul(1u64 << shift)?;
    usize::try_from(scaled).ok()
}

/// `clap` value parser wrapper around [`read_size`].
pub fn parse_size_arg(s: &str) -> Result<usize, String> {
    read_size(s).ok_or_else(|| format!("invalid size '{s}' (expected e.g. 512K, 8M, 1G)"))
}

/// Rewrite `-0` … `-9` into `--preset=N` so the derive parser can handle the
/// numeric shorthand. Everything after a bare `--` is left alone.
pub fn expand_preset_flags<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut out = Vec::new();
    let mut options_done = false;
    for arg in args {
        if !options_done {
            if arg == "--" {
                options_done = true;
            } else if let Some(s) = arg.to_str() {
                let b = s.as_bytes();
                if b.len() == 2 && b[0] == b'-' && b[1].is_ascii_digit() {
                    out.push(OsString::from(format!("--preset={}", b[1] - b'0')));
                    continue;
                }
            }
        }
        out.push(arg);
    }
    out
}

/// Parse an optional `LZMA2_NBWORKERS` value. Non-numeric values are ignored
/// with a warning.
pub fn init_nb_workers_from(env_val: Option<&str>) -> Option<usize> {
    const ENV_NBWORKERS: &str = "LZMA2_NBWORKERS";
    let env = env_val?;
    match env.trim().parse::<usize>() {
        Ok(n) => Some(n),
        Err(_) => {
            if display_level() >= 2 {
                eprintln!(
                    "Ignore environment variable setting {}={}: not a valid unsigned value",
                    ENV_NBWORKERS, env
                );
            }
            None
        }
    }
}

/// Read the worker count from the `LZMA2_NBWORKERS` environment variable.
pub fn init_nb_workers() -> Option<usize> {
    init_nb_workers_from(std::env::var("LZMA2_NBWORKERS").ok().as_deref())
}
