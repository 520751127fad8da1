//! File and stream operations behind the `lzma2` binary.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

use crate::cli::args::Args;
use crate::config::MB;
use crate::displaylevel;
use crate::io::{StreamReader, StreamWriter};
use crate::options::StreamOptions;

/// Suffix appended to compressed files.
pub const LZMA2_EXTENSION: &str = ".lzma2";

/// Bytes read up front for `--tune`.
const TUNE_SAMPLE_SIZE: usize = MB;

const STDIN_MARK: &str = "-";

/// Totals of one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// `Write` adapter counting the bytes that pass through it.
struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Compress `input` into `output`. With `tune`, the properties are chosen by
/// trial on the first [`TUNE_SAMPLE_SIZE`] bytes before encoding starts.
pub fn compress_stream<R: Read, W: Write>(
    mut input: R,
    output: W,
    options: &mut StreamOptions,
    tune: bool,
) -> anyhow::Result<Summary> {
    let mut head = Vec::new();
    if tune {
        input
            .by_ref()
            .take(TUNE_SAMPLE_SIZE as u64)
            .read_to_end(&mut head)
            .context("cannot read input")?;
        let best = options.find_best_props(&head).context("property search failed")?;
        displaylevel!(3, "tuned properties: {} ({} bytes on the sample)\n", options, best);
    }

    let sink = CountingWriter { inner: output, count: 0 };
    let mut w = StreamWriter::new(sink, options)?;
    w.write_all(&head).context("compression failed")?;
    let copied = io::copy(&mut input, &mut w).context("compression failed")?;
    let mut sink = w.finish().context("compression failed")?;
    sink.flush().context("cannot flush output")?;
    Ok(Summary {
        bytes_in: head.len() as u64 + copied,
        bytes_out: sink.count,
    })
}

/// Decompress `input` into `output`.
pub fn decompress_stream<R: Read, W: Write>(
    input: R,
    mut output: W,
    options: &StreamOptions,
) -> anyhow::Result<Summary> {
    let mut input = CountingReader { inner: input, count: 0 };
    let mut r = StreamReader::new(&mut input, options)?;
    let written = io::copy(&mut r, &mut output).context("decompression failed")?;
    drop(r);
    output.flush().context("cannot flush output")?;
    Ok(Summary {
        bytes_in: input.count,
        bytes_out: written,
    })
}

struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

/// Destination name for `input`: `<input>.lzma2` when compressing, the name
/// without `.lzma2` when decompressing.
pub fn output_path(input: &Path, decompress: bool) -> anyhow::Result<PathBuf> {
    let name = input.to_string_lossy();
    if decompress {
        match name.strip_suffix(LZMA2_EXTENSION) {
            Some(stem) if !stem.is_empty() => Ok(PathBuf::from(stem)),
            _ => bail!("{}: unknown suffix, expected {}", name, LZMA2_EXTENSION),
        }
    } else {
        Ok(PathBuf::from(format!("{name}{LZMA2_EXTENSION}")))
    }
}

fn copy_mtime(src: &Path, dst: &Path) {
    if let Ok(meta) = fs::metadata(src) {
        let mtime = filetime::FileTime::from_last_modification_time(&meta);
        if let Err(e) = filetime::set_file_mtime(dst, mtime) {
            displaylevel!(2, "{}: cannot set modification time: {}\n", dst.display(), e);
        }
    }
}

fn run_one<R: Read, W: Write>(
    args: &Args,
    options: &StreamOptions,
    input: R,
    output: W,
) -> anyhow::Result<Summary> {
    if args.decompress {
        decompress_stream(input, output, options)
    } else {
        let mut options = options.clone();
        compress_stream(input, output, &mut options, args.tune)
    }
}

fn report(label: &str, args: &Args, s: Summary) {
    if args.decompress {
        displaylevel!(2, "{}: {} bytes -> {} bytes\n", label, s.bytes_in, s.bytes_out);
    } else {
        let ratio = if s.bytes_in == 0 {
            0.0
        } else {
            s.bytes_out as f64 * 100.0 / s.bytes_in as f64
        };
        displaylevel!(
            2,
            "{}: {} bytes -> {} bytes ({:.2}%)\n",
            label,
            s.bytes_in,
            s.bytes_out,
            ratio
        );
    }
}

/// Process one input file (or `-` for standard input).
pub fn process_file(path: &Path, args: &Args, options: &StreamOptions) -> anyhow::Result<()> {
    if path.as_os_str() == STDIN_MARK {
        let stdin = io::stdin().lock();
        let stdout = BufWriter::new(io::stdout().lock());
        let s = run_one(args, options, stdin, stdout)?;
        report("stdin", args, s);
        return Ok(());
    }

    let input = File::open(path).with_context(|| format!("{}: cannot open", path.display()))?;
    let input = BufReader::new(input);

    if args.stdout {
        let stdout = BufWriter::new(io::stdout().lock());
        let s = run_one(args, options, input, stdout)
            .with_context(|| path.display().to_string())?;
        report(&path.display().to_string(), args, s);
        return Ok(());
    }

    let dst = output_path(path, args.decompress)?;
    if dst.exists() && !args.force {
        bail!("{}: already exists; use -f to overwrite", dst.display());
    }
    let out = File::create(&dst).with_context(|| format!("{}: cannot create", dst.display()))?;
    let result = run_one(args, options, input, BufWriter::new(out));
    let s = match result {
        Ok(s) => s,
        Err(e) => {
            let _ = fs::remove_file(&dst);
            return Err(e.context(path.display().to_string()));
        }
    };
    copy_mtime(path, &dst);
    report(&path.display().to_string(), args, s);

    if args.remove {
        fs::remove_file(path).with_context(|| format!("{}: cannot remove", path.display()))?;
    }
    Ok(())
}

/// Run the command described by `args`; returns the number of failed inputs.
pub fn run(args: &Args, options: &StreamOptions) -> usize {
    displaylevel!(3, "lzma2 {} options {}\n", crate::VERSION_STRING, options);
    let stdin = [PathBuf::from(STDIN_MARK)];
    let files: &[PathBuf] = if args.files.is_empty() { &stdin } else { &args.files };

    let mut failures = 0;
    for f in files {
        if let Err(e) = process_file(f, args, options) {
            displaylevel!(1, "lzma2: {:#}\n", e);
            failures += 1;
        }
    }
    failures
}
