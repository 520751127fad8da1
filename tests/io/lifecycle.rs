// Integration tests for the parallel session lifecycle: closing, sink
// failures, buffer pool limits and configuration errors.
//
// Closing covers writers blocked on busy workers as well as readers blocked
// on their source.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lzma2::io::{BufferPool, ParallelReader, ParallelWriter, StreamReader, StreamWriter};
use lzma2::{compress, decompress, DictMode, Lzma2Error, ParallelConfig, StreamOptions};

use super::common::{parallel_options, text, KB};

/// Sink that accepts `limit` bytes and then fails every call.
struct FailingSink {
    written: usize,
    limit: usize,
}

impl Write for FailingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written >= self.limit {
            return Err(io::Error::other("sink broke"));
        }
        let n = buf.len().min(self.limit - self.written);
        self.written += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reader that never returns, until released.
struct StallingReader {
    data: Vec<u8>,
    pos: usize,
    release: Arc<AtomicBool>,
}

impl Read for StallingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos == self.data.len() {
            while !self.release.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(5));
            }
            return Ok(0);
        }
        let n = (self.data.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

// ── Closing ───────────────────────────────────────────────────────────────────

#[test]
fn closed_writer_fails_fast() {
    let o = parallel_options(1, 64 * KB, 2, 64 * KB, DictMode::Sync);
    let mut w = ParallelWriter::new(Vec::new(), &o).unwrap();
    w.write_all(&text(200 * KB)).unwrap();

    let handle = w.close_handle();
    assert!(!handle.is_closed());
    std::thread::spawn(move || handle.close()).join().unwrap();

    let err: Lzma2Error = w.write_all(b"more").unwrap_err().into();
    assert!(matches!(err.root_cause(), Lzma2Error::CancelledOrClosed));
    assert!(matches!(w.finish().unwrap_err().root_cause(), Lzma2Error::CancelledOrClosed));
}

#[test]
fn close_handle_wakes_writer_waiting_for_a_worker() {
    // One pool thread, held by a decoder group waiting on a stalled source.
    let o = parallel_options(1, 64 * KB, 1, 64 * KB, DictMode::Sync);
    let packed = compress(&text(300 * KB), &o).unwrap();
    let release = Arc::new(AtomicBool::new(false));
    let input = StallingReader {
        data: packed[..packed.len() / 2].to_vec(),
        pos: 0,
        release: Arc::clone(&release),
    };
    let mut r = ParallelReader::new(input, &o).unwrap();
    let reader = std::thread::spawn(move || {
        let mut out = Vec::new();
        r.read_to_end(&mut out)
    });
    std::thread::sleep(Duration::from_millis(100));

    // The first block queues behind the decoder job and keeps the writer's
    // only slot; the second block waits for it.
    let mut w = ParallelWriter::new(Vec::new(), &o).unwrap();
    let handle = w.close_handle();
    let writer = std::thread::spawn(move || {
        let r = w.write_all(&text(256 * KB));
        (r, w)
    });
    std::thread::sleep(Duration::from_millis(200));
    assert!(!writer.is_finished(), "writer should wait for a free worker");

    handle.close();
    let (result, w) = writer.join().unwrap();
    let err: Lzma2Error = result.unwrap_err().into();
    assert!(matches!(err.root_cause(), Lzma2Error::CancelledOrClosed), "{err:?}");
    assert!(matches!(w.finish().unwrap_err().root_cause(), Lzma2Error::CancelledOrClosed));

    release.store(true, Ordering::SeqCst);
    assert!(reader.join().unwrap().is_err());
}

#[test]
fn close_handle_wakes_blocked_reader() {
    let o = parallel_options(1, 64 * KB, 2, 64 * KB, DictMode::None);
    let packed = compress(&text(100 * KB), &o).unwrap();
    // Drop the end marker so the reader waits for more input... from a
    // source that stalls.
    let release = Arc::new(AtomicBool::new(false));
    let input = StallingReader {
        data: packed[..packed.len() - 1].to_vec(),
        pos: 0,
        release: Arc::clone(&release),
    };
    let mut r = ParallelReader::new(input, &o).unwrap();
    let handle = r.close_handle();

    // Decode what is there, then close from another thread while the
    // frontend is stuck in the stalled source.
    let closer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        handle.close();
        release.store(true, Ordering::SeqCst);
    });
    let mut out = Vec::new();
    let err: Lzma2Error = r.read_to_end(&mut out).unwrap_err().into();
    closer.join().unwrap();
    assert!(matches!(
        err.root_cause(),
        Lzma2Error::CancelledOrClosed | Lzma2Error::CorruptedInput(_)
    ));
    let again: Lzma2Error = r.read(&mut [0u8; 4]).unwrap_err().into();
    assert!(matches!(
        again.root_cause(),
        Lzma2Error::CancelledOrClosed | Lzma2Error::CorruptedInput(_)
    ));
}

#[test]
fn closing_a_reader_before_reading() {
    let o = parallel_options(1, 64 * KB, 2, 64 * KB, DictMode::None);
    let packed = compress(&text(100 * KB), &o).unwrap();
    let mut r = StreamReader::new(&packed[..], &o).unwrap();
    let handle = r.close_handle().unwrap();
    handle.close();
    assert!(handle.is_closed());
    let err: Lzma2Error = r.read(&mut [0u8; 16]).unwrap_err().into();
    assert!(matches!(err, Lzma2Error::CancelledOrClosed));
}

#[test]
fn single_stream_has_no_close_handle() {
    let o = StreamOptions::with_preset(1).unwrap();
    assert!(StreamWriter::new(Vec::new(), &o).unwrap().close_handle().is_none());
    assert!(StreamReader::new(&[0u8][..], &o).unwrap().close_handle().is_none());
}

// ── Sink failures ─────────────────────────────────────────────────────────────

#[test]
fn failing_sink_closes_the_writer() {
    let o = parallel_options(1, 64 * KB, 3, 64 * KB, DictMode::Sync);
    let data = text(1024 * KB);
    let mut w = ParallelWriter::new(FailingSink { written: 0, limit: 1000 }, &o).unwrap();

    let mut first = None;
    for piece in data.chunks(16 * KB) {
        if let Err(e) = w.write_all(piece) {
            first = Some(Lzma2Error::from(e));
            break;
        }
    }
    let err = match first {
        Some(e) => e,
        None => w.finish().err().unwrap(),
    };
    assert!(matches!(err, Lzma2Error::Io(_)), "{err:?}");
}

#[test]
fn failing_sink_error_is_sticky() {
    let o = parallel_options(0, 64 * KB, 2, 64 * KB, DictMode::None);
    let mut w = ParallelWriter::new(FailingSink { written: 0, limit: 10 }, &o).unwrap();
    w.write_all(&text(256 * KB)).ok();
    let e1: Lzma2Error = w.flush().unwrap_err().into();
    let e2: Lzma2Error = w.write(b"abc").unwrap_err().into();
    assert!(matches!(e1, Lzma2Error::Io(_)));
    assert!(matches!(e2, Lzma2Error::Io(_)));
}

// ── Buffer pool ───────────────────────────────────────────────────────────────

fn tight_pool_options(limit: usize) -> StreamOptions {
    let mut o = StreamOptions::with_preset(1).unwrap();
    o.set_dict_size(64 * KB).unwrap();
    let mut p = ParallelConfig::new();
    p.set_affinity(4).unwrap();
    p.set_block_size(Some(64 * KB)).unwrap();
    p.set_dict_mode(DictMode::None);
    p.set_buffer_pool_limit(limit).unwrap();
    o.set_parallel(Some(p));
    o
}

#[test]
fn tight_pool_still_completes() {
    // Room for one input block, one output buffer and a little more: the
    // writer has to wait for its workers before every new block, and
    // decoding groups wait for the reader to free their pieces.
    let o = tight_pool_options(3 * 64 * KB);
    let data = text(600 * KB);
    let packed = compress(&data, &o).unwrap();

    let mut r = ParallelReader::new(&packed[..], &o).unwrap();
    let mut out = Vec::new();
    r.read_to_end(&mut out).unwrap();
    assert_eq!(out, data);
    assert_eq!(decompress(&packed, &o).unwrap(), data);
}

#[test]
fn decoding_with_room_for_one_piece() {
    let o = tight_pool_options(3 * 64 * KB);
    let data = text(400 * KB);
    let packed = compress(&data, &o).unwrap();

    // Same stream, a pool that holds a single decoded piece.
    let decode = tight_pool_options(64 * KB);
    let mut r = ParallelReader::with_output_cap(&packed[..], &decode, 1).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 1000];
    loop {
        let n = r.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    assert_eq!(out, data);
    assert_eq!(decode.parallel_manager().unwrap().unwrap().buffers().in_use(), 0);
}

#[test]
fn slow_consumer_with_tight_pool() {
    let o = tight_pool_options(2 * 64 * KB);
    let data = text(500 * KB);
    let packed = compress(&data, &tight_pool_options(4 << 20)).unwrap();

    let mut r = ParallelReader::new(&packed[..], &o).unwrap();
    let mut out = Vec::new();
    let mut buf = vec![0u8; 20 * KB];
    loop {
        let n = r.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
        // Let the workers run ahead and fill the pool.
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(out, data);
}

#[test]
fn pool_smaller_than_a_block_is_recoverable() {
    let mut o = StreamOptions::with_preset(1).unwrap();
    o.set_dict_size(64 * KB).unwrap();
    let mut p = ParallelConfig::new();
    p.set_affinity(2).unwrap();
    p.set_block_size(Some(128 * KB)).unwrap();
    p.set_buffer_pool_limit(64 * KB).unwrap();
    o.set_parallel(Some(p));

    let mut w = ParallelWriter::new(Vec::new(), &o).unwrap();
    let err: Lzma2Error = w.write(b"data").unwrap_err().into();
    assert!(err.is_recoverable());
    match err {
        Lzma2Error::ResourceExhausted { requested, available } => {
            assert_eq!(requested, 128 * KB);
            assert_eq!(available, 64 * KB);
        }
        other => panic!("unexpected error {other:?}"),
    }
    // Nothing was written and nothing was lost.
    assert!(w.get_ref().unwrap().is_empty());
}

#[test]
fn pooled_buffers_are_released() {
    let pool = BufferPool::new(1 << 20);
    let a = pool.allocate(1000).unwrap();
    let b = pool.allocate(2000).unwrap();
    assert_eq!(pool.in_use(), 3000);
    drop(a);
    std::thread::spawn(move || drop(b)).join().unwrap();
    assert_eq!(pool.in_use(), 0);
}

// ── Configuration ─────────────────────────────────────────────────────────────

#[test]
fn parallel_config_validation() {
    let mut p = ParallelConfig::new();
    assert!(matches!(p.set_affinity(0), Err(Lzma2Error::Configuration(_))));
    assert!(p.set_affinity(256).is_err());
    assert!(p.set_block_size(Some(64 * KB - 1)).is_err());
    assert!(p.set_block_size(Some((256 << 20) + 1)).is_err());
    assert!(p.set_block_size(Some(64 * KB)).is_ok());
    assert!(p.set_buffer_pool_limit(0).is_err());
}

#[test]
fn parallel_frontends_need_a_parallel_config() {
    let o = StreamOptions::new();
    assert!(matches!(
        ParallelWriter::new(Vec::new(), &o),
        Err(Lzma2Error::Configuration(_))
    ));
    assert!(matches!(
        ParallelReader::new(&[0u8][..], &o),
        Err(Lzma2Error::Configuration(_))
    ));
}

#[test]
fn stream_writer_picks_the_pipeline() {
    let o = parallel_options(1, 64 * KB, 2, 64 * KB, DictMode::Sync);
    assert!(matches!(StreamWriter::new(Vec::new(), &o).unwrap(), StreamWriter::Parallel(_)));
    let single = o.clone();
    assert!(matches!(StreamWriter::new(Vec::new(), &single).unwrap(), StreamWriter::Single(_)));
}
