// End-to-end tests driving the `lzma2` binary.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

fn lzma2() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_lzma2"));
    cmd.env_remove("LZMA2_NBWORKERS");
    cmd
}

fn run(args: &[&str], dir: &Path) -> Output {
    lzma2().args(args).current_dir(dir).output().expect("spawn lzma2")
}

fn sample() -> Vec<u8> {
    let mut v = Vec::new();
    for i in 0..20_000u32 {
        writeln!(v, "line {} value {}", i, i % 97).unwrap();
    }
    v
}

#[test]
fn compress_then_decompress_file() {
    let dir = TempDir::new().unwrap();
    let data = sample();
    fs::write(dir.path().join("a.txt"), &data).unwrap();

    let out = run(&["-q", "-3", "a.txt"], dir.path());
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let packed = dir.path().join("a.txt.lzma2");
    assert!(packed.exists());
    assert!(fs::metadata(&packed).unwrap().len() < data.len() as u64);
    // Input kept by default.
    assert!(dir.path().join("a.txt").exists());

    fs::remove_file(dir.path().join("a.txt")).unwrap();
    let out = run(&["-q", "-d", "-3", "a.txt.lzma2"], dir.path());
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), data);
}

#[test]
fn refuses_to_overwrite_without_force() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("b"), b"payload").unwrap();
    fs::write(dir.path().join("b.lzma2"), b"existing").unwrap();

    let out = run(&["-q", "b"], dir.path());
    assert!(!out.status.success());
    assert_eq!(fs::read(dir.path().join("b.lzma2")).unwrap(), b"existing");

    let out = run(&["-q", "-f", "b"], dir.path());
    assert!(out.status.success());
    assert_ne!(fs::read(dir.path().join("b.lzma2")).unwrap(), b"existing");
}

#[test]
fn stdout_and_stdin_piping() {
    let dir = TempDir::new().unwrap();
    let data = sample();
    fs::write(dir.path().join("c"), &data).unwrap();

    let out = run(&["-q", "-c", "-1", "c"], dir.path());
    assert!(out.status.success());
    assert!(!dir.path().join("c.lzma2").exists());
    let packed = out.stdout;

    let mut child = lzma2()
        .args(["-q", "-d", "-1"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    let mut stdin = child.stdin.take().unwrap();
    let writer = std::thread::spawn(move || stdin.write_all(&packed).unwrap());
    let out = child.wait_with_output().unwrap();
    writer.join().unwrap();
    assert!(out.status.success());
    assert_eq!(out.stdout, data);
}

#[test]
fn parallel_threads_and_dict_modes() {
    let dir = TempDir::new().unwrap();
    let data = sample().repeat(4);
    fs::write(dir.path().join("p"), &data).unwrap();

    for mode in ["none", "sync", "async"] {
        let out = run(
            &["-q", "-f", "-1", "-T", "4", "--block-size", "64K", "--dict-mode", mode, "-c", "p"],
            dir.path(),
        );
        assert!(out.status.success(), "{mode}: {}", String::from_utf8_lossy(&out.stderr));
        fs::write(dir.path().join("p.lzma2"), &out.stdout).unwrap();

        // Single-threaded decode of a parallel stream.
        let out = run(&["-q", "-d", "-1", "-T", "1", "-c", "p.lzma2"], dir.path());
        assert!(out.status.success(), "{mode}");
        assert_eq!(out.stdout, data, "{mode}");

        let out = run(&["-q", "-d", "-1", "-T", "3", "-c", "p.lzma2"], dir.path());
        assert!(out.status.success(), "{mode}");
        assert_eq!(out.stdout, data, "{mode}");
    }
}

#[test]
fn modification_time_is_copied() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("m");
    fs::write(&src, b"mtime sample").unwrap();
    let then = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000_000);
    filetime::set_file_mtime(&src, filetime::FileTime::from_system_time(then)).unwrap();

    assert!(run(&["-q", "m"], dir.path()).status.success());
    let meta = fs::metadata(dir.path().join("m.lzma2")).unwrap();
    assert_eq!(meta.modified().unwrap(), then);
}

#[test]
fn rm_removes_input_on_success() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("r"), b"remove me").unwrap();
    assert!(run(&["-q", "--rm", "r"], dir.path()).status.success());
    assert!(!dir.path().join("r").exists());
    assert!(dir.path().join("r.lzma2").exists());
}

#[test]
fn bad_inputs_fail() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("plain.txt"), b"not compressed").unwrap();

    // Unknown suffix.
    let out = run(&["-q", "-d", "plain.txt"], dir.path());
    assert!(!out.status.success());

    // Corrupt payload; no partial output is left behind.
    fs::write(dir.path().join("junk.lzma2"), [0x05u8, 0, 0]).unwrap();
    let out = run(&["-q", "-d", "junk.lzma2"], dir.path());
    assert!(!out.status.success());
    assert!(!dir.path().join("junk").exists());

    // Missing file.
    let out = run(&["-q", "missing"], dir.path());
    assert!(!out.status.success());

    // Invalid option value.
    let out = run(&["--preset", "11"], dir.path());
    assert!(!out.status.success());
}
