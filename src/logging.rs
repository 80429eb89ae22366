//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events. Binaries and tests that want to
//! see them call one of the `init_*` functions once at startup. Both use
//! `RUST_LOG` when set and fall back to `hf_serverless=info,warn`.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "hf_serverless=info,warn";

/// Output encoding for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Plain,
    /// One JSON object per line.
    Json,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a global subscriber writing to stderr.
///
/// Returns `false` if a subscriber was already installed.
pub fn init_tracing(format: LogFormat) -> bool {
    install(format, io::stderr)
}

/// Install a global subscriber appending to `path`, rotating older files first.
///
/// `keep` rotated copies are retained as `<path>.1` … `<path>.<keep>`.
pub fn init_file_tracing(path: &Path, format: LogFormat, keep: u32) -> io::Result<bool> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    rotate_log_file(path, keep);

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(install(format, FlushingWriter::new(file)))
}

fn install<W>(format: LogFormat, writer: W) -> bool
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_target(true);

    let installed = match format {
        LogFormat::Plain => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    };
    if installed {
        tracing::debug!(version = env!("CARGO_PKG_VERSION"), ?format, "tracing initialised");
    }
    installed
}

/// Rotate `app.log` → `app.log.1` → … → `app.log.{keep}`; the oldest is dropped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    if keep == 0 {
        let _ = std::fs::remove_file(base_path);
        return;
    }

    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// File writer that flushes after every write so lines survive a crash.
#[derive(Clone)]
struct FlushingWriter {
    file: Arc<Mutex<File>>,
}

impl FlushingWriter {
    fn new(file: File) -> Self {
        Self {
            file: Arc::new(Mutex::new(file)),
        }
    }
}

impl Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| io::Error::other(format!("lock poisoned: {e}")))?;
        let n = f.write(buf)?;
        f.flush()?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| io::Error::other(format!("lock poisoned: {e}")))?;
        f.flush()
    }
}

impl<'a> MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_shifts_files() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("client.log");
        std::fs::write(&log, "current").unwrap();
        std::fs::write(dir.path().join("client.log.1"), "older").unwrap();
        std::fs::write(dir.path().join("client.log.2"), "oldest").unwrap();

        rotate_log_file(&log, 2);

        assert!(!log.exists());
        let one = std::fs::read_to_string(dir.path().join("client.log.1")).unwrap();
        let two = std::fs::read_to_string(dir.path().join("client.log.2")).unwrap();
        assert_eq!(one, "current");
        assert_eq!(two, "older");
    }

    #[test]
    fn test_rotate_missing_file_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("none.log");
        rotate_log_file(&log, 3);
        assert!(!log.exists());
        assert!(!dir.path().join("none.log.1").exists());
    }

    #[test]
    fn test_flushing_writer_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        let file = OpenOptions::new().create(true).append(true).open(&path).unwrap();

        let mut writer = FlushingWriter::new(file).make_writer();
        writer.write_all(b"line one\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line one\n");
    }

    #[test]
    fn test_init_file_tracing_rotates_and_writes() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("logs").join("client.log");
        std::fs::create_dir_all(log.parent().unwrap()).unwrap();
        std::fs::write(&log, "previous run\n").unwrap();

        let installed = init_file_tracing(&log, LogFormat::Json, 2).unwrap();

        let rotated = std::fs::read_to_string(dir.path().join("logs").join("client.log.1")).unwrap();
        assert_eq!(rotated, "previous run\n");
        assert!(log.exists());

        // Another test may own the global subscriber already.
        if installed {
            tracing::warn!(marker = "file-sink", "written to the log file");
            let written = std::fs::read_to_string(&log).unwrap();
            let line = written
                .lines()
                .find(|l| l.contains("file-sink"))
                .expect("event reaches the file");
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(parsed["level"], "WARN");
        } else {
            assert_eq!(std::fs::read_to_string(&log).unwrap(), "");
        }
    }

    #[test]
    fn test_init_file_tracing_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("a").join("b").join("client.log");
        init_file_tracing(&log, LogFormat::Plain, 1).unwrap();
        assert!(log.exists());
    }

    #[test]
    fn test_second_init_is_harmless() {
        init_tracing(LogFormat::Plain);
        assert!(!init_tracing(LogFormat::Json));
    }
}
