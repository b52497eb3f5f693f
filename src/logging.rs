//! Logging setup
//!
//! The TUI owns the terminal, so interactive sessions log to a size-capped
//! file. One-shot commands log warnings to stderr.

use color_eyre::eyre::{Context, Result};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

/// Rotate once the log grows past this size
pub const MAX_LOG_BYTES: u64 = 1_000_000;

const LOG_FILE_NAME: &str = "bullview.log";

/// A file appender that rotates logs based on size
///
/// Keeps the active file plus a single `.old` backup. The file is re-created
/// if it is deleted while the dashboard runs. Created files are `0o600` on
/// Unix since job payloads may end up in debug logs.
pub struct RotatingFileAppender {
    path: PathBuf,
    backup_path: PathBuf,
    max_size_bytes: u64,
    file: Mutex<Option<File>>,
}

impl RotatingFileAppender {
    /// Appender writing `path`, rotating to `path.old`
    pub fn new(path: impl Into<PathBuf>, max_size_bytes: u64) -> Self {
        let path = path.into();
        let mut backup = path.clone().into_os_string();
        backup.push(".old");
        Self {
            path,
            backup_path: PathBuf::from(backup),
            max_size_bytes,
            file: Mutex::new(None),
        }
    }

    fn open(path: &Path, truncate: bool) -> io::Result<File> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut options = fs::OpenOptions::new();
        options.create(true).write(true);
        if truncate {
            options.truncate(true);
        } else {
            options.append(true);
        }
        #[cfg(unix)]
        options.mode(0o600);
        options.open(path)
    }

    /// Current file, opened (or re-opened after external deletion) on demand
    fn current<'a>(&self, slot: &'a mut Option<File>) -> io::Result<&'a mut File> {
        if slot.is_none() || !self.path.exists() {
            *slot = Some(Self::open(&self.path, false)?);
        }
        slot.as_mut()
            .ok_or_else(|| io::Error::other("log file handle missing after open"))
    }

    fn rotate(&self, slot: &mut Option<File>) -> io::Result<()> {
        *slot = None;
        if self.path.exists() {
            fs::rename(&self.path, &self.backup_path)?;
        }
        *slot = Some(Self::open(&self.path, true)?);
        Ok(())
    }
}

impl Write for RotatingFileAppender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut slot = self
            .file
            .lock()
            .map_err(|e| io::Error::other(format!("Log mutex poisoned: {e}")))?;

        let size = self
            .current(&mut slot)
            .and_then(|f| f.metadata())
            .map_or(0, |m| m.len());

        if size >= self.max_size_bytes
            && let Err(e) = self.rotate(&mut slot)
        {
            eprintln!("Failed to rotate log file: {e}");
        }

        self.current(&mut slot)?.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut slot = self
            .file
            .lock()
            .map_err(|e| io::Error::other(format!("Log mutex poisoned: {e}")))?;
        match slot.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Default log location under the XDG state (or local data) directory
#[must_use]
pub fn default_log_path() -> Option<PathBuf> {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|dir| dir.join("bullview").join(LOG_FILE_NAME))
}

/// `RUST_LOG` wins; otherwise only this crate at `level`
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("bullview={level}")))
}

/// Initialize file logging for the dashboard
///
/// The returned guard must be held until exit so buffered lines are flushed.
///
/// # Errors
/// Returns an error if no log location is known or a global subscriber is already set.
pub fn init_file_logging(path: Option<PathBuf>, level: &str) -> Result<WorkerGuard> {
    let path = path.or_else(default_log_path).ok_or_else(|| {
        color_eyre::eyre::eyre!("Could not determine a log directory; pass --log-file")
    })?;

    let appender = RotatingFileAppender::new(path, MAX_LOG_BYTES);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| color_eyre::eyre::eyre!(e))
        .wrap_err("Failed to install log subscriber")?;

    Ok(guard)
}

/// Initialize stderr logging for one-shot commands
pub fn init_cli_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("warn"))
        .with_writer(io::stderr)
        .try_init();
}
