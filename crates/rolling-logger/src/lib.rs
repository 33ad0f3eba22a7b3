//! Rolling file logger with a circular buffer of recent lines.
//!
//! `init_logger` installs a `tracing` subscriber that writes plain-text lines
//! to `<log_dir>/<app>.log`, rotating to `<app>.1.log`, `<app>.2.log`, ... once
//! the file grows past a size limit. Records emitted through the `log` facade
//! are bridged into the same subscriber.

use std::collections::VecDeque;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::MakeWriter;

pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;
pub const DEFAULT_MAX_FILES: usize = 5;
pub const DEFAULT_RECENT_LINES: usize = 500;

static LOGGER: OnceLock<RollingFile> = OnceLock::new();

struct RollingState {
    dir: PathBuf,
    stem: String,
    file: Option<File>,
    written: u64,
    max_bytes: u64,
    max_files: usize,
    recent: VecDeque<String>,
    max_recent: usize,
}

impl RollingState {
    fn path_for(&self, generation: usize) -> PathBuf {
        if generation == 0 {
            self.dir.join(format!("{}.log", self.stem))
        } else {
            self.dir.join(format!("{}.{}.log", self.stem, generation))
        }
    }

    fn open_current(&mut self) -> io::Result<()> {
        let path = self.path_for(0);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        self.written = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    /// app.log -> app.1.log -> ... -> app.{max_files}.log (dropped)
    fn rotate(&mut self) -> io::Result<()> {
        self.file = None;
        let oldest = self.path_for(self.max_files);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for generation in (0..self.max_files).rev() {
            let from = self.path_for(generation);
            if from.exists() {
                fs::rename(&from, self.path_for(generation + 1))?;
            }
        }
        self.open_current()
    }

    fn remember(&mut self, buf: &[u8]) {
        if self.max_recent == 0 {
            return;
        }
        for line in String::from_utf8_lossy(buf).lines() {
            if line.trim().is_empty() {
                continue;
            }
            if self.recent.len() == self.max_recent {
                self.recent.pop_front();
            }
            self.recent.push_back(line.to_string());
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        if self.file.is_none() {
            self.open_current()?;
        }
        if let Some(file) = self.file.as_mut() {
            file.write_all(buf)?;
        }
        self.written += buf.len() as u64;
        self.remember(buf);
        Ok(buf.len())
    }
}

/// Cloneable handle to a size-rotated log file
#[derive(Clone)]
pub struct RollingFile {
    state: Arc<Mutex<RollingState>>,
}

impl RollingFile {
    pub fn open(dir: impl Into<PathBuf>, app_name: &str) -> io::Result<Self> {
        Self::with_limits(dir, app_name, DEFAULT_MAX_BYTES, DEFAULT_MAX_FILES, DEFAULT_RECENT_LINES)
    }

    pub fn with_limits(
        dir: impl Into<PathBuf>,
        app_name: &str,
        max_bytes: u64,
        max_files: usize,
        max_recent: usize,
    ) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let mut state = RollingState {
            dir,
            stem: file_stem(app_name),
            file: None,
            written: 0,
            max_bytes: max_bytes.max(1),
            max_files: max_files.max(1),
            recent: VecDeque::with_capacity(max_recent),
            max_recent,
        };
        state.open_current()?;
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RollingState> {
        // a panic mid-write leaves the state usable
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Path of the file currently written to
    pub fn current_path(&self) -> PathBuf {
        self.lock().path_for(0)
    }

    pub fn dir(&self) -> PathBuf {
        self.lock().dir.clone()
    }

    /// Most recent lines, oldest first
    pub fn recent_lines(&self) -> Vec<String> {
        self.lock().recent.iter().cloned().collect()
    }
}

impl Write for RollingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.lock().file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for RollingFile {
    type Writer = RollingFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Local wall-clock timestamps
struct LocalTime;

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

fn file_stem(app_name: &str) -> String {
    let stem: String = app_name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c.to_ascii_lowercase() } else { '-' })
        .collect();
    if stem.is_empty() {
        "app".to_string()
    } else {
        stem
    }
}

/// Install the global subscriber. Calling it again after a successful
/// initialization is a no-op.
pub fn init_logger(log_dir: PathBuf, app_name: &str) -> Result<(), String> {
    if LOGGER.get().is_some() {
        return Ok(());
    }

    let file = RollingFile::open(&log_dir, app_name)
        .map_err(|e| format!("Failed to open log file in {}: {}", log_dir.display(), e))?;

    tracing_subscriber::fmt()
        .with_writer(file.clone())
        .with_ansi(false)
        .with_timer(LocalTime)
        .with_max_level(tracing::Level::DEBUG)
        .try_init()
        .map_err(|e| format!("Failed to install logger: {}", e))?;

    let _ = LOGGER.set(file);
    tracing::info!("Logger started for {}", app_name);
    Ok(())
}

fn ensure_ready() -> Result<(), String> {
    if LOGGER.get().is_some() {
        Ok(())
    } else {
        Err("Logger not initialized".to_string())
    }
}

pub fn info(message: &str) -> Result<(), String> {
    ensure_ready()?;
    tracing::info!("{}", message);
    Ok(())
}

pub fn error(message: &str) -> Result<(), String> {
    ensure_ready()?;
    tracing::error!("{}", message);
    Ok(())
}

/// Recent lines of the global logger (empty before `init_logger`)
pub fn recent_lines() -> Vec<String> {
    LOGGER.get().map(RollingFile::recent_lines).unwrap_or_default()
}

/// Directory of the global log files, if initialized
pub fn log_dir() -> Option<PathBuf> {
    LOGGER.get().map(RollingFile::dir)
}

/// Whether `path` is one of the rotated generations for `app_name`
pub fn is_log_file(path: &Path, app_name: &str) -> bool {
    let stem = file_stem(app_name);
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| {
            name == format!("{}.log", stem)
                || name
                    .strip_prefix(&format!("{}.", stem))
                    .and_then(|rest| rest.strip_suffix(".log"))
                    .map_or(false, |n| n.parse::<usize>().is_ok())
        })
        .unwrap_or(false)
}
