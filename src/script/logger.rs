//! Per-script logger.
//!
//! Every record goes to the global `tracing` subscriber under the `script`
//! target. When file logging is enabled the record is also appended to the
//! script's own log file.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;
use tracing::Level;

use crate::Result;

/// Logger bound to one script.
pub struct ScriptLogger {
    script: String,
    min_level: Level,
    file: Mutex<Option<File>>,
    file_path: Option<PathBuf>,
}

impl ScriptLogger {
    /// A logger that only writes to the global subscriber.
    pub fn new(script: impl Into<String>, min_level: Level) -> Self {
        Self {
            script: script.into(),
            min_level,
            file: Mutex::new(None),
            file_path: None,
        }
    }

    /// A logger that also appends to `path`, creating parent folders.
    pub fn with_file(script: impl Into<String>, min_level: Level, path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            script: script.into(),
            min_level,
            file: Mutex::new(Some(file)),
            file_path: Some(path.to_path_buf()),
        })
    }

    /// Log file name for a script: its name without extension plus `.log`.
    pub fn file_name_for(script_name: &str) -> String {
        let stem = Path::new(script_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| script_name.to_string());
        format!("{stem}.log")
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn min_level(&self) -> Level {
        self.min_level
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Whether records at `level` pass the minimum level.
    pub fn is_enabled(&self, level: Level) -> bool {
        level <= self.min_level
    }

    pub fn log(&self, level: Level, message: &str) {
        if !self.is_enabled(level) {
            return;
        }
        Self::emit(&self.script, level, message);

        let mut file = self.file.lock();
        if let Some(f) = file.as_mut() {
            let line = format!(
                "[{}] [{}] {}\n",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                level,
                message
            );
            if let Err(e) = f.write_all(line.as_bytes()) {
                tracing::warn!(script = %self.script, "Failed to write script log file: {e}");
            }
        }
    }

    pub fn debug(&self, message: &str) {
        self.log(Level::DEBUG, message);
    }

    pub fn info(&self, message: &str) {
        self.log(Level::INFO, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(Level::WARN, message);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::ERROR, message);
    }

    /// Emit a record for `script` on the global subscriber.
    pub fn emit(script: &str, level: Level, message: &str) {
        if level == Level::ERROR {
            tracing::error!(target: "script", script = %script, "{message}");
        } else if level == Level::WARN {
            tracing::warn!(target: "script", script = %script, "{message}");
        } else if level == Level::INFO {
            tracing::info!(target: "script", script = %script, "{message}");
        } else if level == Level::DEBUG {
            tracing::debug!(target: "script", script = %script, "{message}");
        } else {
            tracing::trace!(target: "script", script = %script, "{message}");
        }
    }

    /// Flush and release the log file.
    pub fn close(&self) {
        if let Some(mut f) = self.file.lock().take() {
            let _ = f.flush();
        }
    }
}
