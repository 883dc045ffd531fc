use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use revdump_logging::dump_error;

/// Sink for per-item failures that are skipped rather than fatal.
pub trait ErrorLog: Send + Sync {
    fn log(&self, context: &str, message: &str);
}

/// Appends timestamped lines to a file, opened on first use.
pub struct FileErrorLog {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ErrorLog for FileErrorLog {
    fn log(&self, context: &str, message: &str) {
        let line = format!("{}: {}: {}\n", chrono::Utc::now().to_rfc3339(), context, message);
        let mut guard = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            match OpenOptions::new().create(true).append(true).open(&self.path) {
                Ok(file) => *guard = Some(file),
                Err(err) => {
                    dump_error!("Could not open error log {:?}: {}", self.path, err);
                    return;
                }
            }
        }
        if let Some(file) = guard.as_mut() {
            if let Err(err) = file.write_all(line.as_bytes()) {
                dump_error!("Could not write to error log {:?}: {}", self.path, err);
            }
        }
    }
}

/// Keeps entries in memory; useful when the caller reports them itself.
#[derive(Default)]
pub struct MemoryErrorLog {
    entries: Mutex<Vec<(String, String)>>,
}

impl MemoryErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ErrorLog for MemoryErrorLog {
    fn log(&self, context: &str, message: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((context.to_string(), message.to_string()));
    }
}
