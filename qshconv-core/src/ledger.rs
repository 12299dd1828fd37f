//! Persistent record of converted files.
//!
//! One key per line, `{format}_{path}`, lowercased so lookups ignore case.
//! Appends are flushed and synced before the key becomes visible in memory,
//! so a crash never leaves a file marked converted without its line on disk.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::sink::StorageFormat;

/// Ledger file name used when none is configured.
pub const DEFAULT_LEDGER_FILE: &str = "qshconv_converted_files.txt";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("cannot open ledger '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot append to ledger '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Ledger key for a converted file.
pub fn ledger_key(format: StorageFormat, path: &Path) -> String {
    format!("{}_{}", format, path.display()).to_lowercase()
}

struct LedgerState {
    file: File,
    keys: HashSet<String>,
}

pub struct ConversionLedger {
    path: PathBuf,
    state: Mutex<LedgerState>,
}

impl ConversionLedger {
    /// Load existing keys and open the file for appending. A missing file is
    /// an empty ledger.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let open_err = |source: io::Error| LedgerError::Open {
            path: path.clone(),
            source,
        };

        let keys = match fs::read_to_string(&path) {
            Ok(text) => text
                .lines()
                .map(str::trim_end)
                .filter(|l| !l.is_empty())
                .map(str::to_lowercase)
                .collect(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(open_err(e)),
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(open_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(open_err)?;

        tracing::debug!(path = %path.display(), entries = keys.len(), "opened ledger");
        Ok(Self {
            path,
            state: Mutex::new(LedgerState { file, keys }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, format: StorageFormat, file: &Path) -> bool {
        self.state.lock().keys.contains(&ledger_key(format, file))
    }

    /// Mark `file` converted for `format`. Recording an existing key is a no-op.
    pub fn record(&self, format: StorageFormat, file: &Path) -> Result<(), LedgerError> {
        let key = ledger_key(format, file);
        let mut state = self.state.lock();
        if state.keys.contains(&key) {
            return Ok(());
        }
        let write_err = |source: io::Error| LedgerError::Write {
            path: self.path.clone(),
            source,
        };
        writeln!(state.file, "{key}").map_err(write_err)?;
        state.file.flush().map_err(write_err)?;
        state.file.sync_data().map_err(write_err)?;
        state.keys.insert(key);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.state.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.state.lock().keys.iter().cloned().collect();
        keys.sort();
        keys
    }
}
