//! Append-only CSV sink: `{root}/{ID}/{kind}.csv`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::table::batch_table;
use super::{MessageSink, SinkError};
use crate::domain::{MessageBatch, MessageKind, SecurityId};

pub struct CsvSink {
    root: PathBuf,
    /// Per-file locks; appends to one path never interleave.
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl CsvSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_path(&self, security: &SecurityId, kind: MessageKind) -> PathBuf {
        self.root
            .join(security.to_string())
            .join(format!("{}.csv", kind.as_str()))
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(path.to_path_buf())
            .or_default()
            .clone()
    }
}

impl MessageSink for CsvSink {
    fn save(&self, security: &SecurityId, batch: MessageBatch) -> Result<(), SinkError> {
        if batch.is_empty() {
            return Ok(());
        }
        let table = batch_table(&batch)?;
        let path = self.file_path(security, batch.kind());
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| SinkError::io(dir, e))?;
        }

        let lock = self.lock_for(&path);
        let _guard = lock.lock();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| SinkError::io(&path, e))?;
        let is_new = file
            .metadata()
            .map_err(|e| SinkError::io(&path, e))?
            .len()
            == 0;

        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        let csv_err = |e: csv::Error| SinkError::Csv(format!("{}: {e}", path.display()));
        if is_new {
            wtr.write_record(table.header()).map_err(csv_err)?;
        }
        for row in 0..table.rows {
            wtr.write_record(table.row(row)).map_err(csv_err)?;
        }
        wtr.flush().map_err(|e| SinkError::io(&path, e))?;
        tracing::debug!(path = %path.display(), rows = table.rows, "appended csv batch");
        Ok(())
    }
}
