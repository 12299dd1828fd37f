//! Hive-style Parquet sink.
//!
//! Layout: `{root}/security={ID}/{kind}/{first_ts_ns}-{hash}.parquet`
//!
//! The hash is blake3 over the JSON form of the batch, so saving the same
//! batch twice lands on the same file and the second save is a no-op.
//! Writes are atomic (write to .tmp, rename into place).

use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

use super::table::{batch_table, ColumnData, Table};
use super::{MessageSink, SinkError};
use crate::domain::{MessageBatch, SecurityId};

pub struct ParquetSink {
    root: PathBuf,
}

impl ParquetSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `batch` for `security` would be written.
    pub fn batch_path(
        &self,
        security: &SecurityId,
        batch: &MessageBatch,
    ) -> Result<PathBuf, SinkError> {
        let first_ns = batch
            .first_time()
            .and_then(|t| t.timestamp_nanos_opt())
            .unwrap_or(0);
        let json = serde_json::to_vec(batch).map_err(|e| SinkError::Serialize(e.to_string()))?;
        let hash = blake3::hash(&json).to_hex();
        Ok(self
            .root
            .join(format!("security={security}"))
            .join(batch.kind().as_str())
            .join(format!("{first_ns}-{}.parquet", &hash[..16])))
    }
}

impl MessageSink for ParquetSink {
    fn save(&self, security: &SecurityId, batch: MessageBatch) -> Result<(), SinkError> {
        if batch.is_empty() {
            return Ok(());
        }
        let path = self.batch_path(security, &batch)?;
        if path.exists() {
            tracing::debug!(path = %path.display(), "batch already written");
            return Ok(());
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| SinkError::io(dir, e))?;
        }

        let mut df = table_to_dataframe(&batch_table(&batch)?)?;
        write_atomic(&path, |tmp| write_parquet(&mut df, tmp))?;
        tracing::debug!(
            path = %path.display(),
            rows = df.height(),
            kind = %batch.kind(),
            "wrote parquet batch"
        );
        Ok(())
    }
}

fn table_to_dataframe(table: &Table) -> Result<DataFrame, SinkError> {
    let columns = table
        .columns
        .iter()
        .map(|(name, data)| {
            let name: PlSmallStr = (*name).into();
            match data {
                ColumnData::Int(v) => Column::new(name, v),
                ColumnData::OptInt(v) => Column::new(name, v),
                ColumnData::Text(v) => Column::new(name, v),
                ColumnData::OptText(v) => Column::new(name, v),
                ColumnData::Bool(v) => Column::new(name, v),
            }
        })
        .collect::<Vec<_>>();
    DataFrame::new(columns).map_err(|e| SinkError::Parquet(format!("dataframe creation: {e}")))
}

/// Run `write` against `{path}.tmp`, then rename into place. The temporary
/// file is removed if either step fails.
fn write_atomic<F>(path: &Path, write: F) -> Result<(), SinkError>
where
    F: FnOnce(&Path) -> Result<(), SinkError>,
{
    let tmp_path = path.with_extension("parquet.tmp");
    if let Err(e) = write(&tmp_path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        SinkError::io(path, e)
    })
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), SinkError> {
    let file = fs::File::create(path).map_err(|e| SinkError::io(path, e))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| SinkError::Parquet(format!("write {}: {e}", path.display())))?;
    Ok(())
}
