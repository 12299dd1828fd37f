//! Output sinks.
//!
//! The converter hands each flushed batch to a [`MessageSink`]. Two file
//! sinks ship with the crate:
//! - [`ParquetSink`]: `{root}/security={ID}/{kind}/{first_ts_ns}-{hash}.parquet`
//! - [`CsvSink`]: `{root}/{ID}/{kind}.csv`, appended to across batches

mod csv_sink;
mod memory;
mod parquet_sink;
mod table;

pub use csv_sink::CsvSink;
pub use memory::MemorySink;
pub use parquet_sink::ParquetSink;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::{MessageBatch, SecurityId};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("csv error: {0}")]
    Csv(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("sink rejected batch: {0}")]
    Rejected(String),
}

impl SinkError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SinkError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Destination for converted messages. Takes ownership of each batch.
pub trait MessageSink: Send + Sync {
    fn save(&self, security: &SecurityId, batch: MessageBatch) -> Result<(), SinkError>;
}

impl<S: MessageSink + ?Sized> MessageSink for Arc<S> {
    fn save(&self, security: &SecurityId, batch: MessageBatch) -> Result<(), SinkError> {
        (**self).save(security, batch)
    }
}

/// Output format selector. Also the format half of a ledger key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageFormat {
    #[default]
    Parquet,
    Csv,
}

impl StorageFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageFormat::Parquet => "parquet",
            StorageFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for StorageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "parquet" => Ok(StorageFormat::Parquet),
            "csv" => Ok(StorageFormat::Csv),
            other => Err(format!("unknown storage format '{other}' (expected parquet or csv)")),
        }
    }
}

/// Build the file sink for `format` rooted at `root`.
pub fn open_sink(format: StorageFormat, root: impl Into<PathBuf>) -> Arc<dyn MessageSink> {
    match format {
        StorageFormat::Parquet => Arc::new(ParquetSink::new(root)),
        StorageFormat::Csv => Arc::new(CsvSink::new(root)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("Parquet".parse::<StorageFormat>(), Ok(StorageFormat::Parquet));
        assert_eq!("csv".parse::<StorageFormat>(), Ok(StorageFormat::Csv));
        assert!("bin".parse::<StorageFormat>().is_err());
    }

    #[test]
    fn format_display_matches_serde() {
        let json = serde_json::to_string(&StorageFormat::Csv).unwrap();
        assert_eq!(json, format!("\"{}\"", StorageFormat::Csv));
    }
}
