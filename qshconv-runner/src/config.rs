//! Conversion run configuration, loaded from TOML.
//!
//! Every field except the two roots has a default:
//!
//! ```toml
//! source_dir = "/data/qsh"
//! dest_dir = "/data/out"
//! format = "parquet"          # parquet | csv
//! workers = 4
//! instrument_filter = "RI*"   # exact code or prefix*
//! board = "FORTS"
//! time_zone = "Europe/Moscow"
//! batch_size = 1000
//! ledger_path = "qshconv_converted_files.txt"
//! wait_backoff_ms = 10
//! ```

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use qshconv_core::domain::DEFAULT_BOARD;
use qshconv_core::ledger::DEFAULT_LEDGER_FILE;
use qshconv_core::scheduler::InstrumentFilter;
use qshconv_core::sink::StorageFormat;
use qshconv_core::writer::DEFAULT_BATCH_SIZE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConvertConfig {
    /// Root scanned recursively for `*.qsh` captures.
    pub source_dir: PathBuf,

    /// Root the file sinks write under.
    pub dest_dir: PathBuf,

    #[serde(default)]
    pub format: StorageFormat,

    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Exact instrument code, or `PREFIX*`.
    #[serde(default)]
    pub instrument_filter: Option<String>,

    /// Board appended to instrument codes in security ids.
    #[serde(default = "default_board")]
    pub board: String,

    /// Zone the capture timestamps were recorded in.
    #[serde(default = "default_time_zone")]
    pub time_zone: Tz,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    /// Sleep between claims while every pending file's instrument is busy.
    #[serde(default = "default_wait_backoff_ms")]
    pub wait_backoff_ms: u64,
}

fn default_workers() -> usize {
    4
}

fn default_board() -> String {
    DEFAULT_BOARD.to_string()
}

fn default_time_zone() -> Tz {
    chrono_tz::Europe::Moscow
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from(DEFAULT_LEDGER_FILE)
}

fn default_wait_backoff_ms() -> u64 {
    10
}

impl ConvertConfig {
    /// Config with defaults for everything but the roots.
    pub fn new(source_dir: impl Into<PathBuf>, dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            dest_dir: dest_dir.into(),
            format: StorageFormat::default(),
            workers: default_workers(),
            instrument_filter: None,
            board: default_board(),
            time_zone: default_time_zone(),
            batch_size: default_batch_size(),
            ledger_path: default_ledger_path(),
            wait_backoff_ms: default_wait_backoff_ms(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("source_dir is empty".into()));
        }
        if self.dest_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("dest_dir is empty".into()));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.board.is_empty() || self.board.contains('@') {
            return Err(ConfigError::Invalid(format!(
                "board '{}' must be non-empty and contain no '@'",
                self.board
            )));
        }
        Ok(())
    }

    pub fn filter(&self) -> InstrumentFilter {
        match &self.instrument_filter {
            Some(pattern) => match pattern.parse() {
                Ok(filter) => filter,
                Err(never) => match never {},
            },
            None => InstrumentFilter::Any,
        }
    }

    pub fn wait_backoff(&self) -> Duration {
        Duration::from_millis(self.wait_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_takes_defaults() {
        let config = ConvertConfig::from_toml(
            r#"
            source_dir = "/data/qsh"
            dest_dir = "/data/out"
            "#,
        )
        .unwrap();
        assert_eq!(config, ConvertConfig::new("/data/qsh", "/data/out"));
        assert_eq!(config.format, StorageFormat::Parquet);
        assert_eq!(config.time_zone, chrono_tz::Europe::Moscow);
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.wait_backoff(), Duration::from_millis(10));
        assert_eq!(config.filter(), InstrumentFilter::Any);
    }

    #[test]
    fn full_config_parses() {
        let config = ConvertConfig::from_toml(
            r#"
            source_dir = "/data/qsh"
            dest_dir = "/data/out"
            format = "csv"
            workers = 2
            instrument_filter = "RI*"
            board = "SPBFUT"
            time_zone = "UTC"
            batch_size = 250
            ledger_path = "/var/lib/qshconv/ledger.txt"
            wait_backoff_ms = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.format, StorageFormat::Csv);
        assert_eq!(config.workers, 2);
        assert_eq!(config.filter(), InstrumentFilter::Prefix("RI".into()));
        assert_eq!(config.board, "SPBFUT");
        assert_eq!(config.time_zone, chrono_tz::UTC);
        assert_eq!(config.ledger_path, PathBuf::from("/var/lib/qshconv/ledger.txt"));
    }

    #[test]
    fn missing_root_is_a_parse_error() {
        let err = ConvertConfig::from_toml(r#"dest_dir = "/out""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ConvertConfig::from_toml(
            r#"
            source_dir = "/a"
            dest_dir = "/b"
            threads = 3
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_workers_is_invalid() {
        let mut config = ConvertConfig::new("/a", "/b");
        config.workers = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn bad_time_zone_is_rejected() {
        let err = ConvertConfig::from_toml(
            r#"
            source_dir = "/a"
            dest_dir = "/b"
            time_zone = "Mars/Olympus"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
