//! Capture file descriptors and file-name parsing.
//!
//! Names follow `<prefix:7><code>.<YYYY-MM-DD>.qsh`, e.g.
//! `OrdLog.RIM5.2015-03-02.qsh` → code `RIM5`, date 2015-03-02.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File extension of QSH capture files.
pub const CAPTURE_EXTENSION: &str = "qsh";

const PREFIX_LEN: usize = 7;
/// `.YYYY-MM-DD.qsh`
const SUFFIX_LEN: usize = 15;
const DATE_LEN: usize = 10;
const EXTENSION_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("capture file name '{name}' is too short for <prefix><code>.<date>.qsh")]
    NameTooShort { name: String },

    #[error("capture file name '{name}' has no instrument code")]
    EmptyCode { name: String },

    #[error("capture file name '{name}' has an invalid date '{date}'")]
    InvalidDate { name: String, date: String },

    #[error("path '{}' has no UTF-8 file name", path.display())]
    NoFileName { path: PathBuf },

    #[error("cannot read capture root '{}': {source}", root.display())]
    Root {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot walk capture root '{}': {source}", root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Immutable descriptor of one capture file. Identity is the path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureFile {
    path: PathBuf,
    instrument_code: String,
    capture_date: NaiveDate,
}

impl CaptureFile {
    /// Parse the instrument code and capture date out of the file name.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, DiscoveryError> {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DiscoveryError::NoFileName { path: path.clone() })?;
        let (instrument_code, capture_date) = parse_file_name(name)?;
        Ok(Self {
            path,
            instrument_code,
            capture_date,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn instrument_code(&self) -> &str {
        &self.instrument_code
    }

    pub fn capture_date(&self) -> NaiveDate {
        self.capture_date
    }
}

/// Split a capture file name into `(instrument code, capture date)`.
pub fn parse_file_name(name: &str) -> Result<(String, NaiveDate), DiscoveryError> {
    let len = name.len();
    if len <= PREFIX_LEN + SUFFIX_LEN {
        return Err(DiscoveryError::NameTooShort { name: name.into() });
    }

    let code = name
        .get(PREFIX_LEN..len - SUFFIX_LEN)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| DiscoveryError::EmptyCode { name: name.into() })?;

    let date_start = len - EXTENSION_LEN - DATE_LEN;
    let date_str = name
        .get(date_start..len - EXTENSION_LEN)
        .ok_or_else(|| DiscoveryError::InvalidDate {
            name: name.into(),
            date: String::new(),
        })?;
    let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|_| {
        DiscoveryError::InvalidDate {
            name: name.into(),
            date: date_str.into(),
        }
    })?;

    Ok((code.to_string(), date))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_code_and_date() {
        let (code, date) = parse_file_name("OrdLog.RIM5.2015-03-02.qsh").unwrap();
        assert_eq!(code, "RIM5");
        assert_eq!(date, NaiveDate::from_ymd_opt(2015, 3, 2).unwrap());
    }

    #[test]
    fn code_may_contain_dots_and_dashes() {
        let (code, _) = parse_file_name("Quotes.Si-6.15.2015-05-18.qsh").unwrap();
        assert_eq!(code, "Si-6.15");
    }

    #[test]
    fn rejects_short_names() {
        assert!(matches!(
            parse_file_name("Deals.2015-03-02.qsh"),
            Err(DiscoveryError::NameTooShort { .. })
        ));
    }

    #[test]
    fn rejects_bad_dates() {
        let err = parse_file_name("OrdLog.RIM5.2015-13-40.qsh").unwrap_err();
        match err {
            DiscoveryError::InvalidDate { date, .. } => assert_eq!(date, "2015-13-40"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_blank_code() {
        assert!(matches!(
            parse_file_name("OrdLog.  .2015-03-02.qsh"),
            Err(DiscoveryError::EmptyCode { .. })
        ));
    }

    #[test]
    fn capture_file_keeps_full_path() {
        let file = CaptureFile::from_path("/data/2015/OrdLog.RIM5.2015-03-02.qsh").unwrap();
        assert_eq!(file.instrument_code(), "RIM5");
        assert_eq!(
            file.path(),
            Path::new("/data/2015/OrdLog.RIM5.2015-03-02.qsh")
        );
    }
}
