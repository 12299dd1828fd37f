//! Aggregated result of a conversion run.

use serde::Serialize;
use std::path::{Path, PathBuf};

use qshconv_core::writer::KindCounts;

use crate::pipeline::FileOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Captures that passed name parsing and the instrument filter.
    pub files_discovered: usize,
    /// Paths whose names could not be parsed, with the reason.
    pub rejected: Vec<(PathBuf, String)>,
    pub filtered_out: usize,
    pub converted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Files never claimed because the run was cancelled or its workers stopped.
    pub unclaimed: usize,
    pub frames: u64,
    /// Messages handed to the sink, by kind.
    pub messages: KindCounts,
    /// Failures in the order workers reported them.
    pub failures: Vec<FileFailure>,
    pub elapsed_ms: u64,
}

impl RunSummary {
    /// The run's reported error: the first per-file failure.
    pub fn first_error(&self) -> Option<&FileFailure> {
        self.failures.first()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn record_outcome(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Converted(report) => {
                self.converted += 1;
                self.frames += report.frames;
                self.messages.merge(&report.stats.flushed);
            }
            FileOutcome::Skipped => self.skipped += 1,
            FileOutcome::Cancelled(report) => {
                self.cancelled += 1;
                self.frames += report.frames;
                self.messages.merge(&report.stats.flushed);
            }
        }
    }

    pub(crate) fn record_failure(&mut self, path: &Path, error: String) {
        self.failed += 1;
        self.failures.push(FileFailure {
            path: path.to_path_buf(),
            error,
        });
    }

    /// Write the summary as pretty JSON.
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::FileReport;
    use qshconv_core::domain::MessageKind;

    fn report(order_log: u64) -> FileReport {
        let mut report = FileReport {
            frames: 10,
            ..Default::default()
        };
        report.stats.flushed.add(MessageKind::OrderLog, order_log);
        report
    }

    #[test]
    fn outcomes_accumulate() {
        let mut summary = RunSummary::default();
        summary.record_outcome(&FileOutcome::Converted(report(5)));
        summary.record_outcome(&FileOutcome::Cancelled(report(2)));
        summary.record_outcome(&FileOutcome::Skipped);

        assert_eq!(summary.converted, 1);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.frames, 20);
        assert_eq!(summary.messages.order_log, 7);
        assert!(summary.is_success());
    }

    #[test]
    fn first_failure_is_the_reported_error() {
        let mut summary = RunSummary::default();
        summary.record_failure(Path::new("a.qsh"), "truncated".into());
        summary.record_failure(Path::new("b.qsh"), "sink".into());

        assert_eq!(summary.failed, 2);
        assert!(!summary.is_success());
        assert_eq!(summary.first_error().unwrap().path, PathBuf::from("a.qsh"));
    }

    #[test]
    fn json_has_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let mut summary = RunSummary::default();
        summary.record_outcome(&FileOutcome::Converted(report(3)));
        summary.write_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["converted"], 1);
        assert_eq!(value["messages"]["order_log"], 3);
    }
}
