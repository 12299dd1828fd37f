//! qshconv runner: drives captures through the core pipeline.
//!
//! This crate builds on `qshconv-core` to provide:
//! - TOML run configuration with defaults and validation
//! - The single-file pipeline (decode, translate, batch, flush, ledger)
//! - A fixed-size worker pool draining the file scheduler
//! - A serializable run summary

pub mod config;
pub mod coordinator;
pub mod pipeline;
pub mod summary;

pub use config::{ConfigError, ConvertConfig};
pub use coordinator::{run, run_from_config, RunError};
pub use pipeline::{convert_file, ConvertError, FileContext, FileOutcome, FileReport};
pub use summary::{FileFailure, RunSummary};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_is_send_sync() {
        assert_send::<ConvertConfig>();
        assert_sync::<ConvertConfig>();
    }

    #[test]
    fn file_context_is_shareable_across_workers() {
        assert_sync::<FileContext<'static>>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<ConvertError>();
        assert_sync::<ConvertError>();
        assert_send::<RunError>();
        assert_sync::<RunError>();
    }

    #[test]
    fn summary_is_send_sync() {
        assert_send::<RunSummary>();
        assert_sync::<RunSummary>();
    }
}
