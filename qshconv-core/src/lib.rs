//! qshconv core: QSH capture decoding and conversion building blocks.
//!
//! This crate contains everything below the worker pool:
//! - Domain types (capture files, securities, native timestamps, messages)
//! - QSH v4 decoder and encoder
//! - Raw record → domain message translation
//! - Batched writer and output sinks (Parquet, CSV, memory)
//! - Conversion ledger
//! - Capture discovery and the per-instrument file scheduler

pub mod domain;
pub mod ledger;
pub mod qsh;
pub mod scheduler;
pub mod sink;
pub mod translate;
pub mod writer;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything a worker shares or moves across
    /// threads is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::CaptureFile>();
        require_sync::<domain::CaptureFile>();
        require_send::<domain::DomainMessage>();
        require_sync::<domain::DomainMessage>();
        require_send::<domain::MessageBatch>();
        require_sync::<domain::MessageBatch>();

        require_send::<scheduler::FileScheduler>();
        require_sync::<scheduler::FileScheduler>();
        require_send::<ledger::ConversionLedger>();
        require_sync::<ledger::ConversionLedger>();

        require_send::<sink::ParquetSink>();
        require_sync::<sink::ParquetSink>();
        require_send::<sink::CsvSink>();
        require_sync::<sink::CsvSink>();
        require_send::<sink::MemorySink>();
        require_sync::<sink::MemorySink>();

        require_send::<translate::EventTranslator>();
        require_send::<writer::WriterStats>();
    }
}
