//! Worker pool that drains the file scheduler.

use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

use qshconv_core::domain::DiscoveryError;
use qshconv_core::ledger::{ConversionLedger, LedgerError};
use qshconv_core::scheduler::{discover, Claim, FileScheduler};
use qshconv_core::sink::{open_sink, MessageSink};

use crate::config::{ConfigError, ConvertConfig};
use crate::pipeline::{convert_file, FileContext, FileOutcome};
use crate::summary::RunSummary;

/// Failures that end the whole run before or instead of converting files.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("cannot start worker pool: {0}")]
    Pool(String),
}

/// Open the configured ledger and sink, then [`run`].
pub fn run_from_config(
    config: &ConvertConfig,
    cancel: Option<&AtomicBool>,
) -> Result<RunSummary, RunError> {
    let ledger = ConversionLedger::open(&config.ledger_path)?;
    let sink = open_sink(config.format, &config.dest_dir);
    run(config, sink.as_ref(), &ledger, cancel)
}

/// Convert every discovered capture with `config.workers` threads.
///
/// Per-file failures are counted in the summary and do not stop the run.
/// A worker whose conversion panics stops claiming files; the rest carry on.
pub fn run(
    config: &ConvertConfig,
    sink: &dyn MessageSink,
    ledger: &ConversionLedger,
    cancel: Option<&AtomicBool>,
) -> Result<RunSummary, RunError> {
    config.validate()?;
    let start = Instant::now();

    let discovery = discover(&config.source_dir, &config.filter())?;
    for (path, reason) in &discovery.rejected {
        tracing::warn!(path = %path.display(), %reason, "ignoring capture with unparseable name");
    }
    let scheduler = FileScheduler::from_discovery(&discovery);

    let summary = Mutex::new(RunSummary {
        files_discovered: discovery.files.len(),
        rejected: discovery
            .rejected
            .iter()
            .map(|(path, reason)| (path.clone(), reason.to_string()))
            .collect(),
        filtered_out: discovery.filtered_out,
        ..RunSummary::default()
    });

    let ctx = FileContext {
        format: config.format,
        sink,
        ledger,
        board: &config.board,
        zone: config.time_zone,
        batch_size: config.batch_size,
        cancel,
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers)
        .thread_name(|i| format!("qshconv-worker-{i}"))
        .build()
        .map_err(|e| RunError::Pool(e.to_string()))?;

    tracing::info!(
        files = discovery.files.len(),
        workers = config.workers,
        format = %config.format,
        "starting conversion"
    );

    let backoff = config.wait_backoff();
    pool.broadcast(|worker| work(worker.index(), &scheduler, &ctx, &summary, backoff));

    let mut summary = summary.into_inner();
    summary.unclaimed = scheduler.pending_len();
    summary.elapsed_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        converted = summary.converted,
        skipped = summary.skipped,
        failed = summary.failed,
        cancelled = summary.cancelled,
        unclaimed = summary.unclaimed,
        messages = summary.messages.total(),
        elapsed_ms = summary.elapsed_ms,
        "conversion finished"
    );
    Ok(summary)
}

fn work(
    worker: usize,
    scheduler: &FileScheduler,
    ctx: &FileContext<'_>,
    summary: &Mutex<RunSummary>,
    backoff: Duration,
) {
    loop {
        if ctx.cancel.is_some_and(|f| f.load(Ordering::Relaxed)) {
            tracing::debug!(worker, "cancelled");
            return;
        }
        let file = match scheduler.claim_next() {
            Claim::File(file) => file,
            Claim::Wait => {
                std::thread::sleep(backoff);
                continue;
            }
            Claim::Stop => return,
        };

        let result = panic::catch_unwind(AssertUnwindSafe(|| convert_file(&file, ctx)));
        scheduler.release(&file);

        match result {
            Ok(Ok(outcome)) => summary.lock().record_outcome(&outcome),
            Ok(Err(e)) => {
                tracing::error!(worker, path = %file.path().display(), error = %e, "conversion failed");
                summary.lock().record_failure(file.path(), e.to_string());
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(worker, path = %file.path().display(), %message, "worker panicked, stopping");
                summary
                    .lock()
                    .record_failure(file.path(), format!("panic: {message}"));
                return;
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
