//! Single-file conversion: decode, translate, buffer, flush, record.

use chrono_tz::Tz;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

use qshconv_core::domain::{CaptureFile, SecurityInfo};
use qshconv_core::ledger::{ConversionLedger, LedgerError};
use qshconv_core::qsh::{
    FormatError, QshReader, RawAuxInfo, RawDeal, RawOrdLog, RawQuotes, ReadError, ReadOutcome,
    StreamKind, SubscribeError,
};
use qshconv_core::sink::{MessageSink, SinkError, StorageFormat};
use qshconv_core::translate::{EventTranslator, TranslateError};
use qshconv_core::writer::{BatchedWriter, WriterStats};

/// Why one file failed to convert.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("{}: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    #[error("{}: {source}", path.display())]
    Translate {
        path: PathBuf,
        #[source]
        source: TranslateError,
    },

    #[error("{}: {source}", path.display())]
    Subscribe {
        path: PathBuf,
        #[source]
        source: SubscribeError,
    },

    #[error("{}: sink failed: {source}", path.display())]
    Sink {
        path: PathBuf,
        #[source]
        source: SinkError,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ConvertError {
    /// True when the capture itself is bad, as opposed to the destination.
    pub fn is_format(&self) -> bool {
        matches!(
            self,
            ConvertError::Format { .. } | ConvertError::Translate { .. }
        )
    }
}

/// Everything a worker needs to convert one file.
#[derive(Clone, Copy)]
pub struct FileContext<'a> {
    pub format: StorageFormat,
    pub sink: &'a dyn MessageSink,
    pub ledger: &'a ConversionLedger,
    pub board: &'a str,
    pub zone: Tz,
    pub batch_size: usize,
    pub cancel: Option<&'a AtomicBool>,
}

impl FileContext<'_> {
    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|f| f.load(Ordering::Relaxed))
    }
}

/// Counters for one decoded file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileReport {
    pub frames: u64,
    pub stats: WriterStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Converted(FileReport),
    /// Already in the ledger for this format.
    Skipped,
    /// Stopped at a tick boundary; what was decoded has been flushed.
    Cancelled(FileReport),
}

enum HandlerError {
    Translate(TranslateError),
    Sink(SinkError),
}

impl From<TranslateError> for HandlerError {
    fn from(e: TranslateError) -> Self {
        HandlerError::Translate(e)
    }
}

impl From<SinkError> for HandlerError {
    fn from(e: SinkError) -> Self {
        HandlerError::Sink(e)
    }
}

/// Translator and writer shared by every stream handler of one file.
struct FileState<'s> {
    translator: EventTranslator,
    writer: BatchedWriter<'s>,
}

impl FileState<'_> {
    fn quotes(&mut self, security: &SecurityInfo, raw: &RawQuotes) -> Result<(), HandlerError> {
        let book = self.translator.quotes(security, raw)?;
        Ok(self.writer.append(book.into())?)
    }

    fn deal(&mut self, security: &SecurityInfo, raw: &RawDeal) -> Result<(), HandlerError> {
        let trade = self.translator.deal(security, raw)?;
        Ok(self.writer.append(trade.into())?)
    }

    fn ord_log(&mut self, security: &SecurityInfo, raw: &RawOrdLog) -> Result<(), HandlerError> {
        let event = self.translator.ord_log(security, raw)?;
        Ok(self.writer.append(event.into())?)
    }

    fn aux_info(&mut self, security: &SecurityInfo, raw: &RawAuxInfo) -> Result<(), HandlerError> {
        let update = self.translator.aux_info(security, raw)?;
        Ok(self.writer.append(update.into())?)
    }
}

struct DecodeRun {
    frames: u64,
    cancelled: bool,
}

/// Convert one capture file.
///
/// On success the remaining buffers are flushed and the file is recorded in
/// the ledger. A cancelled file is flushed but not recorded. A bad capture
/// discards whatever was still buffered, and a sink failure abandons the
/// file; neither is recorded.
pub fn convert_file(file: &CaptureFile, ctx: &FileContext<'_>) -> Result<FileOutcome, ConvertError> {
    let path = file.path();
    if ctx.ledger.contains(ctx.format, path) {
        tracing::debug!(path = %path.display(), format = %ctx.format, "already converted");
        return Ok(FileOutcome::Skipped);
    }

    let state = RefCell::new(FileState {
        translator: EventTranslator::new(ctx.zone),
        writer: BatchedWriter::new(ctx.sink, ctx.batch_size),
    });
    let decoded = decode(path, ctx, &state);
    let FileState { mut writer, .. } = state.into_inner();

    let run = match decoded {
        Ok(run) => run,
        Err(e) if e.is_format() => {
            let dropped = writer.discard();
            tracing::warn!(path = %path.display(), error = %e, dropped, "discarded buffered messages");
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    writer.flush_all().map_err(|source| ConvertError::Sink {
        path: path.to_path_buf(),
        source,
    })?;
    let report = FileReport {
        frames: run.frames,
        stats: *writer.stats(),
    };

    if run.cancelled {
        tracing::info!(path = %path.display(), frames = report.frames, "conversion cancelled");
        return Ok(FileOutcome::Cancelled(report));
    }

    ctx.ledger.record(ctx.format, path)?;
    tracing::info!(
        path = %path.display(),
        code = file.instrument_code(),
        frames = report.frames,
        messages = report.stats.flushed.total(),
        "converted"
    );
    Ok(FileOutcome::Converted(report))
}

fn decode<'s>(
    path: &Path,
    ctx: &FileContext<'_>,
    state: &RefCell<FileState<'s>>,
) -> Result<DecodeRun, ConvertError> {
    let format_err = |source: FormatError| ConvertError::Format {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = QshReader::<HandlerError>::open(path).map_err(format_err)?;
    subscribe(&mut reader, ctx.board, state).map_err(|source| ConvertError::Subscribe {
        path: path.to_path_buf(),
        source,
    })?;

    let mut cancelled = false;
    loop {
        if ctx.cancelled() {
            cancelled = true;
            break;
        }
        match reader.read_next(true) {
            Ok(ReadOutcome::Tick(_)) => {}
            Ok(ReadOutcome::EndOfFile) => break,
            Err(ReadError::Format(source)) => return Err(format_err(source)),
            Err(ReadError::Handler(HandlerError::Translate(source))) => {
                return Err(ConvertError::Translate {
                    path: path.to_path_buf(),
                    source,
                })
            }
            Err(ReadError::Handler(HandlerError::Sink(source))) => {
                return Err(ConvertError::Sink {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }

    Ok(DecodeRun {
        frames: reader.frames_read(),
        cancelled,
    })
}

/// Register a handler for every stream that carries market data.
fn subscribe<'h, 's>(
    reader: &mut QshReader<'h, HandlerError>,
    board: &str,
    state: &'h RefCell<FileState<'s>>,
) -> Result<(), SubscribeError> {
    let streams = reader.streams().to_vec();
    for (index, info) in streams.into_iter().enumerate() {
        let Some(qsh_security) = info.security.as_ref() else {
            continue;
        };
        let security = SecurityInfo::from_qsh(qsh_security, board);
        match info.kind {
            StreamKind::Stock => {
                reader.on_quotes(index, move |raw| state.borrow_mut().quotes(&security, &raw))?
            }
            StreamKind::Deals => {
                reader.on_deals(index, move |raw| state.borrow_mut().deal(&security, &raw))?
            }
            StreamKind::OrdLog => {
                reader.on_ord_log(index, move |raw| state.borrow_mut().ord_log(&security, &raw))?
            }
            StreamKind::AuxInfo => {
                reader.on_aux_info(index, move |raw| state.borrow_mut().aux_info(&security, &raw))?
            }
            other => tracing::debug!(stream = index, kind = %other, "stream not converted"),
        }
    }
    Ok(())
}
