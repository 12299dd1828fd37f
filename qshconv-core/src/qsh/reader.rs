//! Push-style QSH v4 decoder.
//!
//! A [`QshReader`] owns the decode state of every sub-stream in one capture
//! file. Consumers register a handler per sub-stream and then drive the
//! reader one tick at a time with [`QshReader::read_next`]; handlers run
//! synchronously inside that call.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::error::{FormatError, ReadError, SubscribeError};
use super::input::DataReader;
use super::raw::{RawAuxInfo, RawDeal, RawOrdLog, RawQuotes};
use super::security::QshSecurity;
use super::stream::{
    skip_own_order, AuxInfoState, DealsState, MessagesState, OrdLogState, OwnTradesState,
    StockState, StreamInfo, StreamKind,
};
use crate::domain::NativeTime;

pub const SIGNATURE: &[u8; 19] = b"QScalp History Data";
pub const FORMAT_VERSION: u8 = 4;

type Handler<'h, T, E> = Box<dyn FnMut(T) -> Result<(), E> + 'h>;

/// File-level metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QshHeader {
    pub version: u8,
    pub app_name: String,
    pub comment: String,
    pub recorded_at: NativeTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Every frame stamped with this time has been consumed.
    Tick(NativeTime),
    EndOfFile,
}

enum Decoder<'h, E> {
    Stock(StockState, Option<Handler<'h, RawQuotes, E>>),
    Deals(DealsState, Option<Handler<'h, RawDeal, E>>),
    OrdLog(OrdLogState, Option<Handler<'h, RawOrdLog, E>>),
    AuxInfo(AuxInfoState, Option<Handler<'h, RawAuxInfo, E>>),
    Orders,
    Trades(OwnTradesState),
    Messages(MessagesState),
    Empty,
}

impl<'h, E> Decoder<'h, E> {
    fn new(kind: StreamKind, base_ms: i64) -> Self {
        match kind {
            StreamKind::Stock => Decoder::Stock(StockState::default(), None),
            StreamKind::Deals => Decoder::Deals(DealsState::new(base_ms), None),
            StreamKind::OrdLog => Decoder::OrdLog(OrdLogState::new(base_ms), None),
            StreamKind::AuxInfo => Decoder::AuxInfo(AuxInfoState::new(base_ms), None),
            StreamKind::Orders => Decoder::Orders,
            StreamKind::Trades => Decoder::Trades(OwnTradesState::new(base_ms)),
            StreamKind::Messages => Decoder::Messages(MessagesState::new(base_ms)),
            StreamKind::None => Decoder::Empty,
        }
    }

    fn read(
        &mut self,
        input: &mut DataReader<'_>,
        frame: NativeTime,
        apply_effects: bool,
    ) -> Result<(), ReadError<E>> {
        match self {
            Decoder::Stock(state, handler) => {
                let record = state.decode(input, frame)?;
                dispatch(handler, record, apply_effects)
            }
            Decoder::Deals(state, handler) => {
                let record = state.decode(input, frame)?;
                dispatch(handler, record, apply_effects)
            }
            Decoder::OrdLog(state, handler) => {
                let record = state.decode(input, frame)?;
                dispatch(handler, record, apply_effects)
            }
            Decoder::AuxInfo(state, handler) => {
                let record = state.decode(input, frame)?;
                dispatch(handler, record, apply_effects)
            }
            Decoder::Orders => Ok(skip_own_order(input)?),
            Decoder::Trades(state) => Ok(state.skip(input)?),
            Decoder::Messages(state) => Ok(state.skip(input)?),
            Decoder::Empty => Ok(()),
        }
    }
}

fn dispatch<T, E>(
    handler: &mut Option<Handler<'_, T, E>>,
    record: T,
    apply_effects: bool,
) -> Result<(), ReadError<E>> {
    match handler {
        Some(h) if apply_effects => h(record).map_err(ReadError::Handler),
        _ => Ok(()),
    }
}

/// Decoder for one capture file.
///
/// `'h` bounds the registered handlers, `E` is their error type.
pub struct QshReader<'h, E> {
    input: DataReader<'h>,
    header: QshHeader,
    streams: Vec<StreamInfo>,
    decoders: Vec<Decoder<'h, E>>,
    last_frame_ms: i64,
    /// Time of the frame whose header has been read but whose payload has not.
    pending: Option<i64>,
    frames_read: u64,
}

impl<'h, E> QshReader<'h, E> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FormatError> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(file)
    }

    /// Read the header and position the reader at the first frame.
    pub fn from_reader<R: Read + 'h>(read: R) -> Result<Self, FormatError> {
        let mut input = DataReader::new(read)?;

        let signature = input.read_bytes(SIGNATURE.len(), "signature")?;
        if signature.as_slice() != SIGNATURE {
            return Err(FormatError::BadSignature);
        }
        let version = input.read_u8("version")?;
        if version != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }
        let app_name = input.read_string("application name")?;
        let comment = input.read_string("comment")?;
        let recorded_at = NativeTime::from_ticks(input.read_i64("recording time")?);
        let stream_count = input.read_u8("stream count")?;
        if stream_count == 0 {
            return Err(FormatError::NoStreams);
        }

        let base_ms = recorded_at.millis();
        let mut streams = Vec::with_capacity(usize::from(stream_count));
        let mut decoders = Vec::with_capacity(usize::from(stream_count));
        for _ in 0..stream_count {
            let kind = StreamKind::from_code(input.read_u8("stream type")?)?;
            let security = if kind.has_security() {
                Some(input.read_string("security")?.parse::<QshSecurity>()?)
            } else {
                None
            };
            streams.push(StreamInfo { kind, security });
            decoders.push(Decoder::new(kind, base_ms));
        }

        let mut reader = Self {
            input,
            header: QshHeader {
                version,
                app_name,
                comment,
                recorded_at,
            },
            streams,
            decoders,
            last_frame_ms: base_ms,
            pending: None,
            frames_read: 0,
        };
        reader.advance_frame()?;
        Ok(reader)
    }

    pub fn header(&self) -> &QshHeader {
        &self.header
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn stream(&self, index: usize) -> Option<&StreamInfo> {
        self.streams.get(index)
    }

    pub fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    /// Time of the next pending frame, `None` once the input is exhausted.
    pub fn current_time(&self) -> Option<NativeTime> {
        self.pending.map(NativeTime::from_millis)
    }

    /// Frames decoded so far.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn on_quotes<F>(&mut self, index: usize, handler: F) -> Result<(), SubscribeError>
    where
        F: FnMut(RawQuotes) -> Result<(), E> + 'h,
    {
        match self.decoders.get_mut(index) {
            Some(Decoder::Stock(_, slot)) => {
                *slot = Some(Box::new(handler));
                Ok(())
            }
            _ => Err(self.subscribe_error(index, StreamKind::Stock)),
        }
    }

    pub fn on_deals<F>(&mut self, index: usize, handler: F) -> Result<(), SubscribeError>
    where
        F: FnMut(RawDeal) -> Result<(), E> + 'h,
    {
        match self.decoders.get_mut(index) {
            Some(Decoder::Deals(_, slot)) => {
                *slot = Some(Box::new(handler));
                Ok(())
            }
            _ => Err(self.subscribe_error(index, StreamKind::Deals)),
        }
    }

    pub fn on_ord_log<F>(&mut self, index: usize, handler: F) -> Result<(), SubscribeError>
    where
        F: FnMut(RawOrdLog) -> Result<(), E> + 'h,
    {
        match self.decoders.get_mut(index) {
            Some(Decoder::OrdLog(_, slot)) => {
                *slot = Some(Box::new(handler));
                Ok(())
            }
            _ => Err(self.subscribe_error(index, StreamKind::OrdLog)),
        }
    }

    pub fn on_aux_info<F>(&mut self, index: usize, handler: F) -> Result<(), SubscribeError>
    where
        F: FnMut(RawAuxInfo) -> Result<(), E> + 'h,
    {
        match self.decoders.get_mut(index) {
            Some(Decoder::AuxInfo(_, slot)) => {
                *slot = Some(Box::new(handler));
                Ok(())
            }
            _ => Err(self.subscribe_error(index, StreamKind::AuxInfo)),
        }
    }

    fn subscribe_error(&self, index: usize, expected: StreamKind) -> SubscribeError {
        match self.streams.get(index) {
            Some(info) => SubscribeError::WrongKind {
                index,
                expected,
                actual: info.kind,
            },
            None => SubscribeError::NoSuchStream {
                index,
                count: self.streams.len(),
            },
        }
    }

    /// Consume every frame stamped with the current time.
    ///
    /// Decode state advances either way; handlers only run when
    /// `apply_effects` is set.
    pub fn read_next(&mut self, apply_effects: bool) -> Result<ReadOutcome, ReadError<E>> {
        let Some(tick) = self.pending else {
            return Ok(ReadOutcome::EndOfFile);
        };
        let frame_time = NativeTime::from_millis(tick);
        loop {
            self.read_payload(frame_time, apply_effects)?;
            self.advance_frame()?;
            if self.pending != Some(tick) {
                break;
            }
        }
        Ok(ReadOutcome::Tick(frame_time))
    }

    fn read_payload(&mut self, frame: NativeTime, apply_effects: bool) -> Result<(), ReadError<E>> {
        let index = if self.decoders.len() > 1 {
            let raw = self.input.read_u8("stream index")?;
            let index = usize::from(raw);
            if index >= self.decoders.len() {
                return Err(FormatError::StreamIndex {
                    index: raw,
                    count: self.decoders.len(),
                }
                .into());
            }
            index
        } else {
            0
        };
        self.decoders[index].read(&mut self.input, frame, apply_effects)?;
        self.frames_read += 1;
        Ok(())
    }

    /// Read the next frame's time, or note EOF when the input ends on a frame boundary.
    fn advance_frame(&mut self) -> Result<(), FormatError> {
        if self.input.at_eof()? {
            self.pending = None;
            return Ok(());
        }
        let ms = self.input.read_growing(self.last_frame_ms, "frame time")?;
        self.last_frame_ms = ms;
        self.pending = Some(ms);
        Ok(())
    }
}
