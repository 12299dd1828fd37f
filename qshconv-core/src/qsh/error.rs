use std::io;
use thiserror::Error;

use super::stream::StreamKind;

/// Malformed or unsupported capture layout. Fatal to the file being read.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("not a QSH capture: bad signature")]
    BadSignature,

    #[error("unsupported QSH version {0} (only 4 is supported)")]
    UnsupportedVersion(u8),

    #[error("unexpected end of data reading {context} at offset {offset}")]
    Truncated { context: &'static str, offset: u64 },

    #[error("varint longer than 10 bytes at offset {offset}")]
    VarintOverflow { offset: u64 },

    #[error("{0} overflows a 64-bit integer")]
    ValueOverflow(&'static str),

    #[error("invalid UTF-8 string at offset {offset}")]
    InvalidString { offset: u64 },

    #[error("unknown stream type 0x{0:02x}")]
    UnknownStreamType(u8),

    #[error("frame addresses stream {index} but the file has {count}")]
    StreamIndex { index: u8, count: usize },

    #[error("invalid security descriptor '{0}'")]
    InvalidSecurity(String),

    #[error("invalid deal side bits {0:#04b}")]
    InvalidDealSide(u8),

    #[error("capture declares no streams")]
    NoStreams,
}

/// Handler registration against the wrong sub-stream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubscribeError {
    #[error("no stream {index} (file has {count})")]
    NoSuchStream { index: usize, count: usize },

    #[error("stream {index} is {actual}, not {expected}")]
    WrongKind {
        index: usize,
        expected: StreamKind,
        actual: StreamKind,
    },
}

/// Failure while driving [`QshReader::read_next`](super::QshReader::read_next).
#[derive(Debug, Error)]
pub enum ReadError<E> {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("record handler failed: {0}")]
    Handler(E),
}
