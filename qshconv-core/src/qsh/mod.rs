//! QSH v4 capture format: decoder, encoder and raw record types.

pub mod error;
mod input;
pub mod raw;
pub mod reader;
pub mod security;
pub mod stream;
pub mod varint;
pub mod writer;

pub use error::{FormatError, ReadError, SubscribeError};
pub use raw::{
    DealSide, OrdLogFlags, QuoteKind, RawAuxInfo, RawDeal, RawOrdLog, RawQuote, RawQuotes,
    RawRecord,
};
pub use reader::{QshHeader, QshReader, ReadOutcome};
pub use security::QshSecurity;
pub use stream::{StreamInfo, StreamKind};
pub use writer::QshWriter;
