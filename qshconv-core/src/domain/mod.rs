//! Domain types: capture files, securities, timestamps and the messages the
//! converter emits.

pub mod capture;
pub mod message;
pub mod security;
pub mod time;

pub use capture::{CaptureFile, DiscoveryError};
pub use message::{
    DomainMessage, Level1Field, Level1Update, Lifecycle, MessageBatch, MessageKind,
    OrderBookSnapshot, OrderLogEvent, OrderState, OrderStatus, QuoteLevel, Side, TimeInForce,
    TradeTick,
};
pub use security::{SecurityId, SecurityInfo, DEFAULT_BOARD};
pub use time::NativeTime;
