//! Sub-stream kinds and their per-stream decode state.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use super::error::FormatError;
use super::input::DataReader;
use super::raw::{DealSide, OrdLogFlags, QuoteKind, RawAuxInfo, RawDeal, RawOrdLog, RawQuote, RawQuotes};
use super::security::QshSecurity;
use crate::domain::NativeTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StreamKind {
    None,
    /// Order book.
    Stock,
    /// Anonymous exchange trades.
    Deals,
    /// Own orders.
    Orders,
    /// Own trades.
    Trades,
    Messages,
    /// Aggregate level1 values.
    AuxInfo,
    OrdLog,
}

impl StreamKind {
    pub fn from_code(code: u8) -> Result<Self, FormatError> {
        Ok(match code {
            0x00 => StreamKind::None,
            0x10 => StreamKind::Stock,
            0x20 => StreamKind::Deals,
            0x30 => StreamKind::Orders,
            0x40 => StreamKind::Trades,
            0x50 => StreamKind::Messages,
            0x60 => StreamKind::AuxInfo,
            0x70 => StreamKind::OrdLog,
            other => return Err(FormatError::UnknownStreamType(other)),
        })
    }

    pub fn code(self) -> u8 {
        match self {
            StreamKind::None => 0x00,
            StreamKind::Stock => 0x10,
            StreamKind::Deals => 0x20,
            StreamKind::Orders => 0x30,
            StreamKind::Trades => 0x40,
            StreamKind::Messages => 0x50,
            StreamKind::AuxInfo => 0x60,
            StreamKind::OrdLog => 0x70,
        }
    }

    /// Whether the stream header carries a security descriptor.
    pub fn has_security(self) -> bool {
        !matches!(self, StreamKind::Messages | StreamKind::None)
    }

    /// Whether the converter turns this stream into domain messages.
    pub fn is_supported(self) -> bool {
        matches!(
            self,
            StreamKind::Stock | StreamKind::Deals | StreamKind::OrdLog | StreamKind::AuxInfo
        )
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamKind::None => "None",
            StreamKind::Stock => "Stock",
            StreamKind::Deals => "Deals",
            StreamKind::Orders => "Orders",
            StreamKind::Trades => "Trades",
            StreamKind::Messages => "Messages",
            StreamKind::AuxInfo => "AuxInfo",
            StreamKind::OrdLog => "OrdLog",
        };
        f.write_str(name)
    }
}

/// One sub-stream as declared in the file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub kind: StreamKind,
    pub security: Option<QshSecurity>,
}

// ── Payload bit masks ───────────────────────────────────────────────

pub(crate) mod deal_flags {
    pub const SIDE_MASK: u8 = 0x03;
    pub const TIME: u8 = 0x04;
    pub const ID: u8 = 0x08;
    pub const ORDER_ID: u8 = 0x10;
    pub const PRICE: u8 = 0x20;
    pub const VOLUME: u8 = 0x40;
    pub const OPEN_INTEREST: u8 = 0x80;
}

pub(crate) mod ordlog_flags {
    pub const TIME: u8 = 0x01;
    pub const ORDER_ID: u8 = 0x02;
    pub const PRICE: u8 = 0x04;
    pub const AMOUNT: u8 = 0x08;
    pub const AMOUNT_REST: u8 = 0x10;
    pub const DEAL_ID: u8 = 0x20;
    pub const DEAL_PRICE: u8 = 0x40;
    pub const OPEN_INTEREST: u8 = 0x80;
}

pub(crate) mod aux_flags {
    pub const TIME: u8 = 0x01;
    pub const ASK_TOTAL: u8 = 0x02;
    pub const BID_TOTAL: u8 = 0x04;
    pub const OPEN_INTEREST: u8 = 0x08;
    pub const PRICE: u8 = 0x10;
    pub const SESSION: u8 = 0x20;
    pub const RATE: u8 = 0x40;
    pub const MESSAGE: u8 = 0x80;
}

pub(crate) mod order_flags {
    pub const DROP_ALL: u8 = 0x01;
}

/// Record time base shared by the timed streams.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RecordClock {
    last_ms: i64,
    set: bool,
}

impl RecordClock {
    pub fn new(base_ms: i64) -> Self {
        Self {
            last_ms: base_ms,
            set: false,
        }
    }

    pub fn advance(&mut self, ms: i64) {
        self.last_ms = ms;
        self.set = true;
    }

    /// Latest record time, or the frame time when the stream never sent one.
    pub fn time(&self, frame: NativeTime) -> NativeTime {
        if self.set {
            NativeTime::from_millis(self.last_ms)
        } else {
            frame
        }
    }

    pub fn read(&mut self, input: &mut DataReader<'_>, context: &'static str) -> Result<(), FormatError> {
        let ms = input.read_growing(self.last_ms, context)?;
        self.advance(ms);
        Ok(())
    }
}

// ── Stock ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub(crate) struct StockState {
    last_price: i64,
    /// Price → signed volume; positive asks, negative bids.
    book: BTreeMap<i64, i64>,
}

impl StockState {
    pub fn decode(&mut self, input: &mut DataReader<'_>, frame: NativeTime) -> Result<RawQuotes, FormatError> {
        let count = input.read_uleb128("quote count")?;
        for _ in 0..count {
            self.last_price = input.read_relative(self.last_price, "quote price")?;
            let volume = input.read_leb128("quote volume")?;
            if volume == 0 {
                self.book.remove(&self.last_price);
            } else {
                self.book.insert(self.last_price, volume);
            }
        }
        Ok(RawQuotes {
            time: frame,
            levels: self.snapshot(),
        })
    }

    fn snapshot(&self) -> Vec<RawQuote> {
        let best_ask = self
            .book
            .iter()
            .find(|(_, v)| **v > 0)
            .map(|(p, _)| *p);

        let mut levels = Vec::with_capacity(self.book.len());
        let mut best_bid_seen = false;
        for (&price, &volume) in self.book.iter().rev() {
            let kind = if volume > 0 {
                if Some(price) == best_ask {
                    QuoteKind::BestAsk
                } else {
                    QuoteKind::Ask
                }
            } else if best_ask.is_some_and(|ask| price >= ask) {
                QuoteKind::Spread
            } else if !best_bid_seen {
                best_bid_seen = true;
                QuoteKind::BestBid
            } else {
                QuoteKind::Bid
            };
            levels.push(RawQuote {
                kind,
                price,
                volume: volume.abs(),
            });
        }
        levels
    }
}

// ── Deals ───────────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct DealsState {
    clock: RecordClock,
    id: i64,
    order_id: i64,
    price: i64,
    volume: i64,
    open_interest: i64,
}

impl DealsState {
    pub fn new(base_ms: i64) -> Self {
        Self {
            clock: RecordClock::new(base_ms),
            id: 0,
            order_id: 0,
            price: 0,
            volume: 0,
            open_interest: 0,
        }
    }

    pub fn decode(&mut self, input: &mut DataReader<'_>, frame: NativeTime) -> Result<RawDeal, FormatError> {
        use self::deal_flags::*;

        let flags = input.read_u8("deal flags")?;
        let side = match flags & SIDE_MASK {
            0 => DealSide::Unknown,
            1 => DealSide::Buy,
            2 => DealSide::Sell,
            bits => return Err(FormatError::InvalidDealSide(bits)),
        };
        if flags & TIME != 0 {
            self.clock.read(input, "deal time")?;
        }
        if flags & ID != 0 {
            self.id = input.read_growing(self.id, "deal id")?;
        }
        if flags & ORDER_ID != 0 {
            self.order_id = input.read_relative(self.order_id, "deal order id")?;
        }
        if flags & PRICE != 0 {
            self.price = input.read_relative(self.price, "deal price")?;
        }
        if flags & VOLUME != 0 {
            self.volume = input.read_leb128("deal volume")?;
        }
        if flags & OPEN_INTEREST != 0 {
            self.open_interest = input.read_relative(self.open_interest, "deal open interest")?;
        }
        Ok(RawDeal {
            time: self.clock.time(frame),
            side,
            id: self.id,
            order_id: self.order_id,
            price: self.price,
            volume: self.volume,
            open_interest: self.open_interest,
        })
    }
}

// ── OrdLog ──────────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct OrdLogState {
    clock: RecordClock,
    added_order_id: i64,
    order_id: i64,
    price: i64,
    amount: i64,
    amount_rest: i64,
    deal_id: i64,
    deal_price: i64,
    open_interest: i64,
}

impl OrdLogState {
    pub fn new(base_ms: i64) -> Self {
        Self {
            clock: RecordClock::new(base_ms),
            added_order_id: 0,
            order_id: 0,
            price: 0,
            amount: 0,
            amount_rest: 0,
            deal_id: 0,
            deal_price: 0,
            open_interest: 0,
        }
    }

    pub fn decode(&mut self, input: &mut DataReader<'_>, frame: NativeTime) -> Result<RawOrdLog, FormatError> {
        use self::ordlog_flags::*;

        let entry = input.read_u8("order log entry flags")?;
        let flags = OrdLogFlags::from_bits(input.read_u16("order log flag word")?);

        if entry & TIME != 0 {
            self.clock.read(input, "order log time")?;
        }
        if entry & ORDER_ID != 0 {
            if flags.contains(OrdLogFlags::ADD) {
                self.added_order_id = input.read_growing(self.added_order_id, "order id")?;
                self.order_id = self.added_order_id;
            } else {
                self.order_id = input.read_relative(self.added_order_id, "order id")?;
            }
        }
        if entry & PRICE != 0 {
            self.price = input.read_relative(self.price, "order price")?;
        }
        if entry & AMOUNT != 0 {
            self.amount = input.read_leb128("order amount")?;
        }
        if entry & AMOUNT_REST != 0 {
            self.amount_rest = input.read_leb128("order amount rest")?;
        }
        if entry & DEAL_ID != 0 {
            self.deal_id = input.read_growing(self.deal_id, "order deal id")?;
        }
        if entry & DEAL_PRICE != 0 {
            self.deal_price = input.read_relative(self.deal_price, "order deal price")?;
        }
        if entry & OPEN_INTEREST != 0 {
            self.open_interest = input.read_relative(self.open_interest, "order open interest")?;
        }

        let filled = flags.contains(OrdLogFlags::FILL);
        Ok(RawOrdLog {
            time: self.clock.time(frame),
            flags,
            order_id: self.order_id,
            price: self.price,
            amount: self.amount,
            amount_rest: self.amount_rest,
            deal_id: if filled { self.deal_id } else { 0 },
            deal_price: if filled { self.deal_price } else { 0 },
            open_interest: self.open_interest,
        })
    }
}

// ── AuxInfo ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct AuxInfoState {
    clock: RecordClock,
    price: i64,
    ask_total: i64,
    bid_total: i64,
    open_interest: i64,
    hi_limit: i64,
    lo_limit: i64,
    deposit: f64,
    rate: f64,
}

impl AuxInfoState {
    pub fn new(base_ms: i64) -> Self {
        Self {
            clock: RecordClock::new(base_ms),
            price: 0,
            ask_total: 0,
            bid_total: 0,
            open_interest: 0,
            hi_limit: 0,
            lo_limit: 0,
            deposit: 0.0,
            rate: 0.0,
        }
    }

    pub fn decode(&mut self, input: &mut DataReader<'_>, frame: NativeTime) -> Result<RawAuxInfo, FormatError> {
        use self::aux_flags::*;

        let flags = input.read_u8("aux info flags")?;
        if flags & TIME != 0 {
            self.clock.read(input, "aux info time")?;
        }
        if flags & ASK_TOTAL != 0 {
            self.ask_total = input.read_relative(self.ask_total, "ask total")?;
        }
        if flags & BID_TOTAL != 0 {
            self.bid_total = input.read_relative(self.bid_total, "bid total")?;
        }
        if flags & OPEN_INTEREST != 0 {
            self.open_interest = input.read_relative(self.open_interest, "aux open interest")?;
        }
        if flags & PRICE != 0 {
            self.price = input.read_relative(self.price, "aux price")?;
        }
        if flags & SESSION != 0 {
            self.hi_limit = input.read_relative(self.hi_limit, "high limit")?;
            self.lo_limit = input.read_relative(self.lo_limit, "low limit")?;
            self.deposit = input.read_f64("deposit")?;
        }
        if flags & RATE != 0 {
            self.rate = input.read_f64("rate")?;
        }
        let message = if flags & MESSAGE != 0 {
            Some(input.read_string("aux message")?)
        } else {
            None
        };
        Ok(RawAuxInfo {
            time: self.clock.time(frame),
            price: self.price,
            ask_total: self.ask_total,
            bid_total: self.bid_total,
            open_interest: self.open_interest,
            hi_limit: self.hi_limit,
            lo_limit: self.lo_limit,
            deposit: self.deposit,
            rate: self.rate,
            message,
        })
    }
}

// ── Streams the converter skips ─────────────────────────────────────

pub(crate) fn skip_own_order(input: &mut DataReader<'_>) -> Result<(), FormatError> {
    let flags = input.read_u8("own order flags")?;
    if flags & order_flags::DROP_ALL == 0 {
        input.read_leb128("own order id")?;
        input.read_leb128("own order price")?;
        input.read_leb128("own order amount")?;
    }
    Ok(())
}

#[derive(Debug)]
pub(crate) struct OwnTradesState {
    clock: RecordClock,
    trade_id: i64,
    order_id: i64,
    price: i64,
}

impl OwnTradesState {
    pub fn new(base_ms: i64) -> Self {
        Self {
            clock: RecordClock::new(base_ms),
            trade_id: 0,
            order_id: 0,
            price: 0,
        }
    }

    pub fn skip(&mut self, input: &mut DataReader<'_>) -> Result<(), FormatError> {
        self.clock.read(input, "own trade time")?;
        self.trade_id = input.read_relative(self.trade_id, "own trade id")?;
        self.order_id = input.read_relative(self.order_id, "own trade order id")?;
        self.price = input.read_relative(self.price, "own trade price")?;
        input.read_leb128("own trade volume")?;
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct MessagesState {
    clock: RecordClock,
}

impl MessagesState {
    pub fn new(base_ms: i64) -> Self {
        Self {
            clock: RecordClock::new(base_ms),
        }
    }

    pub fn skip(&mut self, input: &mut DataReader<'_>) -> Result<(), FormatError> {
        self.clock.read(input, "message time")?;
        input.read_u8("message type")?;
        input.read_string("message text")?;
        Ok(())
    }
}
