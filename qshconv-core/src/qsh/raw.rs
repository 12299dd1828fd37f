//! Decoded but uninterpreted records. Prices are integer tick counts.

use crate::domain::NativeTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuoteKind {
    Ask,
    BestAsk,
    Bid,
    BestBid,
    /// Bid at or above the best ask (crossed book).
    Spread,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawQuote {
    pub kind: QuoteKind,
    pub price: i64,
    pub volume: i64,
}

/// Whole book after one update, highest price first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawQuotes {
    pub time: NativeTime,
    pub levels: Vec<RawQuote>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DealSide {
    #[default]
    Unknown,
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawDeal {
    pub time: NativeTime,
    pub side: DealSide,
    pub id: i64,
    pub order_id: i64,
    pub price: i64,
    pub volume: i64,
    pub open_interest: i64,
}

/// Order-log flag word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct OrdLogFlags(u16);

impl OrdLogFlags {
    pub const NON_ZERO_REPL_ACT: u16 = 1 << 0;
    pub const SESS_ID_CHANGED: u16 = 1 << 1;
    pub const ADD: u16 = 1 << 2;
    pub const FILL: u16 = 1 << 3;
    pub const BUY: u16 = 1 << 4;
    pub const SELL: u16 = 1 << 5;
    pub const SNAPSHOT: u16 = 1 << 6;
    pub const QUOTE: u16 = 1 << 7;
    pub const COUNTER: u16 = 1 << 8;
    pub const NON_SYSTEM: u16 = 1 << 9;
    pub const END_OF_TRANSACTION: u16 = 1 << 10;
    pub const FILL_OR_KILL: u16 = 1 << 11;
    pub const MOVED: u16 = 1 << 12;
    pub const CANCELED: u16 = 1 << 13;
    pub const CANCELED_GROUP: u16 = 1 << 14;
    pub const CROSS_TRADE: u16 = 1 << 15;

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, flag: u16) -> bool {
        self.0 & flag == flag
    }

    pub const fn with(self, flag: u16) -> Self {
        Self(self.0 | flag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawOrdLog {
    pub time: NativeTime,
    pub flags: OrdLogFlags,
    pub order_id: i64,
    pub price: i64,
    pub amount: i64,
    pub amount_rest: i64,
    /// Zero unless `flags` carries FILL.
    pub deal_id: i64,
    /// Zero unless `flags` carries FILL.
    pub deal_price: i64,
    pub open_interest: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawAuxInfo {
    pub time: NativeTime,
    pub price: i64,
    pub ask_total: i64,
    pub bid_total: i64,
    pub open_interest: i64,
    pub hi_limit: i64,
    pub lo_limit: i64,
    pub deposit: f64,
    pub rate: f64,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    Quotes(RawQuotes),
    Deal(RawDeal),
    OrdLog(RawOrdLog),
    AuxInfo(RawAuxInfo),
}

impl RawRecord {
    pub fn time(&self) -> NativeTime {
        match self {
            RawRecord::Quotes(r) => r.time,
            RawRecord::Deal(r) => r.time,
            RawRecord::OrdLog(r) => r.time,
            RawRecord::AuxInfo(r) => r.time,
        }
    }
}
