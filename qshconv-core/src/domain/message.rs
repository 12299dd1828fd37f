//! Canonical domain messages produced by the translator.

use chrono::DateTime;
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use super::security::SecurityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuoteLevel {
    pub price: Decimal,
    pub volume: i64,
}

/// Full order book at one instant. Bids best-first (descending), asks
/// best-first (ascending).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderBookSnapshot {
    pub security: SecurityId,
    pub time: DateTime<Tz>,
    pub bids: Vec<QuoteLevel>,
    pub asks: Vec<QuoteLevel>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeTick {
    pub security: SecurityId,
    pub time: DateTime<Tz>,
    pub trade_id: Option<i64>,
    pub price: Decimal,
    pub volume: i64,
    pub side: Option<Side>,
    pub open_interest: Option<i64>,
}

/// Order transition decoded from the order-log flag word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Lifecycle {
    Active,
    Filled,
    Cancelled,
    GroupCancelled,
    Moved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrderState {
    Active,
    Done,
}

impl OrderState {
    pub fn from_lifecycle(lifecycle: Option<Lifecycle>) -> Option<Self> {
        match lifecycle {
            Some(Lifecycle::Active) => Some(OrderState::Active),
            Some(Lifecycle::Filled | Lifecycle::Cancelled | Lifecycle::GroupCancelled) => {
                Some(OrderState::Done)
            }
            Some(Lifecycle::Moved) | None => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimeInForce {
    MatchOrCancel,
    PutInQueue,
}

/// Exchange status bit mask attached to order-log events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct OrderStatus(u32);

impl OrderStatus {
    pub const QUOTE: u32 = 0x01;
    pub const COUNTER: u32 = 0x02;
    pub const NON_SYSTEM: u32 = 0x04;
    pub const END_OF_TRANSACTION: u32 = 0x1000;
    pub const FILL_OR_KILL: u32 = 0x0008_0000;
    pub const MOVED: u32 = 0x0010_0000;
    pub const CANCELED: u32 = 0x0020_0000;
    pub const CANCELED_GROUP: u32 = 0x0040_0000;
    pub const CROSS_TRADE: u32 = 0x2000_0000;

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, bit: u32) -> bool {
        self.0 & bit == bit
    }

    pub fn insert(&mut self, bit: u32) {
        self.0 |= bit;
    }
}

impl From<u32> for OrderStatus {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderLogEvent {
    pub security: SecurityId,
    pub time: DateTime<Tz>,
    /// Strictly increasing within one file and security.
    pub transaction_id: i64,
    pub order_id: i64,
    pub price: Decimal,
    pub volume: i64,
    pub balance: i64,
    pub side: Option<Side>,
    pub lifecycle: Option<Lifecycle>,
    pub order_state: Option<OrderState>,
    pub time_in_force: Option<TimeInForce>,
    pub status: OrderStatus,
    pub is_system: bool,
    pub trade_id: Option<i64>,
    pub trade_price: Option<Decimal>,
    pub open_interest: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Level1Field {
    LastTradePrice,
    BidsVolume,
    AsksVolume,
    HighPrice,
    LowPrice,
    OpenInterest,
}

impl Level1Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Level1Field::LastTradePrice => "last_trade_price",
            Level1Field::BidsVolume => "bids_volume",
            Level1Field::AsksVolume => "asks_volume",
            Level1Field::HighPrice => "high_price",
            Level1Field::LowPrice => "low_price",
            Level1Field::OpenInterest => "open_interest",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Level1Update {
    pub security: SecurityId,
    pub time: DateTime<Tz>,
    pub changes: BTreeMap<Level1Field, Decimal>,
}

impl Level1Update {
    pub fn new(security: SecurityId, time: DateTime<Tz>) -> Self {
        Self {
            security,
            time,
            changes: BTreeMap::new(),
        }
    }

    /// Record `value` for `field` unless it is zero (zero means "not reported").
    pub fn try_add(&mut self, field: Level1Field, value: Decimal) -> &mut Self {
        if !value.is_zero() {
            self.changes.insert(field, value);
        }
        self
    }

    pub fn get(&self, field: Level1Field) -> Option<Decimal> {
        self.changes.get(&field).copied()
    }
}

/// Message kinds, also the unit of buffering and sink partitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum MessageKind {
    OrderBook,
    Trades,
    OrderLog,
    Level1,
}

impl MessageKind {
    pub const ALL: [MessageKind; 4] = [
        MessageKind::OrderBook,
        MessageKind::Trades,
        MessageKind::OrderLog,
        MessageKind::Level1,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::OrderBook => "order_book",
            MessageKind::Trades => "trades",
            MessageKind::OrderLog => "order_log",
            MessageKind::Level1 => "level1",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DomainMessage {
    OrderBook(OrderBookSnapshot),
    Trade(TradeTick),
    OrderLog(OrderLogEvent),
    Level1(Level1Update),
}

impl DomainMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            DomainMessage::OrderBook(_) => MessageKind::OrderBook,
            DomainMessage::Trade(_) => MessageKind::Trades,
            DomainMessage::OrderLog(_) => MessageKind::OrderLog,
            DomainMessage::Level1(_) => MessageKind::Level1,
        }
    }

    pub fn security(&self) -> &SecurityId {
        match self {
            DomainMessage::OrderBook(m) => &m.security,
            DomainMessage::Trade(m) => &m.security,
            DomainMessage::OrderLog(m) => &m.security,
            DomainMessage::Level1(m) => &m.security,
        }
    }

    pub fn time(&self) -> &DateTime<Tz> {
        match self {
            DomainMessage::OrderBook(m) => &m.time,
            DomainMessage::Trade(m) => &m.time,
            DomainMessage::OrderLog(m) => &m.time,
            DomainMessage::Level1(m) => &m.time,
        }
    }
}

impl From<OrderBookSnapshot> for DomainMessage {
    fn from(m: OrderBookSnapshot) -> Self {
        DomainMessage::OrderBook(m)
    }
}

impl From<TradeTick> for DomainMessage {
    fn from(m: TradeTick) -> Self {
        DomainMessage::Trade(m)
    }
}

impl From<OrderLogEvent> for DomainMessage {
    fn from(m: OrderLogEvent) -> Self {
        DomainMessage::OrderLog(m)
    }
}

impl From<Level1Update> for DomainMessage {
    fn from(m: Level1Update) -> Self {
        DomainMessage::Level1(m)
    }
}

/// A homogeneous run of messages for one security, handed to a sink by value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MessageBatch {
    OrderBook(Vec<OrderBookSnapshot>),
    Trades(Vec<TradeTick>),
    OrderLog(Vec<OrderLogEvent>),
    Level1(Vec<Level1Update>),
}

impl MessageBatch {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBatch::OrderBook(_) => MessageKind::OrderBook,
            MessageBatch::Trades(_) => MessageKind::Trades,
            MessageBatch::OrderLog(_) => MessageKind::OrderLog,
            MessageBatch::Level1(_) => MessageKind::Level1,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            MessageBatch::OrderBook(v) => v.len(),
            MessageBatch::Trades(v) => v.len(),
            MessageBatch::OrderLog(v) => v.len(),
            MessageBatch::Level1(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Timestamps in batch order.
    pub fn times(&self) -> Vec<DateTime<Tz>> {
        match self {
            MessageBatch::OrderBook(v) => v.iter().map(|m| m.time).collect(),
            MessageBatch::Trades(v) => v.iter().map(|m| m.time).collect(),
            MessageBatch::OrderLog(v) => v.iter().map(|m| m.time).collect(),
            MessageBatch::Level1(v) => v.iter().map(|m| m.time).collect(),
        }
    }

    pub fn first_time(&self) -> Option<DateTime<Tz>> {
        match self {
            MessageBatch::OrderBook(v) => v.first().map(|m| m.time),
            MessageBatch::Trades(v) => v.first().map(|m| m.time),
            MessageBatch::OrderLog(v) => v.first().map(|m| m.time),
            MessageBatch::Level1(v) => v.first().map(|m| m.time),
        }
    }
}
