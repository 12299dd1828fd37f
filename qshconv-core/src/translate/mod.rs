//! Raw QSH records → canonical domain messages.
//!
//! One [`EventTranslator`] lives per open capture file: it owns the
//! per-security transaction id generators, so ids restart with each file.

mod flags;
mod txid;

pub use flags::{decode_flags, DecodedFlags};
pub use txid::TransactionIdGen;

use chrono::DateTime;
use chrono_tz::Tz;
use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;

use crate::domain::{
    DomainMessage, Level1Field, Level1Update, NativeTime, OrderBookSnapshot, OrderLogEvent,
    OrderState, QuoteLevel, SecurityId, SecurityInfo, Side, TradeTick,
};
use crate::qsh::{DealSide, QuoteKind, RawAuxInfo, RawDeal, RawOrdLog, RawQuotes, RawRecord};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranslateError {
    #[error("{security}: quote level at {price} is crossed (bid at or above best ask)")]
    UnsupportedQuote { security: SecurityId, price: i64 },

    #[error("order-log flag word {flags:#06x} has both Buy and Sell set")]
    ConflictingSide { flags: u16 },

    #[error("time {0} cannot be represented")]
    TimeOutOfRange(NativeTime),

    #[error("{security}: price of {ticks} ticks overflows the decimal range")]
    PriceOverflow { security: SecurityId, ticks: i64 },
}

#[derive(Debug)]
pub struct EventTranslator {
    zone: Tz,
    txids: HashMap<SecurityId, TransactionIdGen>,
}

impl EventTranslator {
    pub fn new(zone: Tz) -> Self {
        Self {
            zone,
            txids: HashMap::new(),
        }
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    pub fn translate(
        &mut self,
        security: &SecurityInfo,
        record: &RawRecord,
    ) -> Result<DomainMessage, TranslateError> {
        Ok(match record {
            RawRecord::Quotes(r) => DomainMessage::OrderBook(self.quotes(security, r)?),
            RawRecord::Deal(r) => DomainMessage::Trade(self.deal(security, r)?),
            RawRecord::OrdLog(r) => DomainMessage::OrderLog(self.ord_log(security, r)?),
            RawRecord::AuxInfo(r) => DomainMessage::Level1(self.aux_info(security, r)?),
        })
    }

    fn localize(&self, time: NativeTime) -> Result<DateTime<Tz>, TranslateError> {
        time.localize(self.zone)
            .ok_or(TranslateError::TimeOutOfRange(time))
    }

    pub fn quotes(
        &self,
        security: &SecurityInfo,
        raw: &RawQuotes,
    ) -> Result<OrderBookSnapshot, TranslateError> {
        let mut bids = Vec::new();
        let mut asks = Vec::new();
        for level in &raw.levels {
            let quote = QuoteLevel {
                price: price(security, level.price)?,
                volume: level.volume,
            };
            match level.kind {
                QuoteKind::Ask | QuoteKind::BestAsk => asks.push(quote),
                QuoteKind::Bid | QuoteKind::BestBid => bids.push(quote),
                QuoteKind::Spread => {
                    return Err(TranslateError::UnsupportedQuote {
                        security: security.id.clone(),
                        price: level.price,
                    })
                }
            }
        }
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));

        Ok(OrderBookSnapshot {
            security: security.id.clone(),
            time: self.localize(raw.time)?,
            bids,
            asks,
        })
    }

    pub fn deal(&self, security: &SecurityInfo, raw: &RawDeal) -> Result<TradeTick, TranslateError> {
        Ok(TradeTick {
            security: security.id.clone(),
            time: self.localize(raw.time)?,
            trade_id: non_zero(raw.id),
            price: price(security, raw.price)?,
            volume: raw.volume,
            side: match raw.side {
                DealSide::Buy => Some(Side::Buy),
                DealSide::Sell => Some(Side::Sell),
                DealSide::Unknown => None,
            },
            open_interest: non_zero(raw.open_interest),
        })
    }

    pub fn ord_log(
        &mut self,
        security: &SecurityInfo,
        raw: &RawOrdLog,
    ) -> Result<OrderLogEvent, TranslateError> {
        let decoded = decode_flags(raw.flags)?;
        let time = self.localize(raw.time)?;
        let transaction_id = self
            .txids
            .entry(security.id.clone())
            .or_default()
            .next(raw.time);

        Ok(OrderLogEvent {
            security: security.id.clone(),
            time,
            transaction_id,
            order_id: raw.order_id,
            price: price(security, raw.price)?,
            volume: raw.amount,
            balance: raw.amount_rest,
            side: decoded.side,
            lifecycle: decoded.lifecycle,
            order_state: OrderState::from_lifecycle(decoded.lifecycle),
            time_in_force: decoded.time_in_force,
            status: decoded.status,
            is_system: decoded.is_system,
            trade_id: non_zero(raw.deal_id),
            trade_price: non_zero(raw.deal_price)
                .map(|p| price(security, p))
                .transpose()?,
            open_interest: non_zero(raw.open_interest),
        })
    }

    pub fn aux_info(
        &self,
        security: &SecurityInfo,
        raw: &RawAuxInfo,
    ) -> Result<Level1Update, TranslateError> {
        let mut update = Level1Update::new(security.id.clone(), self.localize(raw.time)?);
        update
            .try_add(Level1Field::LastTradePrice, price(security, raw.price)?)
            .try_add(Level1Field::BidsVolume, raw.bid_total.into())
            .try_add(Level1Field::AsksVolume, raw.ask_total.into())
            .try_add(Level1Field::HighPrice, price(security, raw.hi_limit)?)
            .try_add(Level1Field::LowPrice, price(security, raw.lo_limit)?)
            .try_add(Level1Field::OpenInterest, raw.open_interest.into());
        Ok(update)
    }
}

fn price(security: &SecurityInfo, ticks: i64) -> Result<Decimal, TranslateError> {
    security
        .scale_price(ticks)
        .ok_or_else(|| TranslateError::PriceOverflow {
            security: security.id.clone(),
            ticks,
        })
}

fn non_zero(value: i64) -> Option<i64> {
    (value != 0).then_some(value)
}
