//! Flattening of message batches into named columns shared by the file sinks.

use chrono::DateTime;
use chrono_tz::Tz;

use super::SinkError;
use crate::domain::{
    Lifecycle, MessageBatch, OrderState, QuoteLevel, SecurityId, Side, TimeInForce,
};

pub(crate) enum ColumnData {
    Int(Vec<i64>),
    OptInt(Vec<Option<i64>>),
    Text(Vec<String>),
    OptText(Vec<Option<String>>),
    Bool(Vec<bool>),
}

impl ColumnData {
    fn cell(&self, row: usize) -> String {
        match self {
            ColumnData::Int(v) => v[row].to_string(),
            ColumnData::OptInt(v) => v[row].map(|x| x.to_string()).unwrap_or_default(),
            ColumnData::Text(v) => v[row].clone(),
            ColumnData::OptText(v) => v[row].clone().unwrap_or_default(),
            ColumnData::Bool(v) => v[row].to_string(),
        }
    }
}

pub(crate) struct Table {
    pub columns: Vec<(&'static str, ColumnData)>,
    pub rows: usize,
}

impl Table {
    pub fn header(&self) -> Vec<&'static str> {
        self.columns.iter().map(|(name, _)| *name).collect()
    }

    pub fn row(&self, row: usize) -> Vec<String> {
        self.columns.iter().map(|(_, col)| col.cell(row)).collect()
    }
}

/// Common leading columns of every row.
#[derive(Default)]
struct Stamp {
    security: Vec<String>,
    ts_ns: Vec<i64>,
    time: Vec<String>,
}

impl Stamp {
    fn push(&mut self, security: &SecurityId, time: &DateTime<Tz>) -> Result<(), SinkError> {
        let ns = time.timestamp_nanos_opt().ok_or_else(|| {
            SinkError::Rejected(format!("{time} is outside the nanosecond timestamp range"))
        })?;
        self.security.push(security.to_string());
        self.ts_ns.push(ns);
        self.time.push(time.to_rfc3339());
        Ok(())
    }

    fn into_columns(self) -> Vec<(&'static str, ColumnData)> {
        vec![
            ("security", ColumnData::Text(self.security)),
            ("ts_ns", ColumnData::Int(self.ts_ns)),
            ("time", ColumnData::Text(self.time)),
        ]
    }
}

pub(crate) fn batch_table(batch: &MessageBatch) -> Result<Table, SinkError> {
    let mut stamp = Stamp::default();
    let mut columns = match batch {
        MessageBatch::OrderBook(books) => {
            let mut seq = Vec::new();
            let mut side = Vec::new();
            let mut level = Vec::new();
            let mut price = Vec::new();
            let mut volume = Vec::new();
            for (i, book) in books.iter().enumerate() {
                let sides = [(Side::Buy, &book.bids), (Side::Sell, &book.asks)];
                for (s, levels) in sides {
                    for (depth, QuoteLevel { price: p, volume: v }) in levels.iter().enumerate() {
                        stamp.push(&book.security, &book.time)?;
                        seq.push(i as i64);
                        side.push(s.as_str().to_string());
                        level.push(depth as i64);
                        price.push(p.to_string());
                        volume.push(*v);
                    }
                }
            }
            vec![
                ("seq", ColumnData::Int(seq)),
                ("side", ColumnData::Text(side)),
                ("level", ColumnData::Int(level)),
                ("price", ColumnData::Text(price)),
                ("volume", ColumnData::Int(volume)),
            ]
        }
        MessageBatch::Trades(trades) => {
            let mut trade_id = Vec::new();
            let mut price = Vec::new();
            let mut volume = Vec::new();
            let mut side = Vec::new();
            let mut open_interest = Vec::new();
            for t in trades {
                stamp.push(&t.security, &t.time)?;
                trade_id.push(t.trade_id);
                price.push(t.price.to_string());
                volume.push(t.volume);
                side.push(t.side.map(|s| s.as_str().to_string()));
                open_interest.push(t.open_interest);
            }
            vec![
                ("trade_id", ColumnData::OptInt(trade_id)),
                ("price", ColumnData::Text(price)),
                ("volume", ColumnData::Int(volume)),
                ("side", ColumnData::OptText(side)),
                ("open_interest", ColumnData::OptInt(open_interest)),
            ]
        }
        MessageBatch::OrderLog(events) => {
            let n = events.len();
            let mut transaction_id = Vec::with_capacity(n);
            let mut order_id = Vec::with_capacity(n);
            let mut price = Vec::with_capacity(n);
            let mut volume = Vec::with_capacity(n);
            let mut balance = Vec::with_capacity(n);
            let mut side = Vec::with_capacity(n);
            let mut lifecycle = Vec::with_capacity(n);
            let mut order_state = Vec::with_capacity(n);
            let mut time_in_force = Vec::with_capacity(n);
            let mut status = Vec::with_capacity(n);
            let mut is_system = Vec::with_capacity(n);
            let mut trade_id = Vec::with_capacity(n);
            let mut trade_price = Vec::with_capacity(n);
            let mut open_interest = Vec::with_capacity(n);
            for e in events {
                stamp.push(&e.security, &e.time)?;
                transaction_id.push(e.transaction_id);
                order_id.push(e.order_id);
                price.push(e.price.to_string());
                volume.push(e.volume);
                balance.push(e.balance);
                side.push(e.side.map(|s| s.as_str().to_string()));
                lifecycle.push(e.lifecycle.map(|l| lifecycle_name(l).to_string()));
                order_state.push(e.order_state.map(|s| order_state_name(s).to_string()));
                time_in_force.push(e.time_in_force.map(|t| time_in_force_name(t).to_string()));
                status.push(i64::from(e.status.bits()));
                is_system.push(e.is_system);
                trade_id.push(e.trade_id);
                trade_price.push(e.trade_price.map(|p| p.to_string()));
                open_interest.push(e.open_interest);
            }
            vec![
                ("transaction_id", ColumnData::Int(transaction_id)),
                ("order_id", ColumnData::Int(order_id)),
                ("price", ColumnData::Text(price)),
                ("volume", ColumnData::Int(volume)),
                ("balance", ColumnData::Int(balance)),
                ("side", ColumnData::OptText(side)),
                ("lifecycle", ColumnData::OptText(lifecycle)),
                ("order_state", ColumnData::OptText(order_state)),
                ("time_in_force", ColumnData::OptText(time_in_force)),
                ("status", ColumnData::Int(status)),
                ("is_system", ColumnData::Bool(is_system)),
                ("trade_id", ColumnData::OptInt(trade_id)),
                ("trade_price", ColumnData::OptText(trade_price)),
                ("open_interest", ColumnData::OptInt(open_interest)),
            ]
        }
        MessageBatch::Level1(updates) => {
            let mut field = Vec::new();
            let mut value = Vec::new();
            for u in updates {
                for (f, v) in &u.changes {
                    stamp.push(&u.security, &u.time)?;
                    field.push(f.as_str().to_string());
                    value.push(v.to_string());
                }
            }
            vec![
                ("field", ColumnData::Text(field)),
                ("value", ColumnData::Text(value)),
            ]
        }
    };

    let rows = stamp.ts_ns.len();
    let mut all = stamp.into_columns();
    all.append(&mut columns);
    Ok(Table { columns: all, rows })
}

fn lifecycle_name(l: Lifecycle) -> &'static str {
    match l {
        Lifecycle::Active => "active",
        Lifecycle::Filled => "filled",
        Lifecycle::Cancelled => "cancelled",
        Lifecycle::GroupCancelled => "group_cancelled",
        Lifecycle::Moved => "moved",
    }
}

fn order_state_name(s: OrderState) -> &'static str {
    match s {
        OrderState::Active => "active",
        OrderState::Done => "done",
    }
}

fn time_in_force_name(t: TimeInForce) -> &'static str {
    match t {
        TimeInForce::MatchOrCancel => "match_or_cancel",
        TimeInForce::PutInQueue => "put_in_queue",
    }
}
