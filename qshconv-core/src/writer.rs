//! Per-security, per-kind message buffering in front of a [`MessageSink`].

use serde::Serialize;
use std::collections::BTreeMap;
use std::mem;

use crate::domain::{
    DomainMessage, Level1Update, MessageBatch, MessageKind, OrderBookSnapshot, OrderLogEvent,
    SecurityId, TradeTick,
};
use crate::sink::{MessageSink, SinkError};

/// Default number of buffered messages that triggers a flush.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Message counts broken down by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindCounts {
    pub order_book: u64,
    pub trades: u64,
    pub order_log: u64,
    pub level1: u64,
}

impl KindCounts {
    pub fn add(&mut self, kind: MessageKind, n: u64) {
        match kind {
            MessageKind::OrderBook => self.order_book += n,
            MessageKind::Trades => self.trades += n,
            MessageKind::OrderLog => self.order_log += n,
            MessageKind::Level1 => self.level1 += n,
        }
    }

    pub fn get(&self, kind: MessageKind) -> u64 {
        match kind {
            MessageKind::OrderBook => self.order_book,
            MessageKind::Trades => self.trades,
            MessageKind::OrderLog => self.order_log,
            MessageKind::Level1 => self.level1,
        }
    }

    pub fn total(&self) -> u64 {
        self.order_book + self.trades + self.order_log + self.level1
    }

    pub fn merge(&mut self, other: &KindCounts) {
        for kind in MessageKind::ALL {
            self.add(kind, other.get(kind));
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriterStats {
    pub appended: KindCounts,
    pub flushed: KindCounts,
    /// Number of sink `save` calls.
    pub flushes: u64,
    pub discarded: u64,
}

#[derive(Debug, Default)]
struct SecurityBuffers {
    order_book: Vec<OrderBookSnapshot>,
    trades: Vec<TradeTick>,
    order_log: Vec<OrderLogEvent>,
    level1: Vec<Level1Update>,
}

impl SecurityBuffers {
    fn len(&self) -> usize {
        self.order_book.len() + self.trades.len() + self.order_log.len() + self.level1.len()
    }

    /// Drain every non-empty buffer, in kind order.
    fn take_all(&mut self) -> Vec<MessageBatch> {
        let mut out = Vec::new();
        if !self.order_book.is_empty() {
            out.push(MessageBatch::OrderBook(mem::take(&mut self.order_book)));
        }
        if !self.trades.is_empty() {
            out.push(MessageBatch::Trades(mem::take(&mut self.trades)));
        }
        if !self.order_log.is_empty() {
            out.push(MessageBatch::OrderLog(mem::take(&mut self.order_log)));
        }
        if !self.level1.is_empty() {
            out.push(MessageBatch::Level1(mem::take(&mut self.level1)));
        }
        out
    }
}

fn push_full<T>(buf: &mut Vec<T>, item: T, threshold: usize) -> Option<Vec<T>> {
    buf.push(item);
    (buf.len() >= threshold).then(|| mem::take(buf))
}

/// Buffers messages per `(SecurityId, MessageKind)` and hands full batches
/// to the sink. Buffers are flushed in security order, then kind order.
pub struct BatchedWriter<'s> {
    sink: &'s dyn MessageSink,
    threshold: usize,
    buffers: BTreeMap<SecurityId, SecurityBuffers>,
    stats: WriterStats,
}

impl<'s> BatchedWriter<'s> {
    pub fn new(sink: &'s dyn MessageSink, threshold: usize) -> Self {
        Self {
            sink,
            threshold: threshold.max(1),
            buffers: BTreeMap::new(),
            stats: WriterStats::default(),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Buffer `message`; flush its buffer when it reaches the threshold.
    pub fn append(&mut self, message: DomainMessage) -> Result<(), SinkError> {
        let kind = message.kind();
        self.stats.appended.add(kind, 1);

        let security = message.security().clone();
        let buffers = self.buffers.entry(security.clone()).or_default();
        let full = match message {
            DomainMessage::OrderBook(m) => {
                push_full(&mut buffers.order_book, m, self.threshold).map(MessageBatch::OrderBook)
            }
            DomainMessage::Trade(m) => {
                push_full(&mut buffers.trades, m, self.threshold).map(MessageBatch::Trades)
            }
            DomainMessage::OrderLog(m) => {
                push_full(&mut buffers.order_log, m, self.threshold).map(MessageBatch::OrderLog)
            }
            DomainMessage::Level1(m) => {
                push_full(&mut buffers.level1, m, self.threshold).map(MessageBatch::Level1)
            }
        };

        match full {
            Some(batch) => self.save(&security, batch),
            None => Ok(()),
        }
    }

    /// Flush every non-empty buffer.
    pub fn flush_all(&mut self) -> Result<(), SinkError> {
        let pending: Vec<(SecurityId, MessageBatch)> = self
            .buffers
            .iter_mut()
            .flat_map(|(id, bufs)| bufs.take_all().into_iter().map(move |b| (id.clone(), b)))
            .collect();
        for (security, batch) in pending {
            self.save(&security, batch)?;
        }
        Ok(())
    }

    /// Drop everything buffered. Returns the number of messages dropped.
    pub fn discard(&mut self) -> usize {
        let dropped: usize = self.buffers.values().map(SecurityBuffers::len).sum();
        self.buffers.clear();
        self.stats.discarded += dropped as u64;
        dropped
    }

    /// Messages currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffers.values().map(SecurityBuffers::len).sum()
    }

    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }

    fn save(&mut self, security: &SecurityId, batch: MessageBatch) -> Result<(), SinkError> {
        let kind = batch.kind();
        let len = batch.len() as u64;
        self.sink.save(security, batch)?;
        self.stats.flushed.add(kind, len);
        self.stats.flushes += 1;
        tracing::trace!(%security, %kind, len, "flushed batch");
        Ok(())
    }
}
