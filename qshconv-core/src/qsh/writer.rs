//! QSH v4 encoder, the inverse of [`QshReader`](super::QshReader).
//!
//! Each stream keeps a mirror of the decoder's state so a field is only
//! written when it differs from what the reader already holds.

use std::io::{self, Write};

use super::raw::{DealSide, OrdLogFlags, RawAuxInfo, RawDeal, RawOrdLog};
use super::reader::{FORMAT_VERSION, SIGNATURE};
use super::stream::{aux_flags, deal_flags, ordlog_flags, StreamInfo, StreamKind};
use super::varint::{put_growing, put_leb128, put_relative, put_uleb128};
use crate::domain::NativeTime;

#[derive(Debug, Clone, Copy)]
struct ClockMirror {
    last_ms: i64,
    set: bool,
}

impl ClockMirror {
    fn new(base_ms: i64) -> Self {
        Self {
            last_ms: base_ms,
            set: false,
        }
    }

    /// Append the record time if the reader would not reproduce it otherwise.
    fn put(&mut self, buf: &mut Vec<u8>, time: NativeTime) -> bool {
        let ms = time.millis();
        if self.set && ms == self.last_ms {
            return false;
        }
        put_growing(buf, ms, self.last_ms);
        self.last_ms = ms;
        self.set = true;
        true
    }
}

#[derive(Debug)]
struct DealsMirror {
    clock: ClockMirror,
    id: i64,
    order_id: i64,
    price: i64,
    volume: i64,
    open_interest: i64,
}

#[derive(Debug)]
struct OrdLogMirror {
    clock: ClockMirror,
    added_order_id: i64,
    order_id: i64,
    price: i64,
    amount: i64,
    amount_rest: i64,
    deal_id: i64,
    deal_price: i64,
    open_interest: i64,
}

#[derive(Debug)]
struct AuxInfoMirror {
    clock: ClockMirror,
    price: i64,
    ask_total: i64,
    bid_total: i64,
    open_interest: i64,
    hi_limit: i64,
    lo_limit: i64,
    deposit: f64,
    rate: f64,
}

#[derive(Debug)]
enum Mirror {
    Stock { last_price: i64 },
    Deals(DealsMirror),
    OrdLog(OrdLogMirror),
    AuxInfo(AuxInfoMirror),
    Unsupported,
}

impl Mirror {
    fn new(kind: StreamKind, base_ms: i64) -> Self {
        match kind {
            StreamKind::Stock => Mirror::Stock { last_price: 0 },
            StreamKind::Deals => Mirror::Deals(DealsMirror {
                clock: ClockMirror::new(base_ms),
                id: 0,
                order_id: 0,
                price: 0,
                volume: 0,
                open_interest: 0,
            }),
            StreamKind::OrdLog => Mirror::OrdLog(OrdLogMirror {
                clock: ClockMirror::new(base_ms),
                added_order_id: 0,
                order_id: 0,
                price: 0,
                amount: 0,
                amount_rest: 0,
                deal_id: 0,
                deal_price: 0,
                open_interest: 0,
            }),
            StreamKind::AuxInfo => Mirror::AuxInfo(AuxInfoMirror {
                clock: ClockMirror::new(base_ms),
                price: 0,
                ask_total: 0,
                bid_total: 0,
                open_interest: 0,
                hi_limit: 0,
                lo_limit: 0,
                deposit: 0.0,
                rate: 0.0,
            }),
            _ => Mirror::Unsupported,
        }
    }
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg)
}

fn put_string(buf: &mut Vec<u8>, s: &str) {
    put_uleb128(buf, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Writes a capture file frame by frame. Frame times must not decrease.
pub struct QshWriter<W: Write> {
    out: W,
    mirrors: Vec<Mirror>,
    last_frame_ms: i64,
    buf: Vec<u8>,
}

impl<W: Write> QshWriter<W> {
    /// Write the file header.
    pub fn new(
        mut out: W,
        app_name: &str,
        comment: &str,
        recorded_at: NativeTime,
        streams: Vec<StreamInfo>,
    ) -> io::Result<Self> {
        if streams.is_empty() || streams.len() > usize::from(u8::MAX) {
            return Err(invalid(format!("stream count {} not in 1..=255", streams.len())));
        }

        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(SIGNATURE);
        buf.push(FORMAT_VERSION);
        put_string(&mut buf, app_name);
        put_string(&mut buf, comment);
        buf.extend_from_slice(&recorded_at.ticks().to_le_bytes());
        buf.push(streams.len() as u8);

        let base_ms = recorded_at.millis();
        let mut mirrors = Vec::with_capacity(streams.len());
        for info in &streams {
            buf.push(info.kind.code());
            match (&info.security, info.kind.has_security()) {
                (Some(sec), true) => put_string(&mut buf, &sec.to_string()),
                (None, false) => {}
                (None, true) => return Err(invalid(format!("{} stream needs a security", info.kind))),
                (Some(_), false) => return Err(invalid(format!("{} stream takes no security", info.kind))),
            }
            mirrors.push(Mirror::new(info.kind, base_ms));
        }
        out.write_all(&buf)?;
        buf.clear();

        Ok(Self {
            out,
            mirrors,
            last_frame_ms: base_ms,
            buf,
        })
    }

    fn begin_frame(&mut self, stream: usize, time: NativeTime) -> io::Result<()> {
        if stream >= self.mirrors.len() {
            return Err(invalid(format!("no stream {stream}")));
        }
        let ms = time.millis();
        if ms < self.last_frame_ms {
            return Err(invalid(format!("frame time {time} goes backwards")));
        }
        self.buf.clear();
        put_growing(&mut self.buf, ms, self.last_frame_ms);
        self.last_frame_ms = ms;
        if self.mirrors.len() > 1 {
            self.buf.push(stream as u8);
        }
        Ok(())
    }

    fn end_frame(&mut self) -> io::Result<()> {
        self.out.write_all(&self.buf)
    }

    /// Write an order-book update: `(price, signed volume)` changes, where a
    /// positive volume is an ask, negative a bid and zero removes the level.
    pub fn write_book_update(
        &mut self,
        stream: usize,
        frame: NativeTime,
        changes: &[(i64, i64)],
    ) -> io::Result<()> {
        let mut payload = Vec::new();
        match self.mirrors.get_mut(stream) {
            Some(Mirror::Stock { last_price }) => {
                put_uleb128(&mut payload, changes.len() as u64);
                for &(price, volume) in changes {
                    put_relative(&mut payload, price, *last_price);
                    *last_price = price;
                    put_leb128(&mut payload, volume);
                }
            }
            _ => return Err(invalid(format!("stream {stream} is not an order book"))),
        }
        self.begin_frame(stream, frame)?;
        self.buf.extend_from_slice(&payload);
        self.end_frame()
    }

    pub fn write_deal(&mut self, stream: usize, frame: NativeTime, deal: &RawDeal) -> io::Result<()> {
        use self::deal_flags::*;

        let mut payload = vec![0u8];
        let mut flags = match deal.side {
            DealSide::Unknown => 0,
            DealSide::Buy => 1,
            DealSide::Sell => 2,
        };
        match self.mirrors.get_mut(stream) {
            Some(Mirror::Deals(m)) => {
                if m.clock.put(&mut payload, deal.time) {
                    flags |= TIME;
                }
                if deal.id != m.id {
                    put_growing(&mut payload, deal.id, m.id);
                    m.id = deal.id;
                    flags |= ID;
                }
                if deal.order_id != m.order_id {
                    put_relative(&mut payload, deal.order_id, m.order_id);
                    m.order_id = deal.order_id;
                    flags |= ORDER_ID;
                }
                if deal.price != m.price {
                    put_relative(&mut payload, deal.price, m.price);
                    m.price = deal.price;
                    flags |= PRICE;
                }
                if deal.volume != m.volume {
                    put_leb128(&mut payload, deal.volume);
                    m.volume = deal.volume;
                    flags |= VOLUME;
                }
                if deal.open_interest != m.open_interest {
                    put_relative(&mut payload, deal.open_interest, m.open_interest);
                    m.open_interest = deal.open_interest;
                    flags |= OPEN_INTEREST;
                }
            }
            _ => return Err(invalid(format!("stream {stream} is not a deals stream"))),
        }
        payload[0] = flags;
        self.begin_frame(stream, frame)?;
        self.buf.extend_from_slice(&payload);
        self.end_frame()
    }

    pub fn write_ord_log(
        &mut self,
        stream: usize,
        frame: NativeTime,
        record: &RawOrdLog,
    ) -> io::Result<()> {
        use self::ordlog_flags::*;

        let mut payload = vec![0u8];
        payload.extend_from_slice(&record.flags.bits().to_le_bytes());
        let mut entry = 0u8;
        match self.mirrors.get_mut(stream) {
            Some(Mirror::OrdLog(m)) => {
                if m.clock.put(&mut payload, record.time) {
                    entry |= TIME;
                }
                if record.flags.contains(OrdLogFlags::ADD) {
                    if record.order_id != m.order_id || record.order_id != m.added_order_id {
                        put_growing(&mut payload, record.order_id, m.added_order_id);
                        m.added_order_id = record.order_id;
                        m.order_id = record.order_id;
                        entry |= ORDER_ID;
                    }
                } else if record.order_id != m.order_id {
                    put_relative(&mut payload, record.order_id, m.added_order_id);
                    m.order_id = record.order_id;
                    entry |= ORDER_ID;
                }
                if record.price != m.price {
                    put_relative(&mut payload, record.price, m.price);
                    m.price = record.price;
                    entry |= PRICE;
                }
                if record.amount != m.amount {
                    put_leb128(&mut payload, record.amount);
                    m.amount = record.amount;
                    entry |= AMOUNT;
                }
                if record.amount_rest != m.amount_rest {
                    put_leb128(&mut payload, record.amount_rest);
                    m.amount_rest = record.amount_rest;
                    entry |= AMOUNT_REST;
                }
                if record.flags.contains(OrdLogFlags::FILL) {
                    if record.deal_id != m.deal_id {
                        put_growing(&mut payload, record.deal_id, m.deal_id);
                        m.deal_id = record.deal_id;
                        entry |= DEAL_ID;
                    }
                    if record.deal_price != m.deal_price {
                        put_relative(&mut payload, record.deal_price, m.deal_price);
                        m.deal_price = record.deal_price;
                        entry |= DEAL_PRICE;
                    }
                }
                if record.open_interest != m.open_interest {
                    put_relative(&mut payload, record.open_interest, m.open_interest);
                    m.open_interest = record.open_interest;
                    entry |= OPEN_INTEREST;
                }
            }
            _ => return Err(invalid(format!("stream {stream} is not an order log"))),
        }
        payload[0] = entry;
        self.begin_frame(stream, frame)?;
        self.buf.extend_from_slice(&payload);
        self.end_frame()
    }

    pub fn write_aux_info(
        &mut self,
        stream: usize,
        frame: NativeTime,
        record: &RawAuxInfo,
    ) -> io::Result<()> {
        use self::aux_flags::*;

        let mut payload = vec![0u8];
        let mut flags = 0u8;
        match self.mirrors.get_mut(stream) {
            Some(Mirror::AuxInfo(m)) => {
                if m.clock.put(&mut payload, record.time) {
                    flags |= TIME;
                }
                if record.ask_total != m.ask_total {
                    put_relative(&mut payload, record.ask_total, m.ask_total);
                    m.ask_total = record.ask_total;
                    flags |= ASK_TOTAL;
                }
                if record.bid_total != m.bid_total {
                    put_relative(&mut payload, record.bid_total, m.bid_total);
                    m.bid_total = record.bid_total;
                    flags |= BID_TOTAL;
                }
                if record.open_interest != m.open_interest {
                    put_relative(&mut payload, record.open_interest, m.open_interest);
                    m.open_interest = record.open_interest;
                    flags |= OPEN_INTEREST;
                }
                if record.price != m.price {
                    put_relative(&mut payload, record.price, m.price);
                    m.price = record.price;
                    flags |= PRICE;
                }
                if record.hi_limit != m.hi_limit
                    || record.lo_limit != m.lo_limit
                    || record.deposit.to_bits() != m.deposit.to_bits()
                {
                    put_relative(&mut payload, record.hi_limit, m.hi_limit);
                    put_relative(&mut payload, record.lo_limit, m.lo_limit);
                    payload.extend_from_slice(&record.deposit.to_le_bytes());
                    m.hi_limit = record.hi_limit;
                    m.lo_limit = record.lo_limit;
                    m.deposit = record.deposit;
                    flags |= SESSION;
                }
                if record.rate.to_bits() != m.rate.to_bits() {
                    payload.extend_from_slice(&record.rate.to_le_bytes());
                    m.rate = record.rate;
                    flags |= RATE;
                }
                if let Some(message) = &record.message {
                    put_string(&mut payload, message);
                    flags |= MESSAGE;
                }
            }
            _ => return Err(invalid(format!("stream {stream} is not an aux info stream"))),
        }
        payload[0] = flags;
        self.begin_frame(stream, frame)?;
        self.buf.extend_from_slice(&payload);
        self.end_frame()
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qsh::reader::{QshReader, ReadOutcome};
    use crate::qsh::security::QshSecurity;
    use std::cell::RefCell;
    use std::convert::Infallible;

    fn info(kind: StreamKind) -> StreamInfo {
        let security: QshSecurity = "Plaza2:RIM5::1:10".parse().unwrap();
        StreamInfo {
            kind,
            security: Some(security),
        }
    }

    #[test]
    fn unchanged_fields_are_omitted() {
        let t0 = NativeTime::from_millis(63_560_000_000_000);
        let mut writer = QshWriter::new(Vec::new(), "", "", t0, vec![info(StreamKind::Deals)]).unwrap();
        let deal = RawDeal {
            time: t0,
            side: DealSide::Sell,
            id: 5,
            order_id: 0,
            price: 100,
            volume: 1,
            open_interest: 0,
        };
        writer.write_deal(0, t0, &deal).unwrap();
        let after_first = writer.out.len();
        writer.write_deal(0, t0, &deal).unwrap();
        // frame delta + flags byte only
        assert_eq!(writer.out.len() - after_first, 2);
    }

    #[test]
    fn order_log_fields_survive_encoding() {
        let t0 = NativeTime::from_millis(63_560_000_000_000);
        let records = vec![
            RawOrdLog {
                time: t0,
                flags: OrdLogFlags::from_bits(OrdLogFlags::ADD | OrdLogFlags::SELL),
                order_id: 1_000,
                price: 95_010,
                amount: 3,
                amount_rest: 3,
                deal_id: 0,
                deal_price: 0,
                open_interest: 0,
            },
            RawOrdLog {
                time: NativeTime::from_millis(t0.millis() + 1),
                flags: OrdLogFlags::from_bits(OrdLogFlags::FILL | OrdLogFlags::SELL),
                order_id: 1_000,
                price: 95_010,
                amount: 1,
                amount_rest: 2,
                deal_id: 77,
                deal_price: 95_010,
                open_interest: 120_000,
            },
            RawOrdLog {
                time: NativeTime::from_millis(t0.millis() + 1),
                flags: OrdLogFlags::from_bits(OrdLogFlags::CANCELED | OrdLogFlags::BUY),
                order_id: 990,
                price: 94_900,
                amount: 2,
                amount_rest: 0,
                deal_id: 0,
                deal_price: 0,
                open_interest: 120_000,
            },
        ];

        let mut writer =
            QshWriter::new(Vec::new(), "", "", t0, vec![info(StreamKind::OrdLog)]).unwrap();
        for r in &records {
            writer.write_ord_log(0, r.time, r).unwrap();
        }
        let bytes = writer.finish().unwrap();

        let seen = RefCell::new(Vec::new());
        let mut reader = QshReader::<Infallible>::from_reader(bytes.as_slice()).unwrap();
        reader
            .on_ord_log(0, |r| {
                seen.borrow_mut().push(r);
                Ok(())
            })
            .unwrap();
        while reader.read_next(true).unwrap() != ReadOutcome::EndOfFile {}
        drop(reader);
        assert_eq!(seen.into_inner(), records);
    }

    #[test]
    fn frames_must_not_go_backwards() {
        let t0 = NativeTime::from_millis(63_560_000_000_000);
        let mut writer = QshWriter::new(Vec::new(), "", "", t0, vec![info(StreamKind::Stock)]).unwrap();
        let earlier = NativeTime::from_millis(t0.millis() - 1);
        assert!(writer.write_book_update(0, earlier, &[(100, 1)]).is_err());
    }

    #[test]
    fn stream_kind_mismatch_is_rejected() {
        let t0 = NativeTime::from_millis(63_560_000_000_000);
        let mut writer = QshWriter::new(Vec::new(), "", "", t0, vec![info(StreamKind::Stock)]).unwrap();
        let deal = RawDeal {
            time: t0,
            side: DealSide::Unknown,
            id: 1,
            order_id: 0,
            price: 1,
            volume: 1,
            open_interest: 0,
        };
        assert!(writer.write_deal(0, t0, &deal).is_err());
    }
}
