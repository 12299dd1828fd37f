//! End-to-end decode → translate → batch over synthetic multi-stream captures.

use chrono_tz::Europe::Moscow;
use flate2::write::GzEncoder;
use flate2::Compression;
use rust_decimal::Decimal;
use std::cell::RefCell;
use std::io::Write;

use qshconv_core::domain::{
    DomainMessage, Level1Field, Lifecycle, MessageBatch, MessageKind, NativeTime, SecurityId,
    SecurityInfo, Side, DEFAULT_BOARD,
};
use qshconv_core::qsh::{
    DealSide, FormatError, OrdLogFlags, QshReader, QshSecurity, QshWriter, RawAuxInfo, RawDeal,
    RawOrdLog, ReadError, ReadOutcome, StreamInfo, StreamKind,
};
use qshconv_core::sink::MemorySink;
use qshconv_core::translate::{EventTranslator, TranslateError};
use qshconv_core::writer::BatchedWriter;

// ── Fixture ──────────────────────────────────────────────────────────

fn rim5() -> QshSecurity {
    "Plaza2:RIM5:RTS-6.15:411562:10".parse().unwrap()
}

fn start() -> NativeTime {
    NativeTime::from_naive(
        chrono::NaiveDate::from_ymd_opt(2015, 3, 2)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap(),
    )
}

fn at(offset_ms: i64) -> NativeTime {
    NativeTime::from_millis(start().millis() + offset_ms)
}

/// Streams: 0 book, 1 deals, 2 order log, 3 aux info, 4 messages.
fn build_capture() -> Vec<u8> {
    let streams = vec![
        StreamInfo { kind: StreamKind::Stock, security: Some(rim5()) },
        StreamInfo { kind: StreamKind::Deals, security: Some(rim5()) },
        StreamInfo { kind: StreamKind::OrdLog, security: Some(rim5()) },
        StreamInfo { kind: StreamKind::AuxInfo, security: Some(rim5()) },
        StreamInfo { kind: StreamKind::Messages, security: None },
    ];
    let mut w = QshWriter::new(Vec::new(), "QScalp", "fixture", start(), streams).unwrap();

    w.write_book_update(0, at(0), &[(9_502, 3), (9_501, 5), (9_500, -2), (9_499, -7)])
        .unwrap();
    w.write_ord_log(
        2,
        at(0),
        &RawOrdLog {
            time: at(0),
            flags: OrdLogFlags::from_bits(OrdLogFlags::ADD | OrdLogFlags::BUY),
            order_id: 100,
            price: 9_500,
            amount: 2,
            amount_rest: 2,
            deal_id: 0,
            deal_price: 0,
            open_interest: 0,
        },
    )
    .unwrap();
    w.write_ord_log(
        2,
        at(0),
        &RawOrdLog {
            time: at(0),
            flags: OrdLogFlags::from_bits(OrdLogFlags::CANCELED | OrdLogFlags::BUY),
            order_id: 100,
            price: 9_500,
            amount: 2,
            amount_rest: 0,
            deal_id: 0,
            deal_price: 0,
            open_interest: 0,
        },
    )
    .unwrap();
    w.write_deal(
        1,
        at(3),
        &RawDeal {
            time: at(3),
            side: DealSide::Sell,
            id: 5_001,
            order_id: 0,
            price: 9_501,
            volume: 4,
            open_interest: 250_000,
        },
    )
    .unwrap();
    w.write_aux_info(
        3,
        at(3),
        &RawAuxInfo {
            time: at(3),
            price: 9_501,
            ask_total: 1_200,
            bid_total: 900,
            open_interest: 0,
            hi_limit: 0,
            lo_limit: 0,
            deposit: 0.0,
            rate: 0.0,
            message: None,
        },
    )
    .unwrap();
    w.write_book_update(0, at(7), &[(9_502, 0)]).unwrap();
    w.finish().unwrap()
}

fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
    enc.write_all(bytes).unwrap();
    enc.finish().unwrap()
}

/// Drive a capture through translator and writer, the way the runner does.
fn convert(bytes: &[u8], sink: &MemorySink) -> Result<u64, ReadError<TranslateError>> {
    let translator = RefCell::new(EventTranslator::new(Moscow));
    let messages = RefCell::new(Vec::<DomainMessage>::new());
    let (translator, messages) = (&translator, &messages);

    let mut reader = QshReader::<TranslateError>::from_reader(bytes)?;
    let streams = reader.streams().to_vec();
    for (index, stream) in streams.into_iter().enumerate() {
        let Some(security) = stream.security.as_ref() else {
            continue;
        };
        let info = SecurityInfo::from_qsh(security, DEFAULT_BOARD);
        let subscribed = match stream.kind {
            StreamKind::Stock => reader.on_quotes(index, move |raw| {
                let book = translator.borrow().quotes(&info, &raw)?;
                messages.borrow_mut().push(book.into());
                Ok(())
            }),
            StreamKind::Deals => reader.on_deals(index, move |raw| {
                let tick = translator.borrow().deal(&info, &raw)?;
                messages.borrow_mut().push(tick.into());
                Ok(())
            }),
            StreamKind::OrdLog => reader.on_ord_log(index, move |raw| {
                let ev = translator.borrow_mut().ord_log(&info, &raw)?;
                messages.borrow_mut().push(ev.into());
                Ok(())
            }),
            StreamKind::AuxInfo => reader.on_aux_info(index, move |raw| {
                let l1 = translator.borrow().aux_info(&info, &raw)?;
                messages.borrow_mut().push(l1.into());
                Ok(())
            }),
            _ => Ok(()),
        };
        subscribed.unwrap();
    }

    while let ReadOutcome::Tick(_) = reader.read_next(true)? {}
    let frames = reader.frames_read();
    drop(reader);

    let mut writer = BatchedWriter::new(sink, 1000);
    for m in messages.take() {
        writer.append(m).unwrap();
    }
    writer.flush_all().unwrap();
    Ok(frames)
}

// ── Tests ────────────────────────────────────────────────────────────

#[test]
fn multi_stream_capture_translates_every_supported_kind() {
    let sink = MemorySink::new();
    let frames = convert(&build_capture(), &sink).unwrap();
    assert_eq!(frames, 6);

    let id = SecurityId::new("RIM5", DEFAULT_BOARD);
    assert_eq!(sink.message_count(&id, MessageKind::OrderBook), 2);
    assert_eq!(sink.message_count(&id, MessageKind::Trades), 1);
    assert_eq!(sink.message_count(&id, MessageKind::OrderLog), 2);
    assert_eq!(sink.message_count(&id, MessageKind::Level1), 1);

    for (_, batch) in sink.batches() {
        match batch {
            MessageBatch::OrderBook(books) => {
                let first = &books[0];
                assert_eq!(first.asks[0].price, Decimal::from(95_010));
                assert_eq!(first.bids[0].price, Decimal::from(95_000));
                assert_eq!(first.asks.len(), 2);
                assert_eq!(books[1].asks.len(), 1);
            }
            MessageBatch::Trades(trades) => {
                assert_eq!(trades[0].side, Some(Side::Sell));
                assert_eq!(trades[0].trade_id, Some(5_001));
                assert_eq!(trades[0].open_interest, Some(250_000));
            }
            MessageBatch::OrderLog(events) => {
                assert_eq!(events[0].lifecycle, Some(Lifecycle::Active));
                assert_eq!(events[1].lifecycle, Some(Lifecycle::Cancelled));
                assert!(events[1].transaction_id > events[0].transaction_id);
            }
            MessageBatch::Level1(updates) => {
                assert_eq!(updates[0].get(Level1Field::OpenInterest), None);
                assert_eq!(
                    updates[0].get(Level1Field::AsksVolume),
                    Some(Decimal::from(1_200))
                );
            }
        }
    }
}

#[test]
fn gzip_capture_decodes_identically() {
    let plain = MemorySink::new();
    let packed = MemorySink::new();
    let bytes = build_capture();
    convert(&bytes, &plain).unwrap();
    convert(&gzip(&bytes), &packed).unwrap();
    assert_eq!(plain.batches(), packed.batches());
}

#[test]
fn timestamps_are_non_decreasing_per_kind() {
    let sink = MemorySink::new();
    convert(&build_capture(), &sink).unwrap();
    for (_, batch) in sink.batches() {
        let times = batch.times();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }
}

#[test]
fn crossed_book_fails_the_file() {
    let streams = vec![StreamInfo { kind: StreamKind::Stock, security: Some(rim5()) }];
    let mut w = QshWriter::new(Vec::new(), "", "", start(), streams).unwrap();
    w.write_book_update(0, at(0), &[(9_500, 1), (9_505, -1)]).unwrap();
    let bytes = w.finish().unwrap();

    let sink = MemorySink::new();
    assert!(matches!(
        convert(&bytes, &sink),
        Err(ReadError::Handler(TranslateError::UnsupportedQuote { price: 9_505, .. }))
    ));
    assert_eq!(sink.save_count(), 0);
}

#[test]
fn truncated_capture_fails_mid_file() {
    let mut bytes = build_capture();
    bytes.truncate(bytes.len() - 1);
    let sink = MemorySink::new();
    assert!(matches!(
        convert(&bytes, &sink),
        Err(ReadError::Format(FormatError::Truncated { .. }))
    ));
}
