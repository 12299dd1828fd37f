//! Synthetic capture files for runner tests.

#![allow(dead_code)]

use chrono::NaiveDate;
use std::path::{Path, PathBuf};

use qshconv_core::domain::NativeTime;
use qshconv_core::qsh::{OrdLogFlags, QshSecurity, QshWriter, RawOrdLog, StreamInfo, StreamKind};

pub fn security(code: &str) -> QshSecurity {
    security_with_step(code, "10")
}

pub fn security_with_step(code: &str, step: &str) -> QshSecurity {
    format!("Plaza2:{code}:{code}:1:{step}").parse().unwrap()
}

pub fn day_start(date: NaiveDate) -> NativeTime {
    NativeTime::from_naive(date.and_hms_opt(10, 0, 0).unwrap())
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// Capture bytes with one order-log stream of `records` adds, 1 ms apart.
pub fn ord_log_capture(code: &str, day: NaiveDate, records: usize) -> Vec<u8> {
    ord_log_capture_with_step(code, "10", day, records)
}

pub fn ord_log_capture_with_step(code: &str, step: &str, day: NaiveDate, records: usize) -> Vec<u8> {
    let start = day_start(day);
    let streams = vec![StreamInfo {
        kind: StreamKind::OrdLog,
        security: Some(security_with_step(code, step)),
    }];
    let mut w = QshWriter::new(Vec::new(), "QScalp", "runner fixture", start, streams).unwrap();
    for i in 0..records {
        let time = NativeTime::from_millis(start.millis() + i as i64);
        w.write_ord_log(
            0,
            time,
            &RawOrdLog {
                time,
                flags: OrdLogFlags::from_bits(OrdLogFlags::ADD | OrdLogFlags::BUY),
                order_id: 1_000 + i as i64,
                price: 9_500 + (i % 5) as i64,
                amount: 1,
                amount_rest: 1,
                deal_id: 0,
                deal_price: 0,
                open_interest: 0,
            },
        )
        .unwrap();
    }
    w.finish().unwrap()
}

/// `OrdLog.<code>.<date>.qsh`, the naming the scanner expects.
pub fn capture_name(code: &str, day: NaiveDate) -> String {
    format!("OrdLog.{code}.{}.qsh", day.format("%Y-%m-%d"))
}

pub fn write_capture(dir: &Path, code: &str, day: &str, records: usize) -> PathBuf {
    let day = date(day);
    let path = dir.join(capture_name(code, day));
    std::fs::write(&path, ord_log_capture(code, day, records)).unwrap();
    path
}

/// A capture whose last frame is cut short.
pub fn write_truncated_capture(dir: &Path, code: &str, day: &str, records: usize) -> PathBuf {
    let day = date(day);
    let path = dir.join(capture_name(code, day));
    let mut bytes = ord_log_capture(code, day, records);
    bytes.truncate(bytes.len() - 1);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// A capture whose header declares `step` as the price step.
pub fn write_capture_with_step(dir: &Path, code: &str, step: &str, day: &str, records: usize) -> PathBuf {
    let day = date(day);
    let path = dir.join(capture_name(code, day));
    std::fs::write(&path, ord_log_capture_with_step(code, step, day, records)).unwrap();
    path
}
