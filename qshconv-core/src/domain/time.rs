//! Native QSH timestamps.
//!
//! QSH stores times as .NET `DateTime` ticks (100 ns since 0001-01-01) in the
//! recording's local zone. [`NativeTime`] keeps that representation so the
//! order-log transaction ids can be derived from it directly, and only
//! localizes when a domain message is built.

use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// .NET ticks per millisecond.
pub const TICKS_PER_MILLISECOND: i64 = 10_000;

const TICKS_PER_SECOND: i64 = 10_000_000;

/// Ticks between 0001-01-01 and 1970-01-01.
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// Timestamp in .NET ticks, local to the recording's time zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NativeTime(i64);

impl NativeTime {
    pub const fn from_ticks(ticks: i64) -> Self {
        Self(ticks)
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis.saturating_mul(TICKS_PER_MILLISECOND))
    }

    pub const fn ticks(self) -> i64 {
        self.0
    }

    /// Whole milliseconds, the resolution of QSH frame and record times.
    pub const fn millis(self) -> i64 {
        self.0.div_euclid(TICKS_PER_MILLISECOND)
    }

    pub fn from_naive(dt: NaiveDateTime) -> Self {
        let utc = dt.and_utc();
        Self(
            UNIX_EPOCH_TICKS
                + utc.timestamp() * TICKS_PER_SECOND
                + i64::from(utc.timestamp_subsec_nanos() / 100),
        )
    }

    /// Wall-clock value, or `None` when the ticks are outside chrono's range.
    pub fn to_naive(self) -> Option<NaiveDateTime> {
        let since_unix = self.0.checked_sub(UNIX_EPOCH_TICKS)?;
        let secs = since_unix.div_euclid(TICKS_PER_SECOND);
        let nanos = (since_unix.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
        DateTime::from_timestamp(secs, nanos).map(|dt| dt.naive_utc())
    }

    /// Tag the wall-clock value with `zone`.
    ///
    /// Ambiguous local times (DST fall-back) resolve to the earliest instant;
    /// local times skipped by a DST jump are read as UTC.
    pub fn localize(self, zone: Tz) -> Option<DateTime<Tz>> {
        let naive = self.to_naive()?;
        Some(match zone.from_local_datetime(&naive) {
            LocalResult::Single(t) => t,
            LocalResult::Ambiguous(earliest, _) => earliest,
            LocalResult::None => zone.from_utc_datetime(&naive),
        })
    }
}

impl fmt::Display for NativeTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_naive() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.3f")),
            None => write!(f, "ticks:{}", self.0),
        }
    }
}
