use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::qsh::QshSecurity;

/// Default exchange board for FORTS recordings.
pub const DEFAULT_BOARD: &str = "FORTS";

/// Normalized security identifier, rendered as `CODE@BOARD`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SecurityId {
    pub code: String,
    pub board: String,
}

impl SecurityId {
    pub fn new(code: impl Into<String>, board: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            board: board.into(),
        }
    }
}

impl fmt::Display for SecurityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.code, self.board)
    }
}

/// What the translator needs to know about the instrument behind a sub-stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityInfo {
    pub id: SecurityId,
    pub price_step: Decimal,
    pub decimals: u32,
}

impl SecurityInfo {
    pub fn new(id: SecurityId, price_step: Decimal) -> Self {
        Self {
            id,
            decimals: price_step.normalize().scale(),
            price_step,
        }
    }

    /// Build from a stream header descriptor, placing it on `board`.
    pub fn from_qsh(security: &QshSecurity, board: &str) -> Self {
        Self::new(SecurityId::new(&security.ticker, board), security.step)
    }

    /// Convert an integer tick count to a decimal price, `None` on overflow.
    pub fn scale_price(&self, ticks: i64) -> Option<Decimal> {
        Decimal::from(ticks).checked_mul(self.price_step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn display_is_code_at_board() {
        assert_eq!(SecurityId::new("RIM5", "FORTS").to_string(), "RIM5@FORTS");
    }

    #[test]
    fn scale_price_is_exact() {
        let sec = SecurityInfo::new(
            SecurityId::new("SiM5", DEFAULT_BOARD),
            Decimal::from_str("0.01").unwrap(),
        );
        assert_eq!(sec.decimals, 2);
        assert_eq!(sec.scale_price(30), Decimal::from_str("0.30").ok());
        assert_eq!(sec.scale_price(-7), Decimal::from_str("-0.07").ok());
    }

    #[test]
    fn integer_step_has_zero_decimals() {
        let sec = SecurityInfo::new(SecurityId::new("RIM5", DEFAULT_BOARD), Decimal::from(10));
        assert_eq!(sec.decimals, 0);
        assert_eq!(sec.scale_price(9_512), Some(Decimal::from(95_120)));
    }

    #[test]
    fn oversized_step_overflows_to_none() {
        let sec = SecurityInfo::new(
            SecurityId::new("AAA1", DEFAULT_BOARD),
            Decimal::from_str("10000000000000000000000000000").unwrap(),
        );
        assert_eq!(sec.scale_price(10), None);
        assert_eq!(sec.scale_price(0), Some(Decimal::ZERO));
    }
}
