use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

use super::error::FormatError;

/// Security descriptor from a stream header: `entry:ticker:aux_code:id:step`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QshSecurity {
    pub entry: String,
    pub ticker: String,
    pub aux_code: String,
    pub id: i64,
    pub step: Decimal,
}

impl QshSecurity {
    /// Number of decimal places implied by the price step.
    pub fn precision(&self) -> u32 {
        self.step.normalize().scale()
    }
}

impl FromStr for QshSecurity {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FormatError::InvalidSecurity(s.to_string());
        let parts: Vec<&str> = s.split(':').collect();
        let [entry, ticker, aux_code, id, step] = parts.as_slice() else {
            return Err(invalid());
        };
        if ticker.is_empty() {
            return Err(invalid());
        }
        let id = id.parse::<i64>().map_err(|_| invalid())?;
        let step = Decimal::from_str(step)
            .ok()
            .filter(|s| s.is_sign_positive() && !s.is_zero())
            .ok_or_else(invalid)?;
        Ok(Self {
            entry: entry.to_string(),
            ticker: ticker.to_string(),
            aux_code: aux_code.to_string(),
            id,
            step,
        })
    }
}

impl fmt::Display for QshSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.entry,
            self.ticker,
            self.aux_code,
            self.id,
            self.step.normalize()
        )
    }
}
