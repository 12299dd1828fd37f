use crate::domain::NativeTime;

/// Synthesizes strictly increasing transaction ids from record times.
///
/// The id is the record's native tick count when that moves forward,
/// otherwise the previous id plus one.
#[derive(Debug, Clone, Default)]
pub struct TransactionIdGen {
    last: Option<i64>,
}

impl TransactionIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, time: NativeTime) -> i64 {
        let id = match self.last {
            Some(last) if time.ticks() <= last => last.saturating_add(1),
            _ => time.ticks(),
        };
        self.last = Some(id);
        id
    }

    pub fn last(&self) -> Option<i64> {
        self.last
    }
}
