use parking_lot::Mutex;

use super::{MessageSink, SinkError};
use crate::domain::{MessageBatch, MessageKind, SecurityId};

/// Keeps every saved batch in memory, in save order.
#[derive(Default)]
pub struct MemorySink {
    batches: Mutex<Vec<(SecurityId, MessageBatch)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.batches.lock().len()
    }

    /// Total messages saved for `security` and `kind`.
    pub fn message_count(&self, security: &SecurityId, kind: MessageKind) -> usize {
        self.batches
            .lock()
            .iter()
            .filter(|(id, b)| id == security && b.kind() == kind)
            .map(|(_, b)| b.len())
            .sum()
    }

    pub fn batches(&self) -> Vec<(SecurityId, MessageBatch)> {
        self.batches.lock().clone()
    }

    pub fn take(&self) -> Vec<(SecurityId, MessageBatch)> {
        std::mem::take(&mut *self.batches.lock())
    }
}

impl MessageSink for MemorySink {
    fn save(&self, security: &SecurityId, batch: MessageBatch) -> Result<(), SinkError> {
        self.batches.lock().push((security.clone(), batch));
        Ok(())
    }
}
