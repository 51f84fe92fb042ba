use serde::{Deserialize, Serialize};

/// File counts of one upload batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    /// Files not yet terminal (PENDING or PROCESSING).
    pub processing: u32,
}

impl BatchSummary {
    pub fn is_complete(&self) -> bool {
        self.processing == 0
    }
}

/// Result of a batch completion check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Some files are still in flight.
    Pending(BatchSummary),
    /// This call won the notification and sent it.
    Notified(BatchSummary),
    /// The batch is complete but another caller already notified.
    AlreadyNotified(BatchSummary),
}

impl BatchOutcome {
    pub fn summary(&self) -> BatchSummary {
        match self {
            BatchOutcome::Pending(s)
            | BatchOutcome::Notified(s)
            | BatchOutcome::AlreadyNotified(s) => *s,
        }
    }

    pub fn is_notified(&self) -> bool {
        matches!(self, BatchOutcome::Notified(_))
    }
}
