//! Aggregation helpers for bulk outcomes.
//!
//! Bulk actions surface their results as a per-row status list (which of the
//! N calls passed, which failed, which the server refused). These helpers
//! fold an outcomes sequence into that shape without losing index identity.

use serde::{Deserialize, Serialize};

use super::types::Outcome;

/// Row status for one operation in a bulk action report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BulkOperationStatus {
    /// The call went through.
    Pass,
    /// The call failed.
    Fail,
    /// The server refused the call (authorization or validation).
    Unauthorized,
    /// The call was not attempted.
    Skip,
}

/// Counts over a settled outcomes sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkSummary {
    /// Total operations in the run.
    pub total: usize,
    /// Operations that resolved with a value.
    pub fulfilled: usize,
    /// Operations that failed.
    pub rejected: usize,
}

impl BulkSummary {
    /// True when every operation in the run fulfilled.
    pub fn all_fulfilled(&self) -> bool {
        self.fulfilled == self.total
    }
}

/// Count fulfilled and rejected outcomes.
pub fn summarize<T, E>(outcomes: &[Outcome<T, E>]) -> BulkSummary {
    let fulfilled = outcomes.iter().filter(|o| o.is_fulfilled()).count();
    BulkSummary {
        total: outcomes.len(),
        fulfilled,
        rejected: outcomes.len() - fulfilled,
    }
}

/// Split outcomes into `(index, value)` and `(index, reason)` lists,
/// preserving each operation's input index.
pub fn partition<T, E>(outcomes: Vec<Outcome<T, E>>) -> (Vec<(usize, T)>, Vec<(usize, E)>) {
    let mut values = Vec::new();
    let mut reasons = Vec::new();
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Outcome::Fulfilled { value } => values.push((index, value)),
            Outcome::Rejected { reason } => reasons.push((index, reason)),
        }
    }
    (values, reasons)
}

/// Map each outcome to a report row status, classifying rejection reasons
/// with the supplied closure (typically switching on the server error code:
/// 403/422 map to [`BulkOperationStatus::Unauthorized`], the rest to
/// [`BulkOperationStatus::Fail`]).
pub fn classify<T, E, F>(outcomes: &[Outcome<T, E>], classifier: F) -> Vec<BulkOperationStatus>
where
    F: Fn(&E) -> BulkOperationStatus,
{
    outcomes
        .iter()
        .map(|outcome| match outcome {
            Outcome::Fulfilled { .. } => BulkOperationStatus::Pass,
            Outcome::Rejected { reason } => classifier(reason),
        })
        .collect()
}
