use serde::Serialize;

/// Counts from one garbage-collection pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Overdue sessions moved to `Expired`.
    pub expired: u64,
    /// Sessions removed after their grace period.
    pub removed: u64,
    /// Sessions left in the store.
    pub retained: u64,
}

impl SweepReport {
    pub fn is_noop(&self) -> bool {
        self.expired == 0 && self.removed == 0
    }
}
