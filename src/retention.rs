//! Retention window configuration for rejected items
use super::item::TimeStamp;
use chrono::Utc;

/// Days a rejected item stays live (and resubmittable) before the sweeper
/// archives it.
pub const RETENTION_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            days: RETENTION_DAYS,
        }
    }
}

impl RetentionPolicy {
    pub fn new(days: i64) -> Self {
        Self { days }
    }

    pub fn days(&self) -> i64 {
        self.days
    }

    /// Deadline after which a rejection made at `rejected_at` is archived.
    pub fn archive_deadline(&self, rejected_at: &TimeStamp<Utc>) -> TimeStamp<Utc> {
        rejected_at.plus_days(self.days)
    }
}
