//! The append-only audit ledger embedded in each approval item
use super::item::TimeStamp;
use chrono::Utc;

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct HistoryEntry {
    #[n(0)]
    pub at: TimeStamp<Utc>,
    #[n(1)]
    pub actor: String,
    #[n(2)]
    pub action: HistoryAction,
    #[n(3)]
    pub note: Option<String>,
}

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone, Copy)]
pub enum HistoryAction {
    #[n(0)]
    Created,
    #[n(1)]
    Pending,
    #[n(2)]
    Approved,
    #[n(3)]
    Rejected,
    #[n(4)]
    Changes,
    #[n(5)]
    Archived,
}

/// Actor name recorded on entries the sweeper writes.
pub const SYSTEM_ACTOR: &str = "System";

impl HistoryEntry {
    pub fn new(
        at: TimeStamp<Utc>,
        actor: String,
        action: HistoryAction,
        note: Option<String>,
    ) -> Self {
        Self {
            at,
            actor,
            action,
            note,
        }
    }
}

impl std::fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            HistoryAction::Created => "created",
            HistoryAction::Pending => "pending",
            HistoryAction::Approved => "approved",
            HistoryAction::Rejected => "rejected",
            HistoryAction::Changes => "changes requested",
            HistoryAction::Archived => "archived",
        };
        write!(f, "{label}")
    }
}

impl std::fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} by {}", self.at, self.action, self.actor)?;
        if let Some(note) = &self.note {
            write!(f, ": {note}")?;
        }
        Ok(())
    }
}
