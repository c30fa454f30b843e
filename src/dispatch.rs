//! Downstream collaborator contracts
//!
//! The resource catalog and the notification channel are owned by the
//! surrounding application. The core only needs the two seams below, invoked
//! after a transition has been persisted; failures are logged and swallowed
//! so a slow or broken collaborator can never stall the workflow.
use super::item::{ApprovalItem, TimeStamp};
use chrono::Utc;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

/// Receives the snapshot of a freshly approved item so a derived catalog
/// entry can be recorded. Invoked exactly once per approval.
pub trait ResourcePublisher {
    fn publish(&self, item: &ApprovalItem, note: Option<&str>) -> anyhow::Result<()>;
}

/// Delivery channel for a batch of notifications. At-least-once; must not
/// assume it is called inside the transition's critical section.
pub trait NotificationSink {
    fn deliver(&self, batch: &[Notification]) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipient: String,
    pub title: String,
    pub body: String,
    pub at: TimeStamp<Utc>,
    pub link: Option<String>,
}

/// Publisher that only writes a log line. Stands in until the embedding
/// application wires its catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

impl ResourcePublisher for LogPublisher {
    fn publish(&self, item: &ApprovalItem, note: Option<&str>) -> anyhow::Result<()> {
        info!(id = %item.id, title = %item.title, note = ?note, "published approved item");
        Ok(())
    }
}

/// Sink that only writes log lines, one per notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn deliver(&self, batch: &[Notification]) -> anyhow::Result<()> {
        for notification in batch {
            info!(
                recipient = %notification.recipient,
                title = %notification.title,
                body = %notification.body,
                "notification",
            );
        }
        Ok(())
    }
}

/// Recording publisher for tests: captures every snapshot it is handed.
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    published: Arc<Mutex<Vec<(ApprovalItem, Option<String>)>>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(ApprovalItem, Option<String>)> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ResourcePublisher for RecordingPublisher {
    fn publish(&self, item: &ApprovalItem, note: Option<&str>) -> anyhow::Result<()> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((item.clone(), note.map(str::to_string)));
        Ok(())
    }
}

/// Recording sink for tests: captures every notification delivered.
#[derive(Clone, Default)]
pub struct RecordingSink {
    delivered: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl NotificationSink for RecordingSink {
    fn deliver(&self, batch: &[Notification]) -> anyhow::Result<()> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(batch);
        Ok(())
    }
}
