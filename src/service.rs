//! Service layer API for approval workflow operations
use super::dispatch::{Notification, NotificationSink, ResourcePublisher};
use super::error::ApprovalError;
use super::history::{HistoryAction, HistoryEntry, SYSTEM_ACTOR};
use super::item::{ApprovalItem, Decision, ItemDraft, ItemStatus, TimeStamp};
use super::retention::RetentionPolicy;
use super::store::ApprovalStore;
use super::utils;
use chrono::Utc;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

/// The approval workflow state machine over an injected store, with the
/// resource catalog and notification channel as post-persistence side
/// effects.
///
/// Every read-modify-write runs under one internal lock so the history
/// ledger stays append-only and retention fields are never derived from a
/// stale read. Collaborators are invoked after the lock is released; their
/// failures are logged and swallowed.
pub struct ApprovalService<S, P, N> {
    store: S,
    publisher: P,
    notifier: N,
    policy: RetentionPolicy,
    write_lock: Mutex<()>,
}

impl<S, P, N> ApprovalService<S, P, N>
where
    S: ApprovalStore,
    P: ResourcePublisher,
    N: NotificationSink,
{
    pub fn new(store: S, publisher: P, notifier: N) -> Self {
        Self::with_policy(store, publisher, notifier, RetentionPolicy::default())
    }

    pub fn with_policy(store: S, publisher: P, notifier: N, policy: RetentionPolicy) -> Self {
        Self {
            store,
            publisher,
            notifier,
            policy,
            write_lock: Mutex::new(()),
        }
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate a draft and create the live item, pending approval.
    pub fn submit(&self, draft: ItemDraft) -> anyhow::Result<ApprovalItem> {
        self.submit_at(draft, TimeStamp::new())
    }

    pub fn submit_at(&self, draft: ItemDraft, now: TimeStamp<Utc>) -> anyhow::Result<ApprovalItem> {
        let id = utils::new_item_id()?;
        let item = draft.validate_and_finalise(id, now)?;

        {
            let _guard = self.guard();
            self.store.put(&item)?;
        }

        info!(id = %item.id, title = %item.title, "submitted for approval");
        Ok(item)
    }

    /// All live items.
    pub fn list(&self) -> anyhow::Result<Vec<ApprovalItem>> {
        self.store.list()
    }

    /// A single live item, or [`ApprovalError::NotFound`].
    pub fn get(&self, id: &str) -> anyhow::Result<ApprovalItem> {
        match self.store.get(id)? {
            Some(item) => Ok(item),
            None => Err(ApprovalError::NotFound(id.to_string()).into()),
        }
    }

    /// Archived items, most recently archived first.
    pub fn list_archived(&self) -> anyhow::Result<Vec<ApprovalItem>> {
        self.store.list_archived()
    }

    pub fn get_archived(&self, id: &str) -> anyhow::Result<ApprovalItem> {
        match self.store.get_archived(id)? {
            Some(item) => Ok(item),
            None => Err(ApprovalError::NotFound(id.to_string()).into()),
        }
    }

    /// Apply an approver decision to a live item.
    ///
    /// Rejections and change requests must carry a note; that policy lives
    /// here, not in callers. A rejection starts the retention countdown;
    /// leaving the rejected status clears it.
    pub fn transition(
        &self,
        id: &str,
        decision: Decision,
        actor: &str,
        note: Option<&str>,
    ) -> anyhow::Result<ApprovalItem> {
        self.transition_at(id, decision, actor, note, TimeStamp::new())
    }

    pub fn transition_at(
        &self,
        id: &str,
        decision: Decision,
        actor: &str,
        note: Option<&str>,
        now: TimeStamp<Utc>,
    ) -> anyhow::Result<ApprovalItem> {
        let note = normalised(note);
        if decision.requires_note() && note.is_none() {
            return Err(ApprovalError::NoteRequired(decision).into());
        }

        let item = {
            let _guard = self.guard();
            let mut item = match self.store.get(id)? {
                Some(item) => item,
                None => return Err(ApprovalError::NotFound(id.to_string()).into()),
            };

            // An approval has already been published to the catalog; it is
            // not revisited through this operation.
            if item.status == ItemStatus::Approved {
                return Err(ApprovalError::InvalidTransition {
                    id: item.id,
                    from: item.status,
                    attempted: decision.to_string(),
                }
                .into());
            }

            item.status = decision.status();
            match decision {
                Decision::Rejected => {
                    item.archive_at = Some(self.policy.archive_deadline(&now));
                    item.rejected_at = Some(now.clone());
                }
                _ => {
                    item.rejected_at = None;
                    item.archive_at = None;
                }
            }
            item.record(HistoryEntry::new(
                now.clone(),
                actor.to_string(),
                decision.action(),
                note.map(str::to_string),
            ));

            self.store.put(&item)?;
            item
        };

        info!(id = %item.id, status = ?item.status, actor, "applied approval decision");

        if decision == Decision::Approved {
            if let Err(err) = self.publisher.publish(&item, note) {
                warn!(id = %item.id, error = %err, "resource publisher failed; transition stands");
            }
        }
        self.notify(&item, actor, decision.action(), note, &now);

        Ok(item)
    }

    /// Put a rejected item back into the approval queue, stopping the
    /// retention countdown. Only valid while the item is rejected.
    pub fn resubmit(
        &self,
        id: &str,
        actor: &str,
        note: Option<&str>,
    ) -> anyhow::Result<ApprovalItem> {
        self.resubmit_at(id, actor, note, TimeStamp::new())
    }

    pub fn resubmit_at(
        &self,
        id: &str,
        actor: &str,
        note: Option<&str>,
        now: TimeStamp<Utc>,
    ) -> anyhow::Result<ApprovalItem> {
        let note = normalised(note);

        let item = {
            let _guard = self.guard();
            let mut item = match self.store.get(id)? {
                Some(item) => item,
                None => return Err(ApprovalError::NotFound(id.to_string()).into()),
            };

            if item.status != ItemStatus::Rejected {
                return Err(ApprovalError::InvalidTransition {
                    id: item.id,
                    from: item.status,
                    attempted: "resubmitted".to_string(),
                }
                .into());
            }

            item.status = ItemStatus::Pending;
            item.rejected_at = None;
            item.archive_at = None;
            item.record(HistoryEntry::new(
                now.clone(),
                actor.to_string(),
                HistoryAction::Pending,
                Some(note.unwrap_or("resubmitted for approval").to_string()),
            ));

            self.store.put(&item)?;
            item
        };

        info!(id = %item.id, actor, "resubmitted for approval");
        self.notify(&item, actor, HistoryAction::Pending, note, &now);

        Ok(item)
    }

    /// Operator override: archive one item immediately, whatever its status
    /// or deadline.
    pub fn archive_now(
        &self,
        id: &str,
        actor: &str,
        note: Option<&str>,
    ) -> anyhow::Result<ApprovalItem> {
        self.archive_now_at(id, actor, note, TimeStamp::new())
    }

    pub fn archive_now_at(
        &self,
        id: &str,
        actor: &str,
        note: Option<&str>,
        now: TimeStamp<Utc>,
    ) -> anyhow::Result<ApprovalItem> {
        let note = normalised(note);

        let item = {
            let _guard = self.guard();
            let mut item = match self.store.get(id)? {
                Some(item) => item,
                None => return Err(ApprovalError::NotFound(id.to_string()).into()),
            };

            item.record(HistoryEntry::new(
                now,
                actor.to_string(),
                HistoryAction::Archived,
                Some(note.unwrap_or("archived manually").to_string()),
            ));

            self.store.archive(&item)?;
            item
        };

        info!(id = %item.id, actor, "archived manually");
        Ok(item)
    }

    /// Relocate every rejected item whose retention window has run out.
    /// Idempotent; returns the items archived by this call.
    pub fn sweep(&self) -> anyhow::Result<Vec<ApprovalItem>> {
        self.sweep_at(TimeStamp::new())
    }

    pub fn sweep_at(&self, now: TimeStamp<Utc>) -> anyhow::Result<Vec<ApprovalItem>> {
        let candidates: Vec<String> = self
            .store
            .list()?
            .into_iter()
            .filter(|item| item.is_archive_due(&now))
            .map(|item| item.id)
            .collect();

        let mut archived = Vec::new();
        for id in candidates {
            let _guard = self.guard();
            // Re-read under the lock: the item may have been resubmitted or
            // archived since the scan.
            let Some(mut item) = self.store.get(&id)? else {
                continue;
            };
            if !item.is_archive_due(&now) {
                continue;
            }

            item.record(HistoryEntry::new(
                now.clone(),
                SYSTEM_ACTOR.to_string(),
                HistoryAction::Archived,
                Some("automatic archival after retention period".to_string()),
            ));
            self.store.archive(&item)?;
            archived.push(item);
        }

        if !archived.is_empty() {
            info!(count = archived.len(), "archived overdue rejected items");
        }
        Ok(archived)
    }

    // One notification per distinct author (minus the acting user), plus a
    // separate self-notification, delivered as a single batch.
    fn notify(
        &self,
        item: &ApprovalItem,
        actor: &str,
        action: HistoryAction,
        note: Option<&str>,
        now: &TimeStamp<Utc>,
    ) {
        let mut batch: Vec<Notification> = item
            .recipients()
            .into_iter()
            .filter(|recipient| recipient != actor)
            .map(|recipient| Notification {
                recipient,
                title: item.title.clone(),
                body: author_body(item, actor, action, note),
                at: now.clone(),
                link: item.preview_url.clone(),
            })
            .collect();

        batch.push(Notification {
            recipient: actor.to_string(),
            title: item.title.clone(),
            body: format!("You {} \"{}\"", actor_phrase(action), item.title),
            at: now.clone(),
            link: item.preview_url.clone(),
        });

        if let Err(err) = self.notifier.deliver(&batch) {
            warn!(id = %item.id, error = %err, "notification delivery failed; transition stands");
        }
    }
}

fn normalised(note: Option<&str>) -> Option<&str> {
    note.map(str::trim).filter(|note| !note.is_empty())
}

fn author_body(
    item: &ApprovalItem,
    actor: &str,
    action: HistoryAction,
    note: Option<&str>,
) -> String {
    let what = match action {
        HistoryAction::Created => "submitted",
        HistoryAction::Pending => "resubmitted for approval",
        HistoryAction::Approved => "approved",
        HistoryAction::Rejected => "rejected",
        HistoryAction::Changes => "sent back for changes",
        HistoryAction::Archived => "archived",
    };
    match note {
        Some(note) => format!("\"{}\" was {what} by {actor}: {note}", item.title),
        None => format!("\"{}\" was {what} by {actor}", item.title),
    }
}

fn actor_phrase(action: HistoryAction) -> &'static str {
    match action {
        HistoryAction::Created => "submitted",
        HistoryAction::Pending => "resubmitted",
        HistoryAction::Approved => "approved",
        HistoryAction::Rejected => "rejected",
        HistoryAction::Changes => "requested changes on",
        HistoryAction::Archived => "archived",
    }
}
