//! Property-based tests for the approval item lifecycle
//!
//! This module uses proptest to verify that the state machine and the
//! retention sweeper behave correctly across a wide variety of operation
//! sequences. The ledger and retention logic are critical - bugs here
//! corrupt the audit trail or archive items that staff still expect to see.
//!
//! These tests focus on invariants that should hold regardless of the
//! specific sequence of decisions, resubmissions and sweeps, helping catch
//! edge cases that would be difficult to find with manual test selection.

use chrono::Utc;
use proptest::prelude::*;

use approval_desk::dispatch::{RecordingPublisher, RecordingSink};
use approval_desk::history::HistoryAction;
use approval_desk::item::{ApprovalItem, Decision, ItemDraft, ItemKind, ItemStatus, TimeStamp};
use approval_desk::retention::RETENTION_DAYS;
use approval_desk::service::ApprovalService;
use approval_desk::store::MemoryStore;

// These property tests cover:
//
// 1. Ledger head invariant - the first entry is always "created"
// 2. Retention fields present iff rejected, with a consistent deadline
// 3. Exactly one ledger entry per successful operation, none per failure
// 4. Sweep idempotency - a second sweep with no intervening writes is a no-op
// 5. Resubmission cancels archival for the whole retention window
//
// What these tests DON'T cover (deliberately):
//
// - Sled persistence (tempfile-backed coverage lives in integration tests)
// - Notification fan-out contents (covered by scenario tests)
//

type Service = ApprovalService<MemoryStore, RecordingPublisher, RecordingSink>;

#[derive(Debug, Clone, Copy)]
enum Op {
    Decide(Decision),
    Resubmit,
    Sweep,
}

fn memory_service() -> Service {
    ApprovalService::new(
        MemoryStore::new(),
        RecordingPublisher::new(),
        RecordingSink::new(),
    )
}

fn draft(title_seed: u32) -> ItemDraft {
    ItemDraft::new()
        .set_kind(ItemKind::Document)
        .set_title(&format!("Procedure {title_seed}"))
        .set_category("operations")
        .set_submitted_by("alice")
        .add_author("bob")
        .set_assignee("director")
}

fn apply(service: &Service, id: &str, op: Op, now: TimeStamp<Utc>) -> bool {
    match op {
        Op::Decide(decision) => service
            .transition_at(id, decision, "director", Some("reviewed"), now)
            .is_ok(),
        Op::Resubmit => service.resubmit_at(id, "alice", None, now).is_ok(),
        Op::Sweep => service.sweep_at(now).is_ok(),
    }
}

/// The item's current record, wherever it lives now.
fn current_record(service: &Service, id: &str) -> ApprovalItem {
    service
        .get(id)
        .or_else(|_| service.get_archived(id))
        .expect("item must be live or archived")
}

/// Strategy to generate a decision
fn decision_strategy() -> impl Strategy<Value = Decision> {
    prop_oneof![
        Just(Decision::Approved),
        Just(Decision::Rejected),
        Just(Decision::Changes),
    ]
}

/// Strategy to generate one lifecycle operation
fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => decision_strategy().prop_map(Op::Decide),
        1 => Just(Op::Resubmit),
        1 => Just(Op::Sweep),
    ]
}

/// Strategy to generate a sequence of operations (1 to 12)
fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op_strategy(), 1..=12)
}

/// Strategy to generate a submission date
fn submission_date_strategy() -> impl Strategy<Value = TimeStamp<Utc>> {
    (2020i32..=2030, 1u32..=12, 1u32..=28)
        .prop_map(|(year, month, day)| TimeStamp::new_with(year, month, day, 9, 0, 0))
}

proptest! {
    /// Property: the ledger never loses its head - whatever happens to an
    /// item, history stays non-empty and starts with "created".
    #[test]
    fn prop_ledger_head_is_always_created(
        ops in ops_strategy(),
        submitted_at in submission_date_strategy(),
        seed in any::<u32>(),
    ) {
        let service = memory_service();
        let item = service.submit_at(draft(seed), submitted_at.clone()).unwrap();

        let mut now = submitted_at;
        for op in ops {
            now = now.plus_days(1);
            apply(&service, &item.id, op, now.clone());

            let record = current_record(&service, &item.id);
            prop_assert!(!record.history.is_empty());
            prop_assert_eq!(record.history[0].action, HistoryAction::Created);
        }
    }

    /// Property: retention fields exist iff the item is rejected, and the
    /// archive deadline always sits exactly RETENTION_DAYS after rejection.
    #[test]
    fn prop_retention_fields_iff_rejected(
        ops in ops_strategy(),
        submitted_at in submission_date_strategy(),
        seed in any::<u32>(),
    ) {
        let service = memory_service();
        let item = service.submit_at(draft(seed), submitted_at.clone()).unwrap();

        let mut now = submitted_at;
        for op in ops {
            now = now.plus_days(1);
            apply(&service, &item.id, op, now.clone());

            let record = current_record(&service, &item.id);
            match record.status {
                ItemStatus::Rejected => {
                    let rejected_at = record.rejected_at.clone();
                    let archive_at = record.archive_at.clone();
                    prop_assert!(rejected_at.is_some());
                    prop_assert!(archive_at.is_some());
                    prop_assert_eq!(
                        archive_at.unwrap(),
                        rejected_at.unwrap().plus_days(RETENTION_DAYS)
                    );
                }
                _ => {
                    prop_assert!(record.rejected_at.is_none());
                    prop_assert!(record.archive_at.is_none());
                }
            }
        }
    }

    /// Property: a successful decision or resubmission appends exactly one
    /// ledger entry; a failed one appends none. Sweeps only ever add the
    /// final "archived" entry.
    #[test]
    fn prop_exactly_one_entry_per_successful_operation(
        ops in ops_strategy(),
        submitted_at in submission_date_strategy(),
        seed in any::<u32>(),
    ) {
        let service = memory_service();
        let item = service.submit_at(draft(seed), submitted_at.clone()).unwrap();

        let mut now = submitted_at;
        for op in ops {
            now = now.plus_days(1);
            let before = current_record(&service, &item.id).history.len();
            let applied = apply(&service, &item.id, op, now.clone());
            let after = current_record(&service, &item.id).history.len();

            match op {
                Op::Decide(_) | Op::Resubmit => {
                    let expected = if applied { before + 1 } else { before };
                    prop_assert_eq!(after, expected);
                }
                Op::Sweep => {
                    prop_assert!(after == before || after == before + 1);
                }
            }
        }
    }

    /// Property: sweeping twice at the same instant with no writes in
    /// between leaves both stores exactly as the first sweep did.
    #[test]
    fn prop_sweep_is_idempotent(
        ops in ops_strategy(),
        submitted_at in submission_date_strategy(),
        seed in any::<u32>(),
        gap_days in 0i64..=90,
    ) {
        let service = memory_service();
        let item = service.submit_at(draft(seed), submitted_at.clone()).unwrap();

        let mut now = submitted_at;
        for op in ops {
            now = now.plus_days(1);
            apply(&service, &item.id, op, now.clone());
        }

        let sweep_time = now.plus_days(gap_days);
        service.sweep_at(sweep_time.clone()).unwrap();
        let live_after_first = service.list().unwrap();
        let archived_after_first = service.list_archived().unwrap();

        let second = service.sweep_at(sweep_time).unwrap();
        prop_assert!(second.is_empty());
        prop_assert_eq!(service.list().unwrap(), live_after_first);
        prop_assert_eq!(service.list_archived().unwrap(), archived_after_first);
    }

    /// Property: once a rejected item is resubmitted, no later sweep may
    /// archive it - the countdown is gone, not paused.
    #[test]
    fn prop_resubmission_cancels_archival(
        submitted_at in submission_date_strategy(),
        resubmit_after in 1i64..=29,
        sweep_after in 30i64..=120,
        seed in any::<u32>(),
    ) {
        let service = memory_service();
        let item = service.submit_at(draft(seed), submitted_at.clone()).unwrap();

        let rejected_at = submitted_at.plus_days(1);
        service
            .transition_at(&item.id, Decision::Rejected, "director", Some("incomplete"), rejected_at.clone())
            .unwrap();
        service
            .resubmit_at(&item.id, "alice", None, rejected_at.plus_days(resubmit_after))
            .unwrap();

        let archived = service.sweep_at(rejected_at.plus_days(sweep_after)).unwrap();
        prop_assert!(archived.is_empty());

        let record = service.get(&item.id).unwrap();
        prop_assert_eq!(record.status, ItemStatus::Pending);
    }
}
