//! Core approval item types and the submission draft builder
use super::error::DraftError;
use super::history::{HistoryAction, HistoryEntry};
use chrono::{DateTime, Duration, TimeZone, Utc};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Eq, PartialEq, Clone, Copy)]
pub enum ItemStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
    #[n(3)]
    Changes,
}

/// What staff submitted for review. Kind-specific payload lives on the
/// variant so a revision without versions (or a request without a
/// justification) cannot be constructed.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Eq, PartialEq, Clone)]
pub enum ItemKind {
    #[n(0)]
    Document,
    #[n(1)]
    Report,
    #[n(2)]
    Revision {
        #[n(0)]
        base_version: String,
        #[n(1)]
        proposed_version: String,
        #[n(2)]
        change_summary: String,
    },
    #[n(3)]
    Request {
        #[n(0)]
        request_type: String,
        #[n(1)]
        justification: String,
    },
}

/// The approver-facing transition target. Resubmission and archival have
/// their own operations, so neither appears here.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum Decision {
    Approved,
    Rejected,
    Changes,
}

impl Decision {
    pub fn status(self) -> ItemStatus {
        match self {
            Decision::Approved => ItemStatus::Approved,
            Decision::Rejected => ItemStatus::Rejected,
            Decision::Changes => ItemStatus::Changes,
        }
    }

    pub fn action(self) -> HistoryAction {
        match self {
            Decision::Approved => HistoryAction::Approved,
            Decision::Rejected => HistoryAction::Rejected,
            Decision::Changes => HistoryAction::Changes,
        }
    }

    /// Rejections and change requests must carry a note for the submitter.
    pub fn requires_note(self) -> bool {
        !matches!(self, Decision::Approved)
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Approved => write!(f, "approved"),
            Decision::Rejected => write!(f, "rejected"),
            Decision::Changes => write!(f, "changes requested"),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    /// Offset used to compute retention deadlines.
    pub fn plus_days(&self, days: i64) -> Self {
        Self(self.0 + Duration::days(days))
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl std::fmt::Display for TimeStamp<Utc> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M"))
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// A live or archived approval item. This is the record persisted under the
/// item's id; the embedded history is append-only and chronological.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Eq, PartialEq, Clone)]
pub struct ApprovalItem {
    #[n(0)]
    pub id: String, // uuid7, bech32m encoded
    #[n(1)]
    pub kind: ItemKind,
    #[n(2)]
    pub title: String,
    #[n(3)]
    pub category: String,
    #[n(4)]
    pub external_ref: Option<String>,
    #[n(5)]
    pub submitted_by: String,
    #[n(6)]
    pub authors: Vec<String>, // empty means notify submitted_by only
    #[n(7)]
    pub assignee: String,
    #[n(8)]
    pub status: ItemStatus,
    #[n(9)]
    pub submitted_at: TimeStamp<Utc>,
    #[n(10)]
    pub due_at: Option<TimeStamp<Utc>>,
    #[n(11)]
    pub preview_url: Option<String>,
    #[n(12)]
    pub download_url: Option<String>,
    #[n(13)]
    pub rejected_at: Option<TimeStamp<Utc>>,
    #[n(14)]
    pub archive_at: Option<TimeStamp<Utc>>, // present iff status == Rejected
    #[n(15)]
    pub history: Vec<HistoryEntry>,
}

impl ApprovalItem {
    pub fn record(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
    }

    /// Distinct notification recipients: the listed authors, falling back to
    /// the submitter when none were given.
    pub fn recipients(&self) -> Vec<String> {
        if self.authors.is_empty() {
            return vec![self.submitted_by.clone()];
        }

        let mut seen = std::collections::HashSet::new();
        self.authors
            .iter()
            .filter(|author| seen.insert(author.as_str()))
            .cloned()
            .collect()
    }

    /// True once the retention window on a rejection has run out.
    pub fn is_archive_due(&self, now: &TimeStamp<Utc>) -> bool {
        self.status == ItemStatus::Rejected
            && self.archive_at.as_ref().is_some_and(|deadline| deadline <= now)
    }

    /// Render the audit trail for display, oldest entry first.
    pub fn history_lines(&self) -> Vec<String> {
        self.history.iter().map(|entry| entry.to_string()).collect()
    }
}

/// Builder for a submission. The surrounding application assembles one of
/// these from its forms; `ApprovalService::submit` validates and finalises it.
#[derive(Debug, Default)]
pub struct ItemDraft {
    kind: Option<ItemKind>,
    title: Option<String>,
    category: Option<String>,
    external_ref: Option<String>,
    submitted_by: Option<String>,
    authors: Vec<String>,
    assignee: Option<String>,
    due_at: Option<TimeStamp<Utc>>,
    preview_url: Option<String>,
    download_url: Option<String>,
}

impl ItemDraft {
    /// Construct a new builder object, this becomes the basis for a submission
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_kind(mut self, kind: ItemKind) -> Self {
        self.kind = Some(kind);
        self
    }
    pub fn set_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }
    pub fn set_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }
    pub fn set_external_ref(mut self, external_ref: &str) -> Self {
        self.external_ref = Some(external_ref.to_string());
        self
    }
    pub fn set_submitted_by(mut self, submitted_by: &str) -> Self {
        self.submitted_by = Some(submitted_by.to_string());
        self
    }
    pub fn add_author(mut self, author: &str) -> Self {
        self.authors.push(author.to_string());
        self
    }
    pub fn set_assignee(mut self, assignee: &str) -> Self {
        self.assignee = Some(assignee.to_string());
        self
    }
    pub fn set_due_at(mut self, due_at: TimeStamp<Utc>) -> Self {
        self.due_at = Some(due_at);
        self
    }
    pub fn set_preview_url(mut self, preview_url: &str) -> Self {
        self.preview_url = Some(preview_url.to_string());
        self
    }
    pub fn set_download_url(mut self, download_url: &str) -> Self {
        self.download_url = Some(download_url.to_string());
        self
    }

    // Checks fields, then finalises into the live record with its opening
    // "created" ledger entry.
    pub fn validate_and_finalise(
        self,
        id: String,
        submitted_at: TimeStamp<Utc>,
    ) -> anyhow::Result<ApprovalItem> {
        let kind = self.kind.ok_or(DraftError::MissingField("kind"))?;
        let title = non_empty(self.title, "title")?;
        let category = non_empty(self.category, "category")?;
        let submitted_by = non_empty(self.submitted_by, "submitter")?;
        let assignee = non_empty(self.assignee, "assignee")?;

        if let ItemKind::Revision {
            base_version,
            proposed_version,
            ..
        } = &kind
        {
            if base_version.trim().is_empty() || proposed_version.trim().is_empty() {
                return Err(DraftError::EmptyField("revision versions").into());
            }
        }
        if let ItemKind::Request { justification, .. } = &kind {
            if justification.trim().is_empty() {
                return Err(DraftError::EmptyField("request justification").into());
            }
        }

        let opening = HistoryEntry::new(
            submitted_at.clone(),
            submitted_by.clone(),
            HistoryAction::Created,
            None,
        );

        Ok(ApprovalItem {
            id,
            kind,
            title,
            category,
            external_ref: self.external_ref,
            submitted_by,
            authors: self.authors,
            assignee,
            status: ItemStatus::Pending,
            submitted_at,
            due_at: self.due_at,
            preview_url: self.preview_url,
            download_url: self.download_url,
            rejected_at: None,
            archive_at: None,
            history: vec![opening],
        })
    }
}

fn non_empty(value: Option<String>, field: &'static str) -> Result<String, DraftError> {
    match value {
        None => Err(DraftError::MissingField(field)),
        Some(v) if v.trim().is_empty() => Err(DraftError::EmptyField(field)),
        Some(v) => Ok(v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn item_encoding() {
        let item = ItemDraft::new()
            .set_kind(ItemKind::Report)
            .set_title("Weekly costs")
            .set_category("finance")
            .set_submitted_by("alice")
            .set_assignee("director")
            .validate_and_finalise("item_test".to_string(), TimeStamp::new())
            .unwrap();

        let encoding = minicbor::to_vec(&item).unwrap();
        let decode: ApprovalItem = minicbor::decode(&encoding).unwrap();

        assert_eq!(item, decode);
    }

    #[test]
    fn recipients_default_to_submitter() {
        let item = ItemDraft::new()
            .set_kind(ItemKind::Document)
            .set_title("Allergen matrix")
            .set_category("compliance")
            .set_submitted_by("alice")
            .set_assignee("director")
            .validate_and_finalise("item_test".to_string(), TimeStamp::new())
            .unwrap();

        assert_eq!(item.recipients(), vec!["alice".to_string()]);
    }

    #[test]
    fn recipients_deduplicate_authors() {
        let item = ItemDraft::new()
            .set_kind(ItemKind::Document)
            .set_title("Allergen matrix")
            .set_category("compliance")
            .set_submitted_by("alice")
            .add_author("bob")
            .add_author("carol")
            .add_author("bob")
            .set_assignee("director")
            .validate_and_finalise("item_test".to_string(), TimeStamp::new())
            .unwrap();

        assert_eq!(
            item.recipients(),
            vec!["bob".to_string(), "carol".to_string()]
        );
    }

    #[test]
    fn draft_rejects_blank_title() {
        let result = ItemDraft::new()
            .set_kind(ItemKind::Document)
            .set_title("   ")
            .set_category("compliance")
            .set_submitted_by("alice")
            .set_assignee("director")
            .validate_and_finalise("item_test".to_string(), TimeStamp::new());

        assert!(result.is_err());
    }

    #[test]
    fn draft_rejects_request_without_justification() {
        let result = ItemDraft::new()
            .set_kind(ItemKind::Request {
                request_type: "purchase".to_string(),
                justification: "".to_string(),
            })
            .set_title("New mixer")
            .set_category("equipment")
            .set_submitted_by("alice")
            .set_assignee("director")
            .validate_and_finalise("item_test".to_string(), TimeStamp::new());

        assert!(result.is_err());
    }
}
