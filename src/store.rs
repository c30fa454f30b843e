//! Item and archive persistence
//!
//! The state machine is written against the [`ApprovalStore`] trait so the
//! embedding application can substitute a real database. Two implementations
//! are provided: [`SledStore`] for persistence and [`MemoryStore`] for tests.
use super::item::ApprovalItem;
use sled::Batch;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Keyed persistence for live and archived approval items.
///
/// An item must be observable in at most one of the two sides; `archive`
/// performs the live-to-archive move atomically.
pub trait ApprovalStore {
    fn get(&self, id: &str) -> anyhow::Result<Option<ApprovalItem>>;
    fn put(&self, item: &ApprovalItem) -> anyhow::Result<()>;
    fn remove(&self, id: &str) -> anyhow::Result<Option<ApprovalItem>>;
    fn list(&self) -> anyhow::Result<Vec<ApprovalItem>>;

    /// Remove the item from the live side and insert it at the front of the
    /// archive, as a single atomic step.
    fn archive(&self, item: &ApprovalItem) -> anyhow::Result<()>;
    fn get_archived(&self, id: &str) -> anyhow::Result<Option<ApprovalItem>>;
    /// Archived items, most recently archived first.
    fn list_archived(&self) -> anyhow::Result<Vec<ApprovalItem>>;
}

const ITEM_PREFIX: &str = "item/";
const ARCHIVE_PREFIX: &str = "arch/";

/// Sled-backed store. Records are minicbor encoded in a single keyspace:
/// live items under `item/<id>`, archived items under `arch/<rev-seq>/<id>`
/// where `rev-seq` counts down so natural key order is newest-first.
pub struct SledStore {
    instance: Arc<sled::Db>,
}

impl SledStore {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self { instance }
    }

    fn item_key(id: &str) -> String {
        format!("{ITEM_PREFIX}{id}")
    }

    fn archive_key(&self, id: &str) -> anyhow::Result<String> {
        let seq = self.instance.generate_id()?;
        Ok(format!("{ARCHIVE_PREFIX}{:016x}/{id}", u64::MAX - seq))
    }

    fn scan(&self, prefix: &str) -> anyhow::Result<Vec<ApprovalItem>> {
        let mut items = Vec::new();
        for entry in self.instance.scan_prefix(prefix.as_bytes()) {
            let (_, value) = entry?;
            items.push(minicbor::decode(value.as_ref())?);
        }
        Ok(items)
    }
}

impl ApprovalStore for SledStore {
    fn get(&self, id: &str) -> anyhow::Result<Option<ApprovalItem>> {
        match self.instance.get(Self::item_key(id).as_bytes())? {
            Some(value) => Ok(Some(minicbor::decode(value.as_ref())?)),
            None => Ok(None),
        }
    }

    fn put(&self, item: &ApprovalItem) -> anyhow::Result<()> {
        let encoded = minicbor::to_vec(item)?;
        self.instance
            .insert(Self::item_key(&item.id).as_bytes(), encoded)?;
        self.instance.flush()?;
        Ok(())
    }

    fn remove(&self, id: &str) -> anyhow::Result<Option<ApprovalItem>> {
        let previous = self.instance.remove(Self::item_key(id).as_bytes())?;
        self.instance.flush()?;
        match previous {
            Some(value) => Ok(Some(minicbor::decode(value.as_ref())?)),
            None => Ok(None),
        }
    }

    fn list(&self) -> anyhow::Result<Vec<ApprovalItem>> {
        self.scan(ITEM_PREFIX)
    }

    fn archive(&self, item: &ApprovalItem) -> anyhow::Result<()> {
        let encoded = minicbor::to_vec(item)?;

        // Batch insert: drop the live record and land the archived one
        let mut batch = Batch::default();
        batch.remove(Self::item_key(&item.id).as_bytes());
        batch.insert(self.archive_key(&item.id)?.as_bytes(), encoded);
        self.instance.apply_batch(batch)?;
        self.instance.flush()?;

        Ok(())
    }

    fn get_archived(&self, id: &str) -> anyhow::Result<Option<ApprovalItem>> {
        Ok(self
            .scan(ARCHIVE_PREFIX)?
            .into_iter()
            .find(|item| item.id == id))
    }

    fn list_archived(&self) -> anyhow::Result<Vec<ApprovalItem>> {
        self.scan(ARCHIVE_PREFIX)
    }
}

#[derive(Default)]
struct MemoryInner {
    live: HashMap<String, ApprovalItem>,
    archived: Vec<ApprovalItem>, // newest first
}

/// In-memory store for unit tests and for embedding without persistence.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ApprovalStore for MemoryStore {
    fn get(&self, id: &str) -> anyhow::Result<Option<ApprovalItem>> {
        Ok(self.lock().live.get(id).cloned())
    }

    fn put(&self, item: &ApprovalItem) -> anyhow::Result<()> {
        self.lock().live.insert(item.id.clone(), item.clone());
        Ok(())
    }

    fn remove(&self, id: &str) -> anyhow::Result<Option<ApprovalItem>> {
        Ok(self.lock().live.remove(id))
    }

    fn list(&self) -> anyhow::Result<Vec<ApprovalItem>> {
        Ok(self.lock().live.values().cloned().collect())
    }

    fn archive(&self, item: &ApprovalItem) -> anyhow::Result<()> {
        let mut inner = self.lock();
        inner.live.remove(&item.id);
        inner.archived.insert(0, item.clone());
        Ok(())
    }

    fn get_archived(&self, id: &str) -> anyhow::Result<Option<ApprovalItem>> {
        Ok(self
            .lock()
            .archived
            .iter()
            .find(|item| item.id == id)
            .cloned())
    }

    fn list_archived(&self) -> anyhow::Result<Vec<ApprovalItem>> {
        Ok(self.lock().archived.clone())
    }
}
