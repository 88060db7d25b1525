//! Journal repository contract and its two implementations.
//!
//! # Responsibility
//! - Define the use-case oriented data access contract for journal records.
//! - Provide a lazily opened SQLite implementation and an in-memory double.
//!
//! # Invariants
//! - Both implementations honor the same errors and ordering: newest
//!   `created_at` first, ties by ascending id.
//! - Store errors propagate unchanged.
//! - `update` only accepts changes to sync bookkeeping.
//! - A repository instance is meant to have one serialized owner; sequences
//!   of calls are not atomic.

use crate::model::journal::{JournalRecord, RecordId, SyncStatus};
use crate::store::journal_store::{JournalStore, StoreError, StoreResult};
use log::info;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const PENDING_SYNC_STATUSES: [SyncStatus; 2] = [SyncStatus::Pending, SyncStatus::Failed];

/// Repository interface for journal record persistence.
pub trait JournalRepository {
    /// Persists a new record.
    fn save(&self, record: &JournalRecord) -> StoreResult<()>;
    /// Replaces an existing record by id.
    fn update(&self, record: &JournalRecord) -> StoreResult<()>;
    fn delete(&self, id: RecordId) -> StoreResult<()>;
    fn fetch(&self, id: RecordId) -> StoreResult<Option<JournalRecord>>;
    /// Returns all records, newest first.
    fn fetch_all(&self) -> StoreResult<Vec<JournalRecord>>;
    /// Returns `pending` and `failed` records, newest first.
    fn fetch_pending_sync(&self) -> StoreResult<Vec<JournalRecord>>;
    fn count(&self) -> StoreResult<u64>;
}

macro_rules! forward_journal_repository {
    ($($target:ty),+) => {$(
        impl<R: JournalRepository + ?Sized> JournalRepository for $target {
            fn save(&self, record: &JournalRecord) -> StoreResult<()> {
                (**self).save(record)
            }

            fn update(&self, record: &JournalRecord) -> StoreResult<()> {
                (**self).update(record)
            }

            fn delete(&self, id: RecordId) -> StoreResult<()> {
                (**self).delete(id)
            }

            fn fetch(&self, id: RecordId) -> StoreResult<Option<JournalRecord>> {
                (**self).fetch(id)
            }

            fn fetch_all(&self) -> StoreResult<Vec<JournalRecord>> {
                (**self).fetch_all()
            }

            fn fetch_pending_sync(&self) -> StoreResult<Vec<JournalRecord>> {
                (**self).fetch_pending_sync()
            }

            fn count(&self) -> StoreResult<u64> {
                (**self).count()
            }
        }
    )+};
}

forward_journal_repository!(&R, Arc<R>);

/// Where a lazily opened store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    Memory,
}

/// SQLite-backed repository that opens its store on first use.
pub struct SqliteJournalRepository {
    location: StoreLocation,
    store: OnceCell<JournalStore>,
}

impl SqliteJournalRepository {
    pub fn new(location: StoreLocation) -> Self {
        Self {
            location,
            store: OnceCell::new(),
        }
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self::new(StoreLocation::File(path.into()))
    }

    pub fn in_memory() -> Self {
        Self::new(StoreLocation::Memory)
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Returns whether the underlying store has been opened yet.
    pub fn is_open(&self) -> bool {
        self.store.get().is_some()
    }

    /// Opens the store if needed.
    ///
    /// A failed open is not cached; the next call tries again.
    fn store(&self) -> StoreResult<&JournalStore> {
        self.store.get_or_try_init(|| {
            let store = match &self.location {
                StoreLocation::File(path) => JournalStore::open(path),
                StoreLocation::Memory => JournalStore::open_in_memory(),
            }?;
            info!("event=repo_open module=repo status=ok");
            Ok(store)
        })
    }
}

impl JournalRepository for SqliteJournalRepository {
    fn save(&self, record: &JournalRecord) -> StoreResult<()> {
        self.store()?.insert(record)
    }

    fn update(&self, record: &JournalRecord) -> StoreResult<()> {
        self.store()?.update(record)
    }

    fn delete(&self, id: RecordId) -> StoreResult<()> {
        self.store()?.delete(id)
    }

    fn fetch(&self, id: RecordId) -> StoreResult<Option<JournalRecord>> {
        self.store()?.fetch(id)
    }

    fn fetch_all(&self) -> StoreResult<Vec<JournalRecord>> {
        self.store()?.fetch_all()
    }

    fn fetch_pending_sync(&self) -> StoreResult<Vec<JournalRecord>> {
        self.store()?.fetch_by_statuses(&PENDING_SYNC_STATUSES)
    }

    fn count(&self) -> StoreResult<u64> {
        self.store()?.count()
    }
}

/// I/O-free repository used by tests and previews.
#[derive(Default)]
pub struct InMemoryJournalRepository {
    records: Mutex<HashMap<RecordId, JournalRecord>>,
}

impl InMemoryJournalRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RecordId, JournalRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sorted(&self, filter: impl Fn(&JournalRecord) -> bool) -> Vec<JournalRecord> {
        let mut records = self
            .lock()
            .values()
            .filter(|record| filter(record))
            .cloned()
            .collect::<Vec<_>>();
        sort_newest_first(&mut records);
        records
    }
}

impl JournalRepository for InMemoryJournalRepository {
    fn save(&self, record: &JournalRecord) -> StoreResult<()> {
        record.validate()?;
        let mut records = self.lock();
        if records.contains_key(&record.id()) {
            return Err(StoreError::DuplicateKey(record.id()));
        }
        ensure_server_id_free(&records, record)?;
        records.insert(record.id(), record.clone());
        Ok(())
    }

    fn update(&self, record: &JournalRecord) -> StoreResult<()> {
        record.validate()?;
        let mut records = self.lock();
        let stored = records
            .get(&record.id())
            .ok_or(StoreError::NotFound(record.id()))?;
        let from = stored.sync_status();
        let to = record.sync_status();
        if !from.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                id: record.id(),
                from,
                to,
            });
        }
        if let Some(field) = record.changed_immutable_field(stored) {
            return Err(StoreError::ImmutableFieldChanged {
                id: record.id(),
                field,
            });
        }
        ensure_server_id_free(&records, record)?;
        records.insert(record.id(), record.clone());
        Ok(())
    }

    fn delete(&self, id: RecordId) -> StoreResult<()> {
        self.lock()
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }

    fn fetch(&self, id: RecordId) -> StoreResult<Option<JournalRecord>> {
        Ok(self.lock().get(&id).cloned())
    }

    fn fetch_all(&self) -> StoreResult<Vec<JournalRecord>> {
        Ok(self.sorted(|_| true))
    }

    fn fetch_pending_sync(&self) -> StoreResult<Vec<JournalRecord>> {
        Ok(self.sorted(|record| PENDING_SYNC_STATUSES.contains(&record.sync_status())))
    }

    fn count(&self) -> StoreResult<u64> {
        Ok(self.lock().len() as u64)
    }
}

fn ensure_server_id_free(
    records: &HashMap<RecordId, JournalRecord>,
    record: &JournalRecord,
) -> StoreResult<()> {
    let Some(server_id) = record.server_id() else {
        return Ok(());
    };
    let taken = records
        .values()
        .any(|other| other.id() != record.id() && other.server_id() == Some(server_id));
    if taken {
        return Err(StoreError::DuplicateServerId(server_id));
    }
    Ok(())
}

/// Orders records the way the SQLite store does.
///
/// Byte order of a uuid matches the order of its lowercase hyphenated text.
fn sort_newest_first(records: &mut [JournalRecord]) {
    records.sort_by(|left, right| {
        right
            .created_at
            .cmp(&left.created_at)
            .then_with(|| left.id().cmp(&right.id()))
    });
}
