//! Durable SQLite store for journal entry rows.
//!
//! # Responsibility
//! - Own the connection to the `journal_entries` table.
//! - Provide keyed row operations and the indexed reads the repository needs.
//!
//! # Invariants
//! - Writes go through one mutex-guarded connection, so writers are serialized.
//! - Every write validates the record and the sync-status transition first.
//! - Updates only rewrite sync bookkeeping; user-supplied columns are fixed
//!   at insert.
//! - Reads never mask invalid persisted state: one bad row aborts the fetch.
//! - Sequences of calls are not atomic; callers own that discipline.

use crate::db::{open_db, open_db_in_memory, DbError};
use crate::model::journal::{
    InitiatedBy, JournalRecord, NewJournalEntry, RecordId, RecordValidationError, ServerId,
    SyncStatus,
};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

const RECORD_SELECT_SQL: &str = "SELECT
    id,
    server_id,
    created_at,
    user_id,
    primary_curriculum_id,
    secondary_curriculum_id,
    strategy_id,
    initiated_by,
    sync_status,
    last_sync_attempt
FROM journal_entries";

const RECORD_ORDER_SQL: &str = "ORDER BY created_at DESC, id ASC";

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the journal store and every repository built on it.
#[derive(Debug)]
pub enum StoreError {
    /// The database could not be opened or migrated. Nothing proceeds.
    Unavailable(DbError),
    /// A single row operation failed; the caller decides whether to retry.
    RowOperationFailed(rusqlite::Error),
    /// A persisted row could not be decoded into a valid record.
    MalformedRow(String),
    DuplicateKey(RecordId),
    DuplicateServerId(ServerId),
    NotFound(RecordId),
    InvalidTransition {
        id: RecordId,
        from: SyncStatus,
        to: SyncStatus,
    },
    /// An update tried to rewrite a user-supplied column.
    ImmutableFieldChanged {
        id: RecordId,
        field: &'static str,
    },
    Validation(RecordValidationError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(err) => write!(f, "journal store unavailable: {err}"),
            Self::RowOperationFailed(err) => write!(f, "journal row operation failed: {err}"),
            Self::MalformedRow(message) => write!(f, "malformed journal row: {message}"),
            Self::DuplicateKey(id) => write!(f, "journal record already exists: {id}"),
            Self::DuplicateServerId(server_id) => {
                write!(f, "server id already assigned to another record: {server_id}")
            }
            Self::NotFound(id) => write!(f, "journal record not found: {id}"),
            Self::InvalidTransition { id, from, to } => {
                write!(f, "record {id} cannot move from {from} to {to}")
            }
            Self::ImmutableFieldChanged { id, field } => {
                write!(f, "record {id} cannot change `{field}` after it is stored")
            }
            Self::Validation(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Unavailable(err) => Some(err),
            Self::RowOperationFailed(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::MalformedRow(_)
            | Self::DuplicateKey(_)
            | Self::DuplicateServerId(_)
            | Self::NotFound(_)
            | Self::InvalidTransition { .. }
            | Self::ImmutableFieldChanged { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::RowOperationFailed(value)
    }
}

impl From<RecordValidationError> for StoreError {
    fn from(value: RecordValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Connection-owning store for journal rows.
pub struct JournalStore {
    conn: Mutex<Connection>,
}

impl JournalStore {
    /// Opens (creating if needed) the database file and applies migrations.
    ///
    /// Opening an existing, migrated file again is a no-op on its schema.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = open_db(path).map_err(StoreError::Unavailable)?;
        Ok(Self::from_connection(conn))
    }

    /// Opens a private in-memory database with the full schema.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = open_db_in_memory().map_err(StoreError::Unavailable)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the guard leaves SQLite itself consistent.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts a new row.
    ///
    /// # Errors
    /// - `DuplicateKey` when `record.id()` already exists.
    /// - `DuplicateServerId` when another row owns the same server id.
    pub fn insert(&self, record: &JournalRecord) -> StoreResult<()> {
        record.validate()?;

        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if row_exists(&tx, record.id())? {
            return Err(StoreError::DuplicateKey(record.id()));
        }
        ensure_server_id_free(&tx, record)?;

        tx.execute(
            "INSERT INTO journal_entries (
                id,
                server_id,
                created_at,
                user_id,
                primary_curriculum_id,
                secondary_curriculum_id,
                strategy_id,
                initiated_by,
                sync_status,
                last_sync_attempt
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
            params![
                record.id().to_string(),
                record.server_id(),
                record.created_at.timestamp_millis(),
                record.user_id,
                record.primary_curriculum_id,
                record.secondary_curriculum_id,
                record.strategy_id,
                record.initiated_by.as_str(),
                record.sync_status().as_str(),
                record.last_sync_attempt().map(|at| at.timestamp_millis()),
            ],
        )?;
        tx.commit()?;

        debug!(
            "event=journal_insert module=store status=ok sync_status={}",
            record.sync_status()
        );
        Ok(())
    }

    /// Rewrites the sync bookkeeping columns of an existing row.
    ///
    /// # Errors
    /// - `NotFound` when no row has `record.id()`.
    /// - `InvalidTransition` when the stored status cannot move to the new one.
    /// - `ImmutableFieldChanged` when a user-supplied field differs from the row.
    /// - `DuplicateServerId` when another row owns the same server id.
    pub fn update(&self, record: &JournalRecord) -> StoreResult<()> {
        record.validate()?;

        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let stored =
            select_record(&tx, record.id())?.ok_or(StoreError::NotFound(record.id()))?;
        let from = stored.sync_status();
        let to = record.sync_status();
        if !from.can_transition_to(to) {
            warn!(
                "event=journal_update module=store status=rejected error_code=invalid_transition from={} to={}",
                from, to
            );
            return Err(StoreError::InvalidTransition {
                id: record.id(),
                from,
                to,
            });
        }
        if let Some(field) = record.changed_immutable_field(&stored) {
            warn!(
                "event=journal_update module=store status=rejected error_code=immutable_field_changed field={}",
                field
            );
            return Err(StoreError::ImmutableFieldChanged {
                id: record.id(),
                field,
            });
        }
        ensure_server_id_free(&tx, record)?;

        tx.execute(
            "UPDATE journal_entries
             SET
                server_id = ?1,
                sync_status = ?2,
                last_sync_attempt = ?3
             WHERE id = ?4;",
            params![
                record.server_id(),
                to.as_str(),
                record.last_sync_attempt().map(|at| at.timestamp_millis()),
                record.id().to_string(),
            ],
        )?;
        tx.commit()?;

        debug!(
            "event=journal_update module=store status=ok from={} to={}",
            from, to
        );
        Ok(())
    }

    /// Removes one row.
    pub fn delete(&self, id: RecordId) -> StoreResult<()> {
        let changed = self
            .lock()
            .execute("DELETE FROM journal_entries WHERE id = ?1;", [id.to_string()])?;

        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }

        Ok(())
    }

    pub fn fetch(&self, id: RecordId) -> StoreResult<Option<JournalRecord>> {
        select_record(&self.lock(), id)
    }

    /// Returns every row, newest `created_at` first.
    pub fn fetch_all(&self) -> StoreResult<Vec<JournalRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("{RECORD_SELECT_SQL} {RECORD_ORDER_SQL};"))?;
        let mut rows = stmt.query([])?;
        collect_records(&mut rows)
    }

    /// Returns rows in any of `statuses`, newest `created_at` first.
    pub fn fetch_by_statuses(&self, statuses: &[SyncStatus]) -> StoreResult<Vec<JournalRecord>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (1..=statuses.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "{RECORD_SELECT_SQL} WHERE sync_status IN ({placeholders}) {RECORD_ORDER_SQL};"
        ))?;
        let mut rows = stmt.query(rusqlite::params_from_iter(
            statuses.iter().map(|status| status.as_str()),
        ))?;
        collect_records(&mut rows)
    }

    pub fn fetch_by_status(&self, status: SyncStatus) -> StoreResult<Vec<JournalRecord>> {
        self.fetch_by_statuses(&[status])
    }

    pub fn count(&self) -> StoreResult<u64> {
        let count: i64 =
            self.lock()
                .query_row("SELECT COUNT(*) FROM journal_entries;", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

fn select_record(conn: &Connection, id: RecordId) -> StoreResult<Option<JournalRecord>> {
    let mut stmt = conn.prepare(&format!("{RECORD_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_record_row(row)?));
    }

    Ok(None)
}

fn row_exists(conn: &Connection, id: RecordId) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM journal_entries WHERE id = ?1);",
        [id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn ensure_server_id_free(conn: &Connection, record: &JournalRecord) -> StoreResult<()> {
    let Some(server_id) = record.server_id() else {
        return Ok(());
    };
    let owner: Option<String> = conn
        .query_row(
            "SELECT id FROM journal_entries WHERE server_id = ?1;",
            [server_id],
            |row| row.get(0),
        )
        .optional()?;
    match owner {
        Some(owner) if owner != record.id().to_string() => {
            Err(StoreError::DuplicateServerId(server_id))
        }
        _ => Ok(()),
    }
}

fn collect_records(rows: &mut rusqlite::Rows<'_>) -> StoreResult<Vec<JournalRecord>> {
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(parse_record_row(row)?);
    }
    Ok(records)
}

fn parse_record_row(row: &Row<'_>) -> StoreResult<JournalRecord> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text).map_err(|_| {
        StoreError::MalformedRow(format!("invalid uuid value `{id_text}` in journal_entries.id"))
    })?;

    let initiated_text: String = row.get("initiated_by")?;
    let initiated_by = InitiatedBy::parse(&initiated_text).ok_or_else(|| {
        StoreError::MalformedRow(format!(
            "invalid initiated_by `{initiated_text}` in journal_entries.initiated_by"
        ))
    })?;

    let status_text: String = row.get("sync_status")?;
    let sync_status = SyncStatus::parse(&status_text).ok_or_else(|| {
        StoreError::MalformedRow(format!(
            "invalid sync status `{status_text}` in journal_entries.sync_status"
        ))
    })?;

    let created_at = millis_to_instant(row.get("created_at")?, "created_at")?;
    let last_sync_attempt = match row.get::<_, Option<i64>>("last_sync_attempt")? {
        Some(millis) => Some(millis_to_instant(millis, "last_sync_attempt")?),
        None => None,
    };

    let entry = NewJournalEntry {
        created_at,
        user_id: row.get("user_id")?,
        primary_curriculum_id: row.get("primary_curriculum_id")?,
        secondary_curriculum_id: row.get("secondary_curriculum_id")?,
        strategy_id: row.get("strategy_id")?,
        initiated_by,
    };

    JournalRecord::from_parts(
        id,
        row.get("server_id")?,
        entry,
        sync_status,
        last_sync_attempt,
    )
    .map_err(|err| StoreError::MalformedRow(format!("record {id}: {err}")))
}

fn millis_to_instant(millis: i64, column: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
        StoreError::MalformedRow(format!(
            "timestamp `{millis}` out of range in journal_entries.{column}"
        ))
    })
}
