//! Persisted sync settings over a narrow key-value contract.
//!
//! # Responsibility
//! - Read and write the three sync settings under one stable namespace.
//! - Provide SQLite and in-memory key-value backends.
//!
//! # Invariants
//! - Missing keys read as defaults: sync disabled, migration not completed,
//!   no last-sync timestamp.
//! - Settings change only through explicit setters or `reset`.
//! - No cross-field validation.

use crate::db::{open_db, DbError};
use chrono::{DateTime, SubsecRound, Utc};
use log::{info, warn};
use once_cell::sync::OnceCell;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const SETTINGS_NAMESPACE: &str = "wavelength.settings.";
pub const CLOUD_SYNC_ENABLED_KEY: &str = "wavelength.settings.cloud_sync_enabled";
pub const INITIAL_MIGRATION_KEY: &str = "wavelength.settings.has_completed_initial_migration";
pub const LAST_SYNC_TIMESTAMP_KEY: &str = "wavelength.settings.last_sync_timestamp";

pub type SettingsResult<T> = Result<T, SettingsError>;

#[derive(Debug)]
pub enum SettingsError {
    /// The backing database could not be opened.
    Unavailable(DbError),
    Sqlite(rusqlite::Error),
    /// A stored value does not parse as the setting's type.
    InvalidValue { key: String, value: String },
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(err) => write!(f, "settings store unavailable: {err}"),
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::InvalidValue { key, value } => {
                write!(f, "invalid stored value `{value}` for `{key}`")
            }
        }
    }
}

impl Error for SettingsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Unavailable(err) => Some(err),
            Self::Sqlite(err) => Some(err),
            Self::InvalidValue { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for SettingsError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Minimal string key-value contract shared with the host app.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> SettingsResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> SettingsResult<()>;
    /// Removing an absent key is not an error.
    fn remove(&self, key: &str) -> SettingsResult<()>;
}

#[derive(Default)]
pub struct InMemoryKeyValueStore {
    values: Mutex<HashMap<String, String>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> SettingsResult<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> SettingsResult<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> SettingsResult<()> {
        self.lock().remove(key);
        Ok(())
    }
}

/// Key-value store over the `key_value_entries` table, opened on first use.
///
/// Shares the database file with the journal store; each side keeps its own
/// connection.
pub struct SqliteKeyValueStore {
    path: PathBuf,
    conn: OnceCell<Mutex<Connection>>,
}

impl SqliteKeyValueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: OnceCell::new(),
        }
    }

    fn connection(&self) -> SettingsResult<MutexGuard<'_, Connection>> {
        let conn = self.conn.get_or_try_init(|| {
            open_db(&self.path)
                .map(Mutex::new)
                .map_err(SettingsError::Unavailable)
        })?;
        Ok(conn.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> SettingsResult<Option<String>> {
        let value = self
            .connection()?
            .query_row(
                "SELECT value FROM key_value_entries WHERE key = ?1;",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> SettingsResult<()> {
        self.connection()?.execute(
            "INSERT INTO key_value_entries (key, value, updated_at)
             VALUES (?1, ?2, (strftime('%s', 'now') * 1000))
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at;",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> SettingsResult<()> {
        self.connection()?
            .execute("DELETE FROM key_value_entries WHERE key = ?1;", [key])?;
        Ok(())
    }
}

/// Injected settings handle; cheap to clone, all clones share one backend.
#[derive(Clone)]
pub struct SyncSettings {
    store: Arc<dyn KeyValueStore>,
}

impl SyncSettings {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Settings backed by a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryKeyValueStore::new()))
    }

    /// Defaults to `false`: entries stay local until the user opts in.
    pub fn cloud_sync_enabled(&self) -> SettingsResult<bool> {
        self.get_bool(CLOUD_SYNC_ENABLED_KEY)
    }

    pub fn set_cloud_sync_enabled(&self, enabled: bool) -> SettingsResult<()> {
        if let Err(err) = self.store.set(CLOUD_SYNC_ENABLED_KEY, bool_to_text(enabled)) {
            warn!(
                "event=settings_update module=settings status=error key=cloud_sync_enabled error={}",
                err
            );
            return Err(err);
        }
        info!(
            "event=settings_update module=settings status=ok key=cloud_sync_enabled value={}",
            enabled
        );
        Ok(())
    }

    pub fn has_completed_initial_migration(&self) -> SettingsResult<bool> {
        self.get_bool(INITIAL_MIGRATION_KEY)
    }

    pub fn set_has_completed_initial_migration(&self, completed: bool) -> SettingsResult<()> {
        self.store
            .set(INITIAL_MIGRATION_KEY, bool_to_text(completed))
    }

    pub fn last_sync_timestamp(&self) -> SettingsResult<Option<DateTime<Utc>>> {
        let Some(value) = self.store.get(LAST_SYNC_TIMESTAMP_KEY)? else {
            return Ok(None);
        };
        value
            .parse::<i64>()
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(Some)
            .ok_or_else(|| invalid_value(LAST_SYNC_TIMESTAMP_KEY, value))
    }

    /// Stored at millisecond precision.
    pub fn set_last_sync_timestamp(&self, at: DateTime<Utc>) -> SettingsResult<()> {
        self.store.set(
            LAST_SYNC_TIMESTAMP_KEY,
            &at.trunc_subsecs(3).timestamp_millis().to_string(),
        )
    }

    pub fn clear_last_sync_timestamp(&self) -> SettingsResult<()> {
        self.store.remove(LAST_SYNC_TIMESTAMP_KEY)
    }

    /// Removes all three settings so every getter reports its default.
    pub fn reset(&self) -> SettingsResult<()> {
        for key in [
            CLOUD_SYNC_ENABLED_KEY,
            INITIAL_MIGRATION_KEY,
            LAST_SYNC_TIMESTAMP_KEY,
        ] {
            self.store.remove(key)?;
        }
        info!("event=settings_reset module=settings status=ok");
        Ok(())
    }

    fn get_bool(&self, key: &str) -> SettingsResult<bool> {
        match self.store.get(key)?.as_deref() {
            None => Ok(false),
            Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(other) => Err(invalid_value(key, other.to_string())),
        }
    }
}

fn bool_to_text(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn invalid_value(key: &str, value: String) -> SettingsError {
    SettingsError::InvalidValue {
        key: key.to_string(),
        value,
    }
}
