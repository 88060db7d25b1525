//! Journal record domain model.
//!
//! # Responsibility
//! - Define the canonical entry row shared by the store, sync and analytics.
//! - Own the sync-status state machine and its transition rules.
//!
//! # Invariants
//! - `id` is stable and never reused for another record.
//! - `server_id` is set iff `sync_status == Synced`.
//! - Status moves only `pending -> {synced, failed}` and
//!   `failed -> {pending, synced}`; `synced` is terminal.
//! - Only crate-internal code (the sync client) mutates sync state.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable, locally generated identifier of a journal record.
pub type RecordId = Uuid;

/// Identifier assigned by the remote service once it accepts an entry.
pub type ServerId = i64;

/// Who triggered the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitiatedBy {
    /// The user opened the app on their own.
    #[serde(rename = "self")]
    SelfInitiated,
    /// The entry answers a scheduled prompt.
    Scheduled,
}

impl InitiatedBy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SelfInitiated => "self",
            Self::Scheduled => "scheduled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "self" => Some(Self::SelfInitiated),
            "scheduled" => Some(Self::Scheduled),
            _ => None,
        }
    }
}

/// Whether the remote service has durably accepted an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "synced" => Some(Self::Synced),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns whether a persisted record may move from `self` to `next`.
    ///
    /// Keeping the same status is always allowed; it is a re-write, not a
    /// transition.
    pub fn can_transition_to(self, next: SyncStatus) -> bool {
        match (self, next) {
            (current, next) if current == next => true,
            (Self::Pending, Self::Synced | Self::Failed) => true,
            (Self::Failed, Self::Pending | Self::Synced) => true,
            _ => false,
        }
    }

    /// Returns whether the record still needs a remote submission.
    pub fn needs_sync(self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

impl Display for SyncStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation errors for record-level invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValidationError {
    /// A synced record has no server id.
    MissingServerId,
    /// A pending/failed record carries a server id.
    UnexpectedServerId { status: SyncStatus },
}

impl Display for RecordValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingServerId => write!(f, "synced record must carry a server id"),
            Self::UnexpectedServerId { status } => {
                write!(f, "{status} record must not carry a server id")
            }
        }
    }
}

impl Error for RecordValidationError {}

/// User-supplied fields of a new entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJournalEntry {
    pub created_at: DateTime<Utc>,
    pub user_id: i64,
    pub primary_curriculum_id: i64,
    pub secondary_curriculum_id: Option<i64>,
    pub strategy_id: Option<i64>,
    pub initiated_by: InitiatedBy,
}

impl NewJournalEntry {
    /// Draft stamped with the current instant and no optional fields.
    pub fn now(user_id: i64, primary_curriculum_id: i64, initiated_by: InitiatedBy) -> Self {
        Self {
            created_at: Utc::now(),
            user_id,
            primary_curriculum_id,
            secondary_curriculum_id: None,
            strategy_id: None,
            initiated_by,
        }
    }
}

/// One stored journal entry plus its sync bookkeeping.
///
/// Not `Deserialize`: records only come from `new` or the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalRecord {
    id: RecordId,
    server_id: Option<ServerId>,
    pub created_at: DateTime<Utc>,
    pub user_id: i64,
    pub primary_curriculum_id: i64,
    pub secondary_curriculum_id: Option<i64>,
    pub strategy_id: Option<i64>,
    pub initiated_by: InitiatedBy,
    sync_status: SyncStatus,
    last_sync_attempt: Option<DateTime<Utc>>,
}

impl JournalRecord {
    /// Creates a pending record with a freshly generated id.
    ///
    /// `created_at` is truncated to millisecond precision, the resolution the
    /// store persists.
    pub fn new(entry: NewJournalEntry) -> Self {
        Self::with_id(Uuid::new_v4(), entry)
    }

    /// Creates a pending record with a caller-provided id.
    pub(crate) fn with_id(id: RecordId, entry: NewJournalEntry) -> Self {
        Self {
            id,
            server_id: None,
            created_at: entry.created_at.trunc_subsecs(3),
            user_id: entry.user_id,
            primary_curriculum_id: entry.primary_curriculum_id,
            secondary_curriculum_id: entry.secondary_curriculum_id,
            strategy_id: entry.strategy_id,
            initiated_by: entry.initiated_by,
            sync_status: SyncStatus::Pending,
            last_sync_attempt: None,
        }
    }

    /// Rebuilds a record from persisted columns and validates it.
    pub(crate) fn from_parts(
        id: RecordId,
        server_id: Option<ServerId>,
        entry: NewJournalEntry,
        sync_status: SyncStatus,
        last_sync_attempt: Option<DateTime<Utc>>,
    ) -> Result<Self, RecordValidationError> {
        let record = Self {
            id,
            server_id,
            created_at: entry.created_at,
            user_id: entry.user_id,
            primary_curriculum_id: entry.primary_curriculum_id,
            secondary_curriculum_id: entry.secondary_curriculum_id,
            strategy_id: entry.strategy_id,
            initiated_by: entry.initiated_by,
            sync_status,
            last_sync_attempt,
        };
        record.validate()?;
        Ok(record)
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn server_id(&self) -> Option<ServerId> {
        self.server_id
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    pub fn last_sync_attempt(&self) -> Option<DateTime<Utc>> {
        self.last_sync_attempt
    }

    /// Checks the server-id/status pairing.
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        match (self.sync_status, self.server_id) {
            (SyncStatus::Synced, None) => Err(RecordValidationError::MissingServerId),
            (status @ (SyncStatus::Pending | SyncStatus::Failed), Some(_)) => {
                Err(RecordValidationError::UnexpectedServerId { status })
            }
            _ => Ok(()),
        }
    }

    /// Name of the first user-supplied field that differs from `stored`.
    ///
    /// Only sync bookkeeping may change once a record is persisted.
    pub(crate) fn changed_immutable_field(&self, stored: &JournalRecord) -> Option<&'static str> {
        if self.created_at != stored.created_at {
            Some("created_at")
        } else if self.user_id != stored.user_id {
            Some("user_id")
        } else if self.primary_curriculum_id != stored.primary_curriculum_id {
            Some("primary_curriculum_id")
        } else if self.secondary_curriculum_id != stored.secondary_curriculum_id {
            Some("secondary_curriculum_id")
        } else if self.strategy_id != stored.strategy_id {
            Some("strategy_id")
        } else if self.initiated_by != stored.initiated_by {
            Some("initiated_by")
        } else {
            None
        }
    }

    pub(crate) fn mark_synced(&mut self, server_id: ServerId) {
        debug_assert!(self.sync_status.can_transition_to(SyncStatus::Synced));
        self.sync_status = SyncStatus::Synced;
        self.server_id = Some(server_id);
    }

    pub(crate) fn mark_failed(&mut self, attempted_at: DateTime<Utc>) {
        debug_assert!(self.sync_status.can_transition_to(SyncStatus::Failed));
        self.sync_status = SyncStatus::Failed;
        self.last_sync_attempt = Some(attempted_at.trunc_subsecs(3));
    }

    pub(crate) fn mark_pending(&mut self) {
        debug_assert!(self.sync_status.can_transition_to(SyncStatus::Pending));
        self.sync_status = SyncStatus::Pending;
    }

    pub(crate) fn stamp_attempt(&mut self, attempted_at: DateTime<Utc>) {
        self.last_sync_attempt = Some(attempted_at.trunc_subsecs(3));
    }
}
