//! Local-first submission use-case.
//!
//! # Responsibility
//! - Persist every new entry before anything else happens.
//! - Attempt remote submission only when cloud sync is enabled.
//! - Record the remote outcome in the entry's sync status.
//!
//! # Invariants
//! - `submit` fails only when the initial local persist fails. A failed
//!   outcome update leaves the stored record as it was and is only logged.
//! - Remote errors are logged and absorbed; they never reach the caller.
//! - A cancelled remote call leaves the entry `pending`.
//! - No retry loop lives here: `resubmit` performs exactly one attempt.

use super::remote::{RemoteJournalEndpoint, RemoteSubmission, RemoteSubmissionError};
use crate::model::journal::{JournalRecord, NewJournalEntry, RecordId, SyncStatus};
use crate::repo::journal_repo::JournalRepository;
use crate::settings::SyncSettings;
use crate::store::journal_store::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::sync::Arc;

/// Source of "now" for sync bookkeeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Submission service wiring a repository, a remote endpoint and settings.
pub struct SyncClient<R: JournalRepository, E: RemoteJournalEndpoint> {
    repo: R,
    endpoint: E,
    settings: SyncSettings,
    clock: Arc<dyn Clock>,
}

impl<R: JournalRepository, E: RemoteJournalEndpoint> SyncClient<R, E> {
    pub fn new(repo: R, endpoint: E, settings: SyncSettings) -> Self {
        Self::with_clock(repo, endpoint, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(repo: R, endpoint: E, settings: SyncSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            endpoint,
            settings,
            clock,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Saves a new entry locally, then syncs it if the user opted in.
    ///
    /// # Errors
    /// - Returns the store error when the initial save fails. Remote failures
    ///   and outcome-update failures are never returned.
    pub fn submit(&self, entry: NewJournalEntry) -> StoreResult<JournalRecord> {
        let record = JournalRecord::new(entry);

        if let Err(err) = self.repo.save(&record) {
            error!(
                "event=journal_submit module=sync status=error error_code=local_persist_failed error={}",
                err
            );
            return Err(err);
        }

        if !self.sync_enabled() {
            info!("event=journal_submit module=sync status=ok sync_status=pending remote=skipped");
            return Ok(record);
        }

        self.attempt_remote(record)
    }

    /// Makes one more remote attempt for a stored entry.
    ///
    /// - `synced` entries come back unchanged.
    /// - `failed` entries are moved back to `pending` before the attempt.
    /// - With sync disabled the stored entry comes back unchanged.
    pub fn resubmit(&self, id: RecordId) -> StoreResult<JournalRecord> {
        let mut record = self.repo.fetch(id)?.ok_or(StoreError::NotFound(id))?;

        if record.sync_status() == SyncStatus::Synced || !self.sync_enabled() {
            return Ok(record);
        }

        if record.sync_status() == SyncStatus::Failed {
            record.mark_pending();
            self.repo.update(&record)?;
        }

        self.attempt_remote(record)
    }

    /// One remote attempt plus the outcome update.
    ///
    /// The record is durable before this runs, so a failed outcome update is
    /// logged and the record is returned as stored.
    fn attempt_remote(&self, record: JournalRecord) -> StoreResult<JournalRecord> {
        let submission = RemoteSubmission::from(&record);
        let mut outcome = record.clone();
        let result = self.endpoint.submit(&submission);
        match &result {
            Ok(receipt) => outcome.mark_synced(receipt.server_id),
            Err(RemoteSubmissionError::Cancelled) => outcome.stamp_attempt(self.clock.now()),
            Err(_) => outcome.mark_failed(self.clock.now()),
        }

        if let Err(err) = self.repo.update(&outcome) {
            error!(
                "event=journal_submit module=sync status=error sync_status={} error_code=outcome_persist_failed error={}",
                record.sync_status(),
                err
            );
            return Ok(record);
        }

        match result {
            Ok(_) => {
                if let Err(err) = self.settings.set_last_sync_timestamp(self.clock.now()) {
                    warn!(
                        "event=settings_update module=sync status=error key=last_sync_timestamp error={}",
                        err
                    );
                }
                info!("event=journal_submit module=sync status=ok sync_status=synced");
            }
            Err(RemoteSubmissionError::Cancelled) => warn!(
                "event=journal_submit module=sync status=cancelled sync_status=pending error_code=remote_cancelled"
            ),
            Err(err) => warn!(
                "event=journal_submit module=sync status=degraded sync_status=failed error_code={}",
                err.code()
            ),
        }
        Ok(outcome)
    }

    /// Unreadable settings mean "local only": the entry is already durable.
    fn sync_enabled(&self) -> bool {
        match self.settings.cloud_sync_enabled() {
            Ok(enabled) => enabled,
            Err(err) => {
                warn!(
                    "event=settings_read module=sync status=error key=cloud_sync_enabled error={}",
                    err
                );
                false
            }
        }
    }
}
