use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wavelength_core::settings::CLOUD_SYNC_ENABLED_KEY;
use wavelength_core::{
    Clock, InMemoryJournalRepository, InMemoryKeyValueStore, InitiatedBy, JournalRepository,
    KeyValueStore, NewJournalEntry, OfflineEndpoint, RemoteJournalEndpoint, RemoteReceipt,
    RemoteSubmission, RemoteSubmissionError, SqliteJournalRepository, StoreError, SyncClient,
    SyncSettings, SyncStatus,
};

/// Endpoint that replays scripted outcomes and counts calls.
#[derive(Default)]
struct ScriptedEndpoint {
    outcomes: Mutex<Vec<Result<i64, RemoteSubmissionError>>>,
    calls: AtomicUsize,
    last_curriculum_id: Mutex<Option<i64>>,
}

impl ScriptedEndpoint {
    fn replying(outcomes: Vec<Result<i64, RemoteSubmissionError>>) -> Arc<Self> {
        let mut outcomes = outcomes;
        outcomes.reverse();
        Arc::new(Self {
            outcomes: Mutex::new(outcomes),
            ..Self::default()
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RemoteJournalEndpoint for ScriptedEndpoint {
    fn submit(&self, submission: &RemoteSubmission) -> Result<RemoteReceipt, RemoteSubmissionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_curriculum_id.lock().unwrap() = Some(submission.primary_curriculum_id);
        self.outcomes
            .lock()
            .unwrap()
            .pop()
            .unwrap_or(Err(RemoteSubmissionError::Transport("script exhausted".into())))
            .map(|server_id| RemoteReceipt { server_id })
    }
}

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 14, 18, 45, 12).unwrap()
}

fn entry() -> NewJournalEntry {
    NewJournalEntry {
        created_at: Utc.with_ymd_and_hms(2024, 7, 14, 18, 45, 0).unwrap(),
        user_id: 21,
        primary_curriculum_id: 13,
        secondary_curriculum_id: None,
        strategy_id: Some(6),
        initiated_by: InitiatedBy::SelfInitiated,
    }
}

fn settings(sync_enabled: bool) -> SyncSettings {
    let settings = SyncSettings::in_memory();
    settings.set_cloud_sync_enabled(sync_enabled).unwrap();
    settings
}

fn client(
    endpoint: Arc<ScriptedEndpoint>,
    settings: SyncSettings,
) -> SyncClient<InMemoryJournalRepository, Arc<ScriptedEndpoint>> {
    SyncClient::with_clock(
        InMemoryJournalRepository::new(),
        endpoint,
        settings,
        Arc::new(FixedClock(now())),
    )
}

#[test]
fn sync_disabled_keeps_entry_local() {
    let endpoint = ScriptedEndpoint::replying(vec![Ok(1)]);
    let client = client(Arc::clone(&endpoint), settings(false));

    let record = client.submit(entry()).unwrap();

    assert_eq!(record.sync_status(), SyncStatus::Pending);
    assert_eq!(record.server_id(), None);
    assert_eq!(endpoint.calls(), 0);
    assert_eq!(client.repository().count().unwrap(), 1);
}

#[test]
fn default_settings_never_call_remote() {
    let endpoint = ScriptedEndpoint::replying(vec![Ok(1)]);
    let client = client(Arc::clone(&endpoint), SyncSettings::in_memory());

    let record = client.submit(entry()).unwrap();

    assert_eq!(record.sync_status(), SyncStatus::Pending);
    assert_eq!(endpoint.calls(), 0);
}

#[test]
fn accepted_entry_is_synced_and_stored() {
    let endpoint = ScriptedEndpoint::replying(vec![Ok(4242)]);
    let client = client(Arc::clone(&endpoint), settings(true));

    let record = client.submit(entry()).unwrap();

    assert_eq!(record.sync_status(), SyncStatus::Synced);
    assert_eq!(record.server_id(), Some(4242));
    let stored = client.repository().fetch(record.id()).unwrap().unwrap();
    assert_eq!(stored, record);
    assert_eq!(endpoint.calls(), 1);
    assert_eq!(*endpoint.last_curriculum_id.lock().unwrap(), Some(13));
    assert_eq!(client.settings().last_sync_timestamp().unwrap(), Some(now()));
}

#[test]
fn failing_remote_marks_entry_failed_after_one_attempt() {
    let endpoint =
        ScriptedEndpoint::replying(vec![Err(RemoteSubmissionError::Rejected { status: 500 })]);
    let client = client(Arc::clone(&endpoint), settings(true));

    let record = client.submit(entry()).unwrap();

    assert_eq!(record.sync_status(), SyncStatus::Failed);
    assert_eq!(record.last_sync_attempt(), Some(now()));
    assert_eq!(endpoint.calls(), 1);
    let pending: Vec<_> = client
        .repository()
        .fetch_pending_sync()
        .unwrap()
        .iter()
        .map(|record| record.id())
        .collect();
    assert_eq!(pending, vec![record.id()]);
    assert_eq!(client.settings().last_sync_timestamp().unwrap(), None);
}

#[test]
fn offline_endpoint_fails_every_submission() {
    let client = SyncClient::new(InMemoryJournalRepository::new(), OfflineEndpoint, settings(true));

    let record = client.submit(entry()).unwrap();
    assert_eq!(record.sync_status(), SyncStatus::Failed);
}

#[test]
fn cancelled_remote_call_leaves_entry_pending() {
    let endpoint = ScriptedEndpoint::replying(vec![Err(RemoteSubmissionError::Cancelled)]);
    let client = client(Arc::clone(&endpoint), settings(true));

    let record = client.submit(entry()).unwrap();

    assert_eq!(record.sync_status(), SyncStatus::Pending);
    assert_eq!(record.last_sync_attempt(), Some(now()));
    let stored = client.repository().fetch(record.id()).unwrap().unwrap();
    assert_eq!(stored.sync_status(), SyncStatus::Pending);
    assert_eq!(stored.last_sync_attempt(), Some(now()));
}

#[test]
fn resubmit_moves_failed_entry_to_synced() {
    let endpoint = ScriptedEndpoint::replying(vec![
        Err(RemoteSubmissionError::Transport("offline".into())),
        Ok(808),
    ]);
    let client = client(Arc::clone(&endpoint), settings(true));
    let failed = client.submit(entry()).unwrap();
    assert_eq!(failed.sync_status(), SyncStatus::Failed);

    let synced = client.resubmit(failed.id()).unwrap();

    assert_eq!(synced.sync_status(), SyncStatus::Synced);
    assert_eq!(synced.server_id(), Some(808));
    assert_eq!(endpoint.calls(), 2);
    assert!(client.repository().fetch_pending_sync().unwrap().is_empty());
}

#[test]
fn resubmit_failing_again_stays_failed() {
    let endpoint = ScriptedEndpoint::replying(vec![
        Err(RemoteSubmissionError::Rejected { status: 502 }),
        Err(RemoteSubmissionError::Rejected { status: 502 }),
    ]);
    let client = client(Arc::clone(&endpoint), settings(true));
    let failed = client.submit(entry()).unwrap();

    let again = client.resubmit(failed.id()).unwrap();

    assert_eq!(again.sync_status(), SyncStatus::Failed);
    assert_eq!(endpoint.calls(), 2);
}

#[test]
fn resubmit_of_synced_entry_does_not_call_remote() {
    let endpoint = ScriptedEndpoint::replying(vec![Ok(1), Ok(2)]);
    let client = client(Arc::clone(&endpoint), settings(true));
    let synced = client.submit(entry()).unwrap();

    let again = client.resubmit(synced.id()).unwrap();

    assert_eq!(again, synced);
    assert_eq!(endpoint.calls(), 1);
}

#[test]
fn resubmit_of_unknown_entry_is_not_found() {
    let client = client(ScriptedEndpoint::replying(Vec::new()), settings(true));
    let err = client.resubmit(uuid::Uuid::new_v4()).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn unreadable_sync_setting_is_treated_as_disabled() {
    let backend = Arc::new(InMemoryKeyValueStore::new());
    backend.set(CLOUD_SYNC_ENABLED_KEY, "maybe").unwrap();
    let endpoint = ScriptedEndpoint::replying(vec![Ok(1)]);
    let client = client(Arc::clone(&endpoint), SyncSettings::new(backend));

    let record = client.submit(entry()).unwrap();

    assert_eq!(record.sync_status(), SyncStatus::Pending);
    assert_eq!(endpoint.calls(), 0);
}

#[test]
fn failed_outcome_update_returns_stored_pending_entry() {
    let endpoint = ScriptedEndpoint::replying(vec![Ok(5), Ok(5)]);
    let client = client(Arc::clone(&endpoint), settings(true));
    client.submit(entry()).unwrap();

    // The service hands out a server id another row already owns.
    let second = client.submit(entry()).unwrap();

    assert_eq!(second.sync_status(), SyncStatus::Pending);
    assert_eq!(second.server_id(), None);
    let stored = client.repository().fetch(second.id()).unwrap().unwrap();
    assert_eq!(stored, second);
    assert_eq!(client.repository().count().unwrap(), 2);
    assert_eq!(endpoint.calls(), 2);
}

#[test]
fn local_persist_failure_is_returned_and_remote_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = ScriptedEndpoint::replying(vec![Ok(1)]);
    let client = SyncClient::new(
        SqliteJournalRepository::at_path(dir.path()),
        Arc::clone(&endpoint),
        settings(true),
    );

    let err = client.submit(entry()).unwrap_err();

    assert!(matches!(err, StoreError::Unavailable(_)));
    assert_eq!(endpoint.calls(), 0);
}

#[test]
fn sqlite_backed_flow_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wavelength.db");
    let endpoint = ScriptedEndpoint::replying(vec![Ok(55)]);
    let client = SyncClient::new(
        SqliteJournalRepository::at_path(&path),
        Arc::clone(&endpoint),
        settings(true),
    );
    let record = client.submit(entry()).unwrap();
    drop(client);

    let reopened = SqliteJournalRepository::at_path(&path);
    let stored = reopened.fetch(record.id()).unwrap().unwrap();
    assert_eq!(stored.sync_status(), SyncStatus::Synced);
    assert_eq!(stored.server_id(), Some(55));
}
