//! Core domain logic for Wavelength.
//! Local-first journal storage, best-effort cloud sync and on-device analytics.

pub mod analytics;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod settings;
pub mod store;
pub mod sync;

pub use analytics::{
    AnalyticsEngine, AnalyticsOverview, EmotionalLandscape, SelfCareSummary,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::catalog::{Catalog, CatalogError, CurriculumInfo, Dosage, StrategyInfo};
pub use model::journal::{
    InitiatedBy, JournalRecord, NewJournalEntry, RecordId, RecordValidationError, ServerId,
    SyncStatus,
};
pub use repo::journal_repo::{
    InMemoryJournalRepository, JournalRepository, SqliteJournalRepository, StoreLocation,
};
pub use settings::{
    InMemoryKeyValueStore, KeyValueStore, SettingsError, SettingsResult, SqliteKeyValueStore,
    SyncSettings,
};
pub use store::journal_store::{JournalStore, StoreError, StoreResult};
pub use sync::client::{Clock, SyncClient, SystemClock};
pub use sync::http::{HttpEndpointConfig, HttpJournalEndpoint};
pub use sync::remote::{
    OfflineEndpoint, RemoteJournalEndpoint, RemoteReceipt, RemoteSubmission,
    RemoteSubmissionError,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
