//! Remote submission endpoint contract.

use crate::model::journal::{InitiatedBy, JournalRecord, ServerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Wire body for one entry submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSubmission {
    pub created_at: DateTime<Utc>,
    pub user_id: i64,
    #[serde(rename = "curriculum_id")]
    pub primary_curriculum_id: i64,
    pub secondary_curriculum_id: Option<i64>,
    pub strategy_id: Option<i64>,
    pub initiated_by: InitiatedBy,
}

impl From<&JournalRecord> for RemoteSubmission {
    fn from(record: &JournalRecord) -> Self {
        Self {
            created_at: record.created_at,
            user_id: record.user_id,
            primary_curriculum_id: record.primary_curriculum_id,
            secondary_curriculum_id: record.secondary_curriculum_id,
            strategy_id: record.strategy_id,
            initiated_by: record.initiated_by,
        }
    }
}

/// Acceptance receipt returned by the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteReceipt {
    pub server_id: ServerId,
}

/// Everything that can keep the remote service from accepting an entry.
#[derive(Debug)]
pub enum RemoteSubmissionError {
    /// The request never produced a response (connect, timeout, TLS, ...).
    Transport(String),
    /// The service answered with a non-success status.
    Rejected { status: u16 },
    /// A success response whose body could not be decoded.
    InvalidResponse(String),
    /// The caller gave up before the call resolved.
    Cancelled,
}

impl RemoteSubmissionError {
    /// Machine-readable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "remote_transport",
            Self::Rejected { .. } => "remote_rejected",
            Self::InvalidResponse(_) => "remote_invalid_response",
            Self::Cancelled => "remote_cancelled",
        }
    }
}

impl Display for RemoteSubmissionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(message) => write!(f, "remote transport error: {message}"),
            Self::Rejected { status } => write!(f, "remote service rejected entry: {status}"),
            Self::InvalidResponse(message) => write!(f, "invalid remote response: {message}"),
            Self::Cancelled => write!(f, "remote submission cancelled"),
        }
    }
}

impl Error for RemoteSubmissionError {}

/// A remote service able to durably accept journal entries.
///
/// Implementations block until the call resolves.
pub trait RemoteJournalEndpoint {
    fn submit(&self, submission: &RemoteSubmission) -> Result<RemoteReceipt, RemoteSubmissionError>;
}

impl<E: RemoteJournalEndpoint + ?Sized> RemoteJournalEndpoint for &E {
    fn submit(&self, submission: &RemoteSubmission) -> Result<RemoteReceipt, RemoteSubmissionError> {
        (**self).submit(submission)
    }
}

impl<E: RemoteJournalEndpoint + ?Sized> RemoteJournalEndpoint for std::sync::Arc<E> {
    fn submit(&self, submission: &RemoteSubmission) -> Result<RemoteReceipt, RemoteSubmissionError> {
        (**self).submit(submission)
    }
}

/// Endpoint used when no remote service is configured; every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineEndpoint;

impl RemoteJournalEndpoint for OfflineEndpoint {
    fn submit(&self, _submission: &RemoteSubmission) -> Result<RemoteReceipt, RemoteSubmissionError> {
        Err(RemoteSubmissionError::Transport(
            "no remote endpoint configured".to_string(),
        ))
    }
}
