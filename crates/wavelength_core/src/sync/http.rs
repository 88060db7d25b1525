//! Blocking HTTP adapter for the remote journal service.
//!
//! # Responsibility
//! - POST one entry to `{base_url}/journal` and read the assigned id.
//! - Fold transport errors, non-success statuses and undecodable bodies
//!   into `RemoteSubmissionError`.
//!
//! # Invariants
//! - Request bodies are never logged; only status codes and durations are.

use super::remote::{RemoteJournalEndpoint, RemoteReceipt, RemoteSubmission, RemoteSubmissionError};
use crate::model::journal::ServerId;
use log::{info, warn};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpEndpointConfig {
    /// Service root without a trailing slash, e.g. `https://api.example.org`.
    pub base_url: String,
    pub timeout: Duration,
}

impl HttpEndpointConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn journal_url(&self) -> String {
        format!("{}/journal", self.base_url.trim_end_matches('/'))
    }
}

/// Subset of the service's journal response that the client needs.
#[derive(Debug, Deserialize)]
struct JournalCreated {
    id: ServerId,
}

pub struct HttpJournalEndpoint {
    config: HttpEndpointConfig,
    client: Client,
}

impl HttpJournalEndpoint {
    pub fn try_new(config: HttpEndpointConfig) -> Result<Self, RemoteSubmissionError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| RemoteSubmissionError::Transport(err.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &HttpEndpointConfig {
        &self.config
    }
}

impl RemoteJournalEndpoint for HttpJournalEndpoint {
    fn submit(&self, submission: &RemoteSubmission) -> Result<RemoteReceipt, RemoteSubmissionError> {
        let started_at = Instant::now();
        let response = self
            .client
            .post(self.config.journal_url())
            .json(submission)
            .send()
            .map_err(|err| {
                warn!(
                    "event=remote_submit module=sync status=error duration_ms={} error_code=remote_transport timeout={}",
                    started_at.elapsed().as_millis(),
                    err.is_timeout()
                );
                RemoteSubmissionError::Transport(err.without_url().to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                "event=remote_submit module=sync status=error duration_ms={} error_code=remote_rejected http_status={}",
                started_at.elapsed().as_millis(),
                status.as_u16()
            );
            return Err(RemoteSubmissionError::Rejected {
                status: status.as_u16(),
            });
        }

        let created: JournalCreated = response
            .json()
            .map_err(|err| RemoteSubmissionError::InvalidResponse(err.without_url().to_string()))?;

        info!(
            "event=remote_submit module=sync status=ok duration_ms={} http_status={}",
            started_at.elapsed().as_millis(),
            status.as_u16()
        );
        Ok(RemoteReceipt {
            server_id: created.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{HttpEndpointConfig, HttpJournalEndpoint};
    use crate::model::journal::InitiatedBy;
    use crate::sync::remote::{RemoteJournalEndpoint, RemoteSubmission, RemoteSubmissionError};
    use chrono::{TimeZone, Utc};
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    /// Serves exactly one request and hands the raw request body back.
    fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut content_length = 0usize;
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                let lower = line.to_ascii_lowercase();
                if let Some(value) = lower.strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
            }
            let mut request_body = vec![0u8; content_length];
            reader.read_exact(&mut request_body).unwrap();

            let mut stream = stream;
            write!(
                stream,
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
            stream.flush().unwrap();
            format!("{}{}", request_line, String::from_utf8(request_body).unwrap())
        });
        (base_url, handle)
    }

    fn submission() -> RemoteSubmission {
        RemoteSubmission {
            created_at: Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap(),
            user_id: 9,
            primary_curriculum_id: 17,
            secondary_curriculum_id: None,
            strategy_id: Some(2),
            initiated_by: InitiatedBy::SelfInitiated,
        }
    }

    #[test]
    fn success_returns_assigned_id() {
        let (base_url, handle) = serve_once("HTTP/1.1 201 Created", r#"{"id": 321, "user_id": 9}"#);
        let endpoint = HttpJournalEndpoint::try_new(
            HttpEndpointConfig::new(format!("{base_url}/")).with_timeout(Duration::from_secs(5)),
        )
        .unwrap();

        let receipt = endpoint.submit(&submission()).unwrap();
        assert_eq!(receipt.server_id, 321);

        let request = handle.join().unwrap();
        assert!(request.starts_with("POST /journal "));
        assert!(request.contains("\"curriculum_id\":17"));
        assert!(request.contains("\"initiated_by\":\"self\""));
    }

    #[test]
    fn non_success_status_is_rejected() {
        let (base_url, handle) = serve_once("HTTP/1.1 500 Internal Server Error", "{}");
        let endpoint = HttpJournalEndpoint::try_new(HttpEndpointConfig::new(base_url)).unwrap();

        let err = endpoint.submit(&submission()).unwrap_err();
        assert!(matches!(err, RemoteSubmissionError::Rejected { status: 500 }));
        handle.join().unwrap();
    }

    #[test]
    fn undecodable_body_is_invalid_response() {
        let (base_url, handle) = serve_once("HTTP/1.1 200 OK", r#"{"unexpected": true}"#);
        let endpoint = HttpJournalEndpoint::try_new(HttpEndpointConfig::new(base_url)).unwrap();

        let err = endpoint.submit(&submission()).unwrap_err();
        assert!(matches!(err, RemoteSubmissionError::InvalidResponse(_)));
        handle.join().unwrap();
    }

    #[test]
    fn unreachable_service_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let endpoint = HttpJournalEndpoint::try_new(
            HttpEndpointConfig::new(base_url).with_timeout(Duration::from_secs(2)),
        )
        .unwrap();

        let err = endpoint.submit(&submission()).unwrap_err();
        assert!(matches!(err, RemoteSubmissionError::Transport(_)));
    }
}
