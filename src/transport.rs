//! Delivery of batches to the ingestion destination.
//!
//! The consumer depends only on the [`Transport`] trait. Failures are
//! classified once, here, into a [`TransportError`] whose variant decides
//! whether the retry policy may try again.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::batch::Batch;
use crate::config::{Config, ConfigError};

/// Acknowledgment for a delivered batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// Number of messages the destination accepted
    pub accepted: usize,
}

/// Errors reported by a transport for one submit attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The destination answered with a non-success status code
    #[error("destination returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The destination accepted the request but rejected some entries
    #[error("destination rejected {failed} entries ({}): {message}", .code.as_deref().unwrap_or("unknown"))]
    Rejected {
        failed: usize,
        code: Option<String>,
        message: String,
    },

    /// Connection-level failure before a response was received
    #[error("request failed: {message}")]
    Network { message: String },

    /// Request timed out
    #[error("request timed out")]
    Timeout,

    /// Any other failure, with an explicit retry decision
    #[error("{message}")]
    Other { message: String, retryable: bool },
}

impl TransportError {
    /// Create an error for a non-success status code.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        TransportError::Status {
            status,
            message: message.into(),
        }
    }

    /// Create a retryable error with no status code.
    pub fn transient(message: impl Into<String>) -> Self {
        TransportError::Other {
            message: message.into(),
            retryable: true,
        }
    }

    /// Whether the failure is transient and the batch may be resent.
    ///
    /// Client errors (4xx other than 429) and partial rejections are final;
    /// everything else is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Status { status, .. } => {
                !(400..500).contains(status) || *status == StatusCode::TOO_MANY_REQUESTS.as_u16()
            }
            TransportError::Rejected { .. } => false,
            TransportError::Network { .. } => true,
            TransportError::Timeout => true,
            TransportError::Other { retryable, .. } => *retryable,
        }
    }

    /// HTTP-like status code, when the destination produced one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Human-readable failure detail.
    pub fn message(&self) -> String {
        match self {
            TransportError::Status { message, .. }
            | TransportError::Rejected { message, .. }
            | TransportError::Network { message }
            | TransportError::Other { message, .. } => message.clone(),
            TransportError::Timeout => "request timed out".to_string(),
        }
    }

    /// Number of entries the destination reported as failed, if known.
    pub fn failed_count(&self) -> Option<usize> {
        match self {
            TransportError::Rejected { failed, .. } => Some(*failed),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if let Some(status) = err.status() {
            TransportError::status(status.as_u16(), err.to_string())
        } else {
            TransportError::Network {
                message: err.to_string(),
            }
        }
    }
}

/// Delivers a batch of serialized messages to a destination.
///
/// Implementations perform exactly one attempt per call; retries are the
/// consumer's job.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit `batch`, returning how many messages were accepted.
    async fn submit(&self, batch: &Batch) -> Result<SubmitReceipt, TransportError>;
}

/// Request body posted by [`HttpTransport`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a> {
    source: &'a str,
    destination: &'a str,
    batch: &'a [Value],
    sent_at: DateTime<Utc>,
}

/// Response body from the ingestion endpoint. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    #[serde(default)]
    pub accepted: Option<usize>,

    #[serde(default)]
    pub rejected: usize,

    #[serde(default)]
    pub error_code: Option<String>,

    #[serde(default)]
    pub error: Option<String>,
}

/// JSON-over-HTTP transport.
///
/// Posts `{"source", "destination", "batch", "sentAt"}` to the configured
/// endpoint, reusing one pooled `reqwest` client.
///
/// # Example
///
/// ```no_run
/// use analytics_batcher::config::Config;
/// use analytics_batcher::transport::HttpTransport;
///
/// let config = Config::new("my-app", "events-bus");
/// let transport = HttpTransport::new(&config).expect("Failed to create transport");
/// assert_eq!(transport.endpoint(), "http://localhost:8000/v1/batch");
/// ```
pub struct HttpTransport {
    /// Underlying HTTP client (reused for connection pooling)
    client: Client,

    endpoint: String,
    source_id: String,
    destination: String,
    credentials: Option<String>,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport from the client configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| ConfigError::new(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            source_id: config.source_id.clone(),
            destination: config.destination.clone(),
            credentials: config.credentials.clone(),
            timeout: config.request_timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn interpret(&self, body: &str, batch_len: usize) -> Result<SubmitReceipt, TransportError> {
        if body.trim().is_empty() {
            return Ok(SubmitReceipt { accepted: batch_len });
        }

        let response: IngestResponse = match serde_json::from_str(body) {
            Ok(response) => response,
            Err(e) => {
                // The request was accepted; resending would duplicate it
                warn!(error = %e, "Unparsable ingest response, treating batch as accepted");
                return Ok(SubmitReceipt { accepted: batch_len });
            }
        };

        if response.rejected > 0 {
            debug!(failed = response.rejected, "Destination rejected entries");
            return Err(TransportError::Rejected {
                failed: response.rejected,
                code: response.error_code,
                message: response
                    .error
                    .unwrap_or_else(|| "entries rejected".to_string()),
            });
        }

        Ok(SubmitReceipt {
            accepted: response.accepted.unwrap_or(batch_len),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn submit(&self, batch: &Batch) -> Result<SubmitReceipt, TransportError> {
        let envelope = Envelope {
            source: &self.source_id,
            destination: &self.destination,
            batch: batch.messages(),
            sent_at: batch.sent_at().unwrap_or_else(Utc::now),
        };

        let mut request = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&envelope);

        if let Some(token) = &self.credentials {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            self.interpret(&body, batch.len())
        } else {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            Err(TransportError::status(status.as_u16(), message))
        }
    }
}
