use aipscan_core::PhaseKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON decoding failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Fetch job rejected: {0}")]
    Rejected(String),

    #[error("Empty task id for {0} status request")]
    EmptyTaskId(PhaseKind),
}

impl ClientError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Failure talking to the backend while observing a phase.
#[derive(Debug, Error)]
#[error("{phase} transport error: {cause}")]
pub struct TransportError {
    pub phase: PhaseKind,
    #[source]
    pub cause: ClientError,
}

impl TransportError {
    pub fn new(phase: PhaseKind, cause: impl Into<ClientError>) -> Self {
        Self {
            phase,
            cause: cause.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
