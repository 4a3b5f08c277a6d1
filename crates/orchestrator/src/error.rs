use aipscan_core::{JobId, StorageServiceId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid poller transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Fetch job {job_id} is already running for storage service {storage_service_id}")]
    JobAlreadyRunning {
        storage_service_id: StorageServiceId,
        job_id: JobId,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
