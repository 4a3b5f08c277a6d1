use aipscan_core::{FetchJobId, PhaseStatus, StorageServiceId};
use async_trait::async_trait;

use crate::error::{ClientError, TransportError};
use crate::types::{FetchJobStarted, IndexRefreshStart, StatusRequest};

/// The backend calls the orchestrator depends on.
///
/// [`crate::AggregatorClient`] is the HTTP implementation; tests drive the
/// orchestrator with scripted sources.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn start_fetch_job(
        &self,
        storage_service_id: &StorageServiceId,
    ) -> Result<FetchJobStarted, ClientError>;

    async fn fetch_status(&self, request: &StatusRequest) -> Result<PhaseStatus, TransportError>;

    async fn start_index_refresh(
        &self,
        fetch_job_id: &FetchJobId,
    ) -> Result<IndexRefreshStart, TransportError>;
}
