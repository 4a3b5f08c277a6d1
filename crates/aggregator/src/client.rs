use aipscan_core::{FetchJobId, PhaseKind, PhaseStatus, PhaseTaskId, StorageServiceId};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::decode::decode_status;
use crate::error::{ClientError, Result, TransportError};
use crate::source::StatusSource;
use crate::types::{ErrorBody, FetchJobStarted, IndexRefreshStart, NewFetchJobResponse, StatusRequest};

/// Client for the aggregator blueprint of an AIPscan instance.
///
/// `base_url` points at the blueprint root, e.g.
/// `http://localhost:5000/aggregator`.
pub struct AggregatorClient {
    base_url: String,
    client: Client,
    strict_states: bool,
}

impl AggregatorClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            strict_states: false,
        }
    }

    /// Reject state literals outside the known set instead of reading them
    /// as success.
    pub fn with_strict_states(mut self, strict: bool) -> Self {
        self.strict_states = strict;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn start_fetch_job(
        &self,
        storage_service_id: &StorageServiceId,
    ) -> Result<FetchJobStarted> {
        let response = self
            .client
            .post(format!(
                "{}/new_fetch_job/{}",
                self.base_url, storage_service_id
            ))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ErrorBody>(&body) {
                Ok(error) => ClientError::Rejected(error.message),
                Err(_) => ClientError::Status {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        let body: NewFetchJobResponse = response.json().await?;
        debug!(
            storage_service_id = %storage_service_id,
            task_id = %body.task_id,
            fetch_job_id = %body.fetch_job_id,
            "Fetch job accepted"
        );

        Ok(FetchJobStarted {
            task_id: PhaseTaskId::new(body.task_id)
                .map_err(|e| ClientError::InvalidResponse(e.to_string()))?,
            fetch_job_id: FetchJobId::new(body.fetch_job_id)
                .map_err(|e| ClientError::InvalidResponse(e.to_string()))?,
            timestamp: body.timestamp,
        })
    }

    pub async fn fetch_status(
        &self,
        request: &StatusRequest,
    ) -> std::result::Result<PhaseStatus, TransportError> {
        let phase = request.phase;
        self.fetch_status_inner(request)
            .await
            .map_err(|cause| TransportError::new(phase, cause))
    }

    async fn fetch_status_inner(&self, request: &StatusRequest) -> Result<PhaseStatus> {
        if request.task_id.as_str().trim().is_empty() {
            return Err(ClientError::EmptyTaskId(request.phase));
        }

        let builder = match request.phase {
            PhaseKind::PackageList => self.client.get(format!(
                "{}/package_list_task_status/{}",
                self.base_url, request.task_id
            )),
            PhaseKind::MetsDownload => {
                let fetch_job_id = self.require_fetch_job(request)?;
                self.client
                    .get(format!(
                        "{}/get_mets_task_status/{}",
                        self.base_url, request.task_id
                    ))
                    .query(&[
                        ("totalAIPs", request.total_aips.to_string()),
                        ("fetchJobId", fetch_job_id.to_string()),
                    ])
            }
            PhaseKind::IndexRefresh => {
                let fetch_job_id = self.require_fetch_job(request)?;
                self.client
                    .get(format!(
                        "{}/indexing_status/{}",
                        self.base_url, request.task_id
                    ))
                    .query(&[("fetchJobId", fetch_job_id.as_str())])
            }
        };

        let response = builder.send().await?;
        let body = Self::json_body(response).await?;
        debug!(
            phase = %request.phase,
            task_id = %request.task_id,
            total_aips = request.total_aips,
            "Status response received"
        );

        decode_status(request.phase, body, self.strict_states)
    }

    pub async fn start_index_refresh(
        &self,
        fetch_job_id: &FetchJobId,
    ) -> std::result::Result<IndexRefreshStart, TransportError> {
        self.start_index_refresh_inner(fetch_job_id)
            .await
            .map_err(|cause| TransportError::new(PhaseKind::IndexRefresh, cause))
    }

    async fn start_index_refresh_inner(&self, fetch_job_id: &FetchJobId) -> Result<IndexRefreshStart> {
        let response = self
            .client
            .get(format!("{}/index_refresh/{}", self.base_url, fetch_job_id))
            .query(&[("fetchJobId", fetch_job_id.as_str())])
            .send()
            .await?;

        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            debug!(fetch_job_id = %fetch_job_id, "Index refresh not needed");
            return Ok(IndexRefreshStart::NotNeeded);
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(IndexRefreshStart::Started)
    }

    fn require_fetch_job<'a>(&self, request: &'a StatusRequest) -> Result<&'a FetchJobId> {
        request.fetch_job_id.as_ref().ok_or_else(|| {
            ClientError::InvalidResponse(format!(
                "{} status request needs a fetch job id",
                request.phase
            ))
        })
    }

    async fn json_body(response: reqwest::Response) -> Result<Value> {
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl StatusSource for AggregatorClient {
    async fn start_fetch_job(
        &self,
        storage_service_id: &StorageServiceId,
    ) -> Result<FetchJobStarted> {
        AggregatorClient::start_fetch_job(self, storage_service_id).await
    }

    async fn fetch_status(
        &self,
        request: &StatusRequest,
    ) -> std::result::Result<PhaseStatus, TransportError> {
        AggregatorClient::fetch_status(self, request).await
    }

    async fn start_index_refresh(
        &self,
        fetch_job_id: &FetchJobId,
    ) -> std::result::Result<IndexRefreshStart, TransportError> {
        AggregatorClient::start_index_refresh(self, fetch_job_id).await
    }
}
