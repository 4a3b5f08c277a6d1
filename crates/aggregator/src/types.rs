use aipscan_core::{FetchJobId, PhaseKind, PhaseTaskId};
use serde::{Deserialize, Deserializer, Serialize};

/// Body of `POST /new_fetch_job/{storageServiceId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFetchJobResponse {
    #[serde(deserialize_with = "string_or_number")]
    pub task_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub fetch_job_id: String,
    pub timestamp: String,
}

/// Error body some endpoints return alongside a non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageListStatusBody {
    pub state: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub coordinator_id: Option<String>,
    /// Exception text attached to a `FAILURE` state.
    #[serde(default)]
    pub status: Option<String>,
}

/// One per-package update of the METS phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetsBatchItem {
    pub state: String,
    #[serde(rename = "totalAIPs")]
    pub total_aips: u64,
    pub package: String,
}

impl MetsBatchItem {
    pub fn display_line(&self) -> String {
        format!("{} parsing {}. {}", self.state, self.total_aips, self.package)
    }
}

/// The METS endpoint answers with either a bare state or a batch of updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetsStatusBody {
    Batch(Vec<MetsBatchItem>),
    State { state: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingStatusBody {
    pub state: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub progress: Option<String>,
}

/// Accepted fetch job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchJobStarted {
    pub task_id: PhaseTaskId,
    pub fetch_job_id: FetchJobId,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexRefreshStart {
    Started,
    /// The backend answered 422: nothing needs indexing.
    NotNeeded,
}

/// Everything needed to issue one status request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRequest {
    pub phase: PhaseKind,
    pub task_id: PhaseTaskId,
    pub fetch_job_id: Option<FetchJobId>,
    /// Running count the METS endpoint resumes from.
    pub total_aips: u64,
}

impl StatusRequest {
    pub fn package_list(task_id: PhaseTaskId) -> Self {
        Self {
            phase: PhaseKind::PackageList,
            task_id,
            fetch_job_id: None,
            total_aips: 0,
        }
    }

    pub fn mets(coordinator_id: PhaseTaskId, fetch_job_id: FetchJobId) -> Self {
        Self {
            phase: PhaseKind::MetsDownload,
            task_id: coordinator_id,
            fetch_job_id: Some(fetch_job_id),
            total_aips: 0,
        }
    }

    pub fn indexing(fetch_job_id: FetchJobId) -> Self {
        Self {
            phase: PhaseKind::IndexRefresh,
            task_id: fetch_job_id.clone().into(),
            fetch_job_id: Some(fetch_job_id),
            total_aips: 0,
        }
    }

    pub fn with_total_aips(mut self, total_aips: u64) -> Self {
        self.total_aips = total_aips;
        self
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn opt_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}
