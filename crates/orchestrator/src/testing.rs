//! Scripted [`StatusSource`] for driving pollers and pipelines in tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use aggregator::{
    decode_status, ClientError, FetchJobStarted, IndexRefreshStart, StatusRequest, StatusSource,
    TransportError,
};
use aipscan_core::{FetchJobId, PhaseKind, PhaseStatus, PhaseTaskId, StorageServiceId};
use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone)]
enum Reply {
    Status(Value),
    HttpError(u16),
}

#[derive(Debug, Clone)]
pub struct Step {
    reply: Reply,
    delay: Option<Duration>,
    repeat: bool,
}

impl Step {
    pub fn status(body: Value) -> Self {
        Self {
            reply: Reply::Status(body),
            delay: None,
            repeat: false,
        }
    }

    pub fn transport_error(status: u16) -> Self {
        Self {
            reply: Reply::HttpError(status),
            delay: None,
            repeat: false,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Keep answering with this step forever.
    pub fn repeat(mut self) -> Self {
        self.repeat = true;
        self
    }
}

#[derive(Debug, Clone)]
enum StartReply {
    Accepted,
    Rejected(String),
    Delayed(Duration),
}

#[derive(Debug, Clone, Copy)]
enum IndexReply {
    Start(IndexRefreshStart),
    HttpError(u16),
}

pub struct ScriptedSource {
    start: StartReply,
    index_refresh: IndexReply,
    phases: Mutex<HashMap<PhaseKind, VecDeque<Step>>>,
    requests: Mutex<Vec<StatusRequest>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            start: StartReply::Accepted,
            index_refresh: IndexReply::Start(IndexRefreshStart::Started),
            phases: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_phase(self, phase: PhaseKind, steps: Vec<Step>) -> Self {
        self.phases.lock().unwrap().insert(phase, steps.into());
        self
    }

    pub fn with_start_rejected(mut self, message: &str) -> Self {
        self.start = StartReply::Rejected(message.to_string());
        self
    }

    pub fn with_slow_start(mut self, delay: Duration) -> Self {
        self.start = StartReply::Delayed(delay);
        self
    }

    pub fn with_index_refresh(mut self, start: IndexRefreshStart) -> Self {
        self.index_refresh = IndexReply::Start(start);
        self
    }

    pub fn with_index_refresh_error(mut self, status: u16) -> Self {
        self.index_refresh = IndexReply::HttpError(status);
        self
    }

    pub fn request_count(&self, phase: PhaseKind) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.phase == phase)
            .count()
    }

    /// `totalAIPs` sent with each request of `phase`, in order.
    pub fn sent_counts(&self, phase: PhaseKind) -> Vec<u64> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.phase == phase)
            .map(|r| r.total_aips)
            .collect()
    }

    pub fn requests(&self) -> Vec<StatusRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Every backend call in the order it was made.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_step(&self, phase: PhaseKind) -> Option<Step> {
        let mut phases = self.phases.lock().unwrap();
        let steps = phases.get_mut(&phase)?;
        match steps.front() {
            Some(step) if step.repeat => Some(step.clone()),
            _ => steps.pop_front(),
        }
    }
}

#[async_trait]
impl StatusSource for ScriptedSource {
    async fn start_fetch_job(
        &self,
        storage_service_id: &StorageServiceId,
    ) -> Result<FetchJobStarted, ClientError> {
        self.record(format!("start:{storage_service_id}"));
        match &self.start {
            StartReply::Rejected(message) => return Err(ClientError::Rejected(message.clone())),
            StartReply::Delayed(delay) => tokio::time::sleep(*delay).await,
            StartReply::Accepted => {}
        }
        Ok(FetchJobStarted {
            task_id: PhaseTaskId::new("task-1").unwrap(),
            fetch_job_id: FetchJobId::new("1").unwrap(),
            timestamp: "2024-05-01 10:00:00".to_string(),
        })
    }

    async fn fetch_status(&self, request: &StatusRequest) -> Result<PhaseStatus, TransportError> {
        self.record(format!("status:{}", request.phase));
        self.requests.lock().unwrap().push(request.clone());

        let Some(step) = self.next_step(request.phase) else {
            return Err(TransportError::new(
                request.phase,
                ClientError::InvalidResponse("script exhausted".to_string()),
            ));
        };
        if let Some(delay) = step.delay {
            tokio::time::sleep(delay).await;
        }

        match step.reply {
            Reply::Status(body) => decode_status(request.phase, body, false)
                .map_err(|cause| TransportError::new(request.phase, cause)),
            Reply::HttpError(status) => Err(TransportError::new(
                request.phase,
                ClientError::Status {
                    status,
                    body: String::new(),
                },
            )),
        }
    }

    async fn start_index_refresh(
        &self,
        fetch_job_id: &FetchJobId,
    ) -> Result<IndexRefreshStart, TransportError> {
        self.record(format!("index_refresh:{fetch_job_id}"));
        match self.index_refresh {
            IndexReply::Start(start) => Ok(start),
            IndexReply::HttpError(status) => Err(TransportError::new(
                PhaseKind::IndexRefresh,
                ClientError::Status {
                    status,
                    body: String::new(),
                },
            )),
        }
    }
}
