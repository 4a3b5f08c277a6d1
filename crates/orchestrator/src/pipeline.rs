//! Sequencing of the fetch job phases.
//!
//! [`PipelineOrchestrator::start`] claims the launch trigger of a storage
//! service, starts the backend fetch job and spawns one task that walks the
//! phases in order. Everything the job does is reported through the
//! [`JobHandle`] event stream.

use std::sync::Arc;

use aggregator::{ClientError, IndexRefreshStart, StatusRequest, StatusSource};
use aipscan_core::{
    FetchJobId, JobId, JobOutcome, JobState, PhaseKind, PhaseStatus, PhaseTaskId,
    StorageServiceId,
};
use events::{Event, EventBus, EventEnvelope, JobSubscription};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::MonitorConfig;
use crate::core::{JobCancellation, JobEmitter, PhaseOutcome, PhasePoller};
use crate::error::Result;
use crate::resources::{JobRegistry, TriggerGuard};

/// Starts and tracks fetch jobs against one aggregator backend.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    source: Arc<dyn StatusSource>,
    config: MonitorConfig,
    registry: JobRegistry,
    event_bus: Option<EventBus>,
}

impl PipelineOrchestrator {
    pub fn new(source: Arc<dyn StatusSource>, config: MonitorConfig) -> Self {
        Self {
            source,
            config,
            registry: JobRegistry::new(),
            event_bus: None,
        }
    }

    /// Mirror every job event onto a shared bus.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Start a fetch job for `storage_service_id`.
    ///
    /// Fails with `JobAlreadyRunning` while another job of the same storage
    /// service is active. Must be called from within a tokio runtime.
    pub fn start(&self, storage_service_id: StorageServiceId) -> Result<JobHandle> {
        let job_id = JobId::new();
        let cancel = JobCancellation::new();
        let guard = self
            .registry
            .acquire(&storage_service_id, job_id, cancel.clone())?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut emitter = JobEmitter::new(job_id, tx, cancel.clone());
        if let Some(ref bus) = self.event_bus {
            emitter = emitter.with_event_bus(bus.clone());
        }

        let runner = JobRunner {
            source: Arc::clone(&self.source),
            config: self.config.clone(),
            emitter,
            cancel: cancel.token().clone(),
            storage_service_id: storage_service_id.clone(),
        };

        info!(
            job_id = %job_id,
            storage_service_id = %storage_service_id,
            "Fetch job scheduled"
        );
        let task = tokio::spawn(runner.run(guard));

        Ok(JobHandle {
            job_id,
            storage_service_id,
            events: UnboundedReceiverStream::new(rx),
            cancel,
            task,
        })
    }

    /// Cancel a running job. Returns `false` if no such job is active.
    pub fn cancel(&self, job_id: JobId) -> bool {
        let found = self.registry.cancel(job_id);
        if found {
            info!(job_id = %job_id, "Fetch job cancelled");
        }
        found
    }

    /// Follow one job on the shared bus. The subscription ends with the
    /// job's terminal event or when the job is cancelled.
    ///
    /// Returns `None` when no bus is attached.
    pub fn subscribe_job(&self, handle: &JobHandle) -> Option<JobSubscription> {
        self.event_bus.as_ref().map(|bus| {
            bus.subscribe_job(handle.job_id)
                .with_cancellation(handle.cancel.token().clone())
        })
    }
}

/// Caller's side of a running job.
pub struct JobHandle {
    job_id: JobId,
    storage_service_id: StorageServiceId,
    events: UnboundedReceiverStream<EventEnvelope>,
    cancel: JobCancellation,
    task: JoinHandle<JobOutcome>,
}

impl JobHandle {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn storage_service_id(&self) -> &StorageServiceId {
        &self.storage_service_id
    }

    /// Next event of the job, `None` once the job has ended.
    pub async fn next_event(&mut self) -> Option<EventEnvelope> {
        self.events.next().await
    }

    /// Stop the job. No event is emitted after this returns.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the job task and return its outcome.
    pub async fn join(self) -> JobOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(job_id = %self.job_id, error = %e, "Fetch job task aborted");
                JobOutcome::Failed
            }
        }
    }
}

/// Why a job stopped.
#[derive(Debug)]
enum Halt {
    Completed { indexed: bool },
    StartFailed(String),
    Failed { phase: PhaseKind, reason: String },
    TimedOut { phase: PhaseKind, elapsed_ms: u64 },
    Cancelled,
}

impl Halt {
    fn outcome(&self) -> JobOutcome {
        match self {
            Self::Completed { indexed: true } => JobOutcome::Succeeded,
            Self::Completed { indexed: false } => JobOutcome::IndexingSkipped,
            Self::StartFailed(_) | Self::Failed { .. } => JobOutcome::Failed,
            Self::TimedOut { .. } => JobOutcome::TimedOut,
            Self::Cancelled => JobOutcome::Cancelled,
        }
    }

    fn terminal_event(self, job_id: JobId, refresh_after_ms: u64) -> Option<Event> {
        match self {
            Self::Completed { indexed } => Some(Event::JobCompleted {
                job_id,
                indexed,
                refresh_after_ms,
            }),
            Self::StartFailed(reason) => Some(Event::JobStartFailed { job_id, reason }),
            Self::Failed { phase, reason } => Some(Event::JobFailed {
                job_id,
                phase,
                reason,
            }),
            Self::TimedOut { phase, elapsed_ms } => Some(Event::JobTimedOut {
                job_id,
                phase,
                elapsed_ms,
            }),
            Self::Cancelled => None,
        }
    }
}

struct JobRunner {
    source: Arc<dyn StatusSource>,
    config: MonitorConfig,
    emitter: JobEmitter,
    cancel: CancellationToken,
    storage_service_id: StorageServiceId,
}

impl JobRunner {
    async fn run(self, guard: TriggerGuard) -> JobOutcome {
        let job_id = self.emitter.job_id();
        let mut state = JobState::new(job_id);

        let halt = match self.drive(&mut state).await {
            Ok(halt) | Err(halt) => halt,
        };
        let outcome = halt.outcome();
        if let Err(e) = state.finish(outcome) {
            warn!(job_id = %job_id, error = %e, "Job state already finished");
        }

        match halt.terminal_event(job_id, self.config.refresh_delay_ms) {
            Some(event) => {
                guard.release();
                self.emitter.emit(Event::TriggerReleased {
                    job_id,
                    storage_service_id: self.storage_service_id.clone(),
                });
                self.emitter.emit(event);
            }
            None => drop(guard),
        }

        info!(
            job_id = %job_id,
            outcome = outcome.as_str(),
            phase = %state.current_phase(),
            "Fetch job finished"
        );
        outcome
    }

    /// Walk the pipeline. Both arms carry the reason the job stopped; `Err`
    /// marks an early halt.
    async fn drive(&self, state: &mut JobState) -> std::result::Result<Halt, Halt> {
        let job_id = self.emitter.job_id();

        let started = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Halt::Cancelled),
            result = self.source.start_fetch_job(&self.storage_service_id) => result,
        };
        let started = started.map_err(|e| {
            warn!(
                job_id = %job_id,
                storage_service_id = %self.storage_service_id,
                error = %e,
                "Fetch job could not be started"
            );
            Halt::StartFailed(start_failure_reason(e))
        })?;

        self.emitter.emit(Event::JobStarted {
            job_id,
            storage_service_id: self.storage_service_id.clone(),
            fetch_job_id: started.fetch_job_id.to_string(),
            started_at: started.timestamp.clone(),
        });
        info!(
            job_id = %job_id,
            fetch_job_id = %started.fetch_job_id,
            task_id = %started.task_id,
            "Fetch job started"
        );

        let package_list = self
            .run_phase(state, StatusRequest::package_list(started.task_id.clone()))
            .await?;
        let coordinator_id = handoff_token(job_id, &package_list, &started.task_id);
        self.advance(state)?;

        let fetch_job_id = started.fetch_job_id;
        self.run_phase(
            state,
            StatusRequest::mets(coordinator_id, fetch_job_id.clone()),
        )
        .await?;

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Halt::Cancelled),
            _ = sleep(self.config.settle_delay()) => {}
        }
        self.advance(state)?;

        self.refresh_index(state, fetch_job_id).await
    }

    async fn refresh_index(
        &self,
        state: &JobState,
        fetch_job_id: FetchJobId,
    ) -> std::result::Result<Halt, Halt> {
        let phase = state.current_phase();

        let start = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Halt::Cancelled),
            result = self.source.start_index_refresh(&fetch_job_id) => result,
        };
        if self.cancel.is_cancelled() {
            return Err(Halt::Cancelled);
        }

        match start {
            Ok(IndexRefreshStart::NotNeeded) => {
                info!(
                    job_id = %self.emitter.job_id(),
                    fetch_job_id = %fetch_job_id,
                    "Index refresh not needed"
                );
                Ok(Halt::Completed { indexed: false })
            }
            Ok(IndexRefreshStart::Started) => {
                self.run_phase(state, StatusRequest::indexing(fetch_job_id))
                    .await?;
                Ok(Halt::Completed { indexed: true })
            }
            Err(e) => Err(Halt::Failed {
                phase,
                reason: e.to_string(),
            }),
        }
    }

    async fn run_phase(
        &self,
        state: &JobState,
        request: StatusRequest,
    ) -> std::result::Result<PhaseStatus, Halt> {
        let phase = request.phase;
        debug_assert_eq!(phase, state.current_phase());

        self.emitter.emit(Event::PhaseStarted {
            job_id: self.emitter.job_id(),
            phase,
        });

        let mut poller = PhasePoller::new(
            self.source.as_ref(),
            &self.emitter,
            &self.cancel,
            &self.config,
        );
        let outcome = poller.run(request).await.map_err(|e| Halt::Failed {
            phase,
            reason: e.to_string(),
        })?;

        match outcome {
            PhaseOutcome::Succeeded(status) => Ok(status),
            PhaseOutcome::Failed(failure) => Err(Halt::Failed {
                phase,
                reason: failure.reason(),
            }),
            PhaseOutcome::TimedOut { elapsed } => Err(Halt::TimedOut {
                phase,
                elapsed_ms: elapsed.as_millis() as u64,
            }),
            PhaseOutcome::Cancelled => Err(Halt::Cancelled),
        }
    }

    fn advance(&self, state: &mut JobState) -> std::result::Result<(), Halt> {
        let phase = state.current_phase();
        state.advance().map(|_| ()).map_err(|e| Halt::Failed {
            phase,
            reason: e.to_string(),
        })
    }
}

fn start_failure_reason(error: ClientError) -> String {
    match error {
        ClientError::Rejected(message) => message,
        other => format!("Unable to connect to storage service: {other}"),
    }
}

/// Task id the METS phase is polled with.
fn handoff_token(job_id: JobId, status: &PhaseStatus, task_id: &PhaseTaskId) -> PhaseTaskId {
    match status
        .coordinator_id
        .as_deref()
        .and_then(|id| PhaseTaskId::new(id).ok())
    {
        Some(coordinator_id) => coordinator_id,
        None => {
            warn!(
                job_id = %job_id,
                task_id = %task_id,
                "Package list finished without a coordinator id, reusing its task id"
            );
            task_id.clone()
        }
    }
}
