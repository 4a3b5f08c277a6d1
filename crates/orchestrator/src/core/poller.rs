//! The one poller every pipeline phase runs on.
//!
//! A [`PhasePoller`] issues status requests for a single phase, one at a
//! time, until the backend reports a terminal state, the phase deadline
//! passes, or the job is cancelled. Phase state lives in the poller and the
//! request it threads from tick to tick; nothing is rescheduled recursively.

use std::time::Duration;

use aggregator::{StatusRequest, StatusSource, TransportError};
use aipscan_core::{PhaseKind, PhaseStatus, TaskState};
use events::Event;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::state_machine::{PollerState, PollerStateMachine};

use super::events::JobEmitter;

/// Why a phase ended unsuccessfully.
#[derive(Debug)]
pub enum PhaseFailure {
    /// The backend reported the failure literal.
    Backend {
        state: String,
        message: Option<String>,
    },
    /// The backend could not be reached or answered garbage.
    Transport(TransportError),
}

impl PhaseFailure {
    pub fn reason(&self) -> String {
        match self {
            Self::Backend {
                state,
                message: Some(message),
            } => format!("{state}: {message}"),
            Self::Backend { state, .. } => state.clone(),
            Self::Transport(e) => e.to_string(),
        }
    }
}

#[derive(Debug)]
pub enum PhaseOutcome {
    /// Final status of the phase, carrying any handoff token.
    Succeeded(PhaseStatus),
    Failed(PhaseFailure),
    TimedOut { elapsed: Duration },
    /// Cancelled from outside; nothing was emitted for it.
    Cancelled,
}

pub struct PhasePoller<'a> {
    source: &'a dyn StatusSource,
    emitter: &'a JobEmitter,
    cancel: &'a CancellationToken,
    interval: Duration,
    max_duration: Option<Duration>,
    state: PollerState,
    message_shown: bool,
    ticks: u64,
}

impl<'a> PhasePoller<'a> {
    pub fn new(
        source: &'a dyn StatusSource,
        emitter: &'a JobEmitter,
        cancel: &'a CancellationToken,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            source,
            emitter,
            cancel,
            interval: config.poll_interval(),
            max_duration: config.phase_timeout(),
            state: PollerState::Idle,
            message_shown: false,
            ticks: 0,
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    /// Number of status responses processed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Poll `request.phase` until it ends.
    ///
    /// Only a fresh poller can run; a second call fails with an invalid
    /// transition.
    pub async fn run(&mut self, mut request: StatusRequest) -> Result<PhaseOutcome> {
        self.transition(PollerState::Polling)?;

        let phase = request.phase;
        let started = Instant::now();
        let deadline = self.max_duration.map(|max| started + max);
        debug!(
            job_id = %self.emitter.job_id(),
            phase = %phase,
            task_id = %request.task_id,
            "Phase polling started"
        );

        loop {
            let fetched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.cancelled(phase),
                _ = wait_for(deadline) => return self.timed_out(phase, started.elapsed()),
                result = self.source.fetch_status(&request) => result,
            };
            if self.cancel.is_cancelled() {
                return self.cancelled(phase);
            }
            self.ticks += 1;

            let status = match fetched {
                Ok(status) => status,
                Err(e) => {
                    warn!(
                        job_id = %self.emitter.job_id(),
                        phase = %phase,
                        error = %e,
                        "Status request failed"
                    );
                    return self.failed(phase, PhaseFailure::Transport(e));
                }
            };

            match status.state {
                TaskState::Failed => {
                    let failure = PhaseFailure::Backend {
                        state: status.raw_state,
                        message: status.message,
                    };
                    return self.failed(phase, failure);
                }
                TaskState::Completed => return self.succeeded(phase, status),
                TaskState::Pending | TaskState::InProgress => {
                    self.report_tick(phase, &status);
                    if let Some(processed) = status.processed {
                        request.total_aips = processed;
                    }
                    self.transition(PollerState::Polling)?;
                }
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.cancelled(phase),
                _ = wait_for(deadline) => return self.timed_out(phase, started.elapsed()),
                _ = sleep(self.interval) => {}
            }
        }
    }

    fn report_tick(&mut self, phase: PhaseKind, status: &PhaseStatus) {
        let job_id = self.emitter.job_id();

        if !self.message_shown {
            if let Some(ref message) = status.message {
                self.emitter.emit(Event::PhaseMessage {
                    job_id,
                    phase,
                    message: message.clone(),
                });
                self.message_shown = true;
            }
        }

        for line in &status.progress {
            self.emitter.emit(Event::PhaseMessage {
                job_id,
                phase,
                message: line.clone(),
            });
        }

        self.emitter.emit(Event::PhaseProgress {
            job_id,
            phase,
            state: status.raw_state.clone(),
            processed: status.processed,
        });
    }

    fn succeeded(&mut self, phase: PhaseKind, status: PhaseStatus) -> Result<PhaseOutcome> {
        self.transition(PollerState::Succeeded)?;
        let job_id = self.emitter.job_id();

        if let Some(literal) = status.unrecognized_success() {
            self.emitter.emit(Event::PhaseMessage {
                job_id,
                phase,
                message: literal.to_string(),
            });
        }
        self.emitter.emit(Event::PhaseSucceeded {
            job_id,
            phase,
            state: status.raw_state.clone(),
        });

        info!(job_id = %job_id, phase = %phase, ticks = self.ticks, "Phase succeeded");
        Ok(PhaseOutcome::Succeeded(status))
    }

    fn failed(&mut self, phase: PhaseKind, failure: PhaseFailure) -> Result<PhaseOutcome> {
        self.transition(PollerState::Failed)?;
        let job_id = self.emitter.job_id();
        let reason = failure.reason();

        self.emitter.emit(Event::PhaseFailed {
            job_id,
            phase,
            reason: reason.clone(),
        });

        warn!(job_id = %job_id, phase = %phase, reason = %reason, "Phase failed");
        Ok(PhaseOutcome::Failed(failure))
    }

    fn timed_out(&mut self, phase: PhaseKind, elapsed: Duration) -> Result<PhaseOutcome> {
        self.transition(PollerState::TimedOut)?;
        warn!(
            job_id = %self.emitter.job_id(),
            phase = %phase,
            elapsed_ms = elapsed.as_millis() as u64,
            "Phase exceeded its maximum duration"
        );
        Ok(PhaseOutcome::TimedOut { elapsed })
    }

    fn cancelled(&mut self, phase: PhaseKind) -> Result<PhaseOutcome> {
        self.transition(PollerState::Cancelled)?;
        debug!(job_id = %self.emitter.job_id(), phase = %phase, "Phase polling cancelled");
        Ok(PhaseOutcome::Cancelled)
    }

    fn transition(&mut self, to: PollerState) -> Result<()> {
        PollerStateMachine::validate_transition(&self.state, &to)?;
        self.state = to;
        Ok(())
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::JobCancellation;
    use crate::testing::{ScriptedSource, Step};
    use aipscan_core::{FetchJobId, JobId, PhaseTaskId};
    use events::EventEnvelope;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Harness {
        emitter: JobEmitter,
        rx: mpsc::UnboundedReceiver<EventEnvelope>,
        cancel: JobCancellation,
        config: MonitorConfig,
    }

    impl Harness {
        fn new() -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let cancel = JobCancellation::new();
            Self {
                emitter: JobEmitter::new(JobId::new(), tx, cancel.clone()),
                rx,
                cancel,
                config: MonitorConfig::default(),
            }
        }

        fn drain(&mut self) -> Vec<Event> {
            let mut events = Vec::new();
            while let Ok(envelope) = self.rx.try_recv() {
                events.push(envelope.event);
            }
            events
        }
    }

    fn package_list_request() -> StatusRequest {
        StatusRequest::package_list(PhaseTaskId::new("task-1").unwrap())
    }

    fn messages(events: &[Event]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::PhaseMessage { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_terminal_event_after_pending_ticks() {
        let source = ScriptedSource::new().with_phase(
            PhaseKind::PackageList,
            vec![
                Step::status(json!({"state": "PENDING"})),
                Step::status(json!({"state": "IN PROGRESS"})),
                Step::status(json!({"state": "IN PROGRESS"})),
                Step::status(json!({"state": "SUCCESS", "coordinatorId": "c-1"})),
            ],
        );
        let mut h = Harness::new();

        let mut poller = PhasePoller::new(&source, &h.emitter, h.cancel.token(), &h.config);
        let outcome = poller.run(package_list_request()).await.unwrap();

        match outcome {
            PhaseOutcome::Succeeded(status) => {
                assert_eq!(status.coordinator_id.as_deref(), Some("c-1"))
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(poller.state(), PollerState::Succeeded);
        assert_eq!(source.request_count(PhaseKind::PackageList), 4);

        let events = h.drain();
        let heartbeats = events
            .iter()
            .filter(|e| matches!(e, Event::PhaseProgress { .. }))
            .count();
        assert_eq!(heartbeats, 3);
        let terminals = events
            .iter()
            .filter(|e| matches!(e, Event::PhaseSucceeded { .. } | Event::PhaseFailed { .. }))
            .count();
        assert_eq!(terminals, 1);
        assert!(matches!(events.last(), Some(Event::PhaseSucceeded { .. })));
        // SUCCESS is not the canonical completion literal, so it is surfaced.
        assert_eq!(messages(&events), vec!["SUCCESS".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_message_shown_once() {
        let source = ScriptedSource::new().with_phase(
            PhaseKind::PackageList,
            vec![
                Step::status(json!({"state": "PENDING"})),
                Step::status(json!({"state": "IN PROGRESS", "message": "Listing packages"})),
                Step::status(json!({"state": "IN PROGRESS", "message": "Listing packages"})),
                Step::status(json!({"state": "IN PROGRESS", "message": "Still listing"})),
                Step::status(json!({"state": "COMPLETED"})),
            ],
        );
        let mut h = Harness::new();

        let mut poller = PhasePoller::new(&source, &h.emitter, h.cancel.token(), &h.config);
        poller.run(package_list_request()).await.unwrap();

        let events = h.drain();
        assert_eq!(messages(&events), vec!["Listing packages".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_literal_wins() {
        let source = ScriptedSource::new().with_phase(
            PhaseKind::PackageList,
            vec![
                Step::status(json!({"state": "FAILURE", "status": "boom"})),
                Step::status(json!({"state": "SUCCESS"})),
            ],
        );
        let mut h = Harness::new();

        let mut poller = PhasePoller::new(&source, &h.emitter, h.cancel.token(), &h.config);
        let outcome = poller.run(package_list_request()).await.unwrap();

        match outcome {
            PhaseOutcome::Failed(failure) => assert_eq!(failure.reason(), "FAILURE: boom"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(source.request_count(PhaseKind::PackageList), 1);
        let events = h.drain();
        assert!(matches!(events.as_slice(), [Event::PhaseFailed { .. }]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_fails_phase() {
        let source = ScriptedSource::new()
            .with_phase(PhaseKind::PackageList, vec![Step::transport_error(503)]);
        let mut h = Harness::new();

        let mut poller = PhasePoller::new(&source, &h.emitter, h.cancel.token(), &h.config);
        let outcome = poller.run(package_list_request()).await.unwrap();

        assert!(matches!(
            outcome,
            PhaseOutcome::Failed(PhaseFailure::Transport(_))
        ));
        assert_eq!(poller.state(), PollerState::Failed);
        assert_eq!(h.drain().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_count_threaded_into_next_request() {
        let source = ScriptedSource::new().with_phase(
            PhaseKind::MetsDownload,
            vec![
                Step::status(json!([
                    {"state": "PARSING", "totalAIPs": 5, "package": "a"},
                    {"state": "PARSING", "totalAIPs": 9, "package": "b"}
                ])),
                Step::status(json!([])),
                Step::status(json!({"state": "COMPLETED"})),
            ],
        );
        let mut h = Harness::new();
        let request = StatusRequest::mets(
            PhaseTaskId::new("coord").unwrap(),
            FetchJobId::new("1").unwrap(),
        );

        let mut poller = PhasePoller::new(&source, &h.emitter, h.cancel.token(), &h.config);
        poller.run(request).await.unwrap();

        assert_eq!(source.sent_counts(PhaseKind::MetsDownload), vec![0, 9, 9]);
        let events = h.drain();
        assert_eq!(
            messages(&events),
            vec![
                "PARSING parsing 5. a".to_string(),
                "PARSING parsing 9. b".to_string()
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_on_fixed_interval() {
        let source = ScriptedSource::new().with_phase(
            PhaseKind::PackageList,
            vec![
                Step::status(json!({"state": "PENDING"})),
                Step::status(json!({"state": "PENDING"})),
                Step::status(json!({"state": "COMPLETED"})),
            ],
        );
        let h = Harness::new();
        let started = Instant::now();

        let mut poller = PhasePoller::new(&source, &h.emitter, h.cancel.token(), &h.config);
        poller.run(package_list_request()).await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_ends_phase() {
        let source = ScriptedSource::new().with_phase(
            PhaseKind::PackageList,
            vec![Step::status(json!({"state": "PENDING"})).repeat()],
        );
        let mut h = Harness::new();
        h.config = MonitorConfig::default().with_phase_timeout(Some(Duration::from_secs(10)));

        let mut poller = PhasePoller::new(&source, &h.emitter, h.cancel.token(), &h.config);
        let outcome = poller.run(package_list_request()).await.unwrap();

        match outcome {
            PhaseOutcome::TimedOut { elapsed } => assert_eq!(elapsed, Duration::from_secs(10)),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(poller.state(), PollerState::TimedOut);
        assert_eq!(source.request_count(PhaseKind::PackageList), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_requests_and_events() {
        let source = ScriptedSource::new().with_phase(
            PhaseKind::PackageList,
            vec![Step::status(json!({"state": "PENDING"})).repeat()],
        );
        let mut h = Harness::new();
        let cancel = h.cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(2500)).await;
            cancel.cancel();
        });

        let mut poller = PhasePoller::new(&source, &h.emitter, h.cancel.token(), &h.config);
        let outcome = poller.run(package_list_request()).await.unwrap();

        assert!(matches!(outcome, PhaseOutcome::Cancelled));
        assert_eq!(source.request_count(PhaseKind::PackageList), 3);
        let heartbeats = h.drain().len();
        assert_eq!(heartbeats, 3);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(source.request_count(PhaseKind::PackageList), 3);
        assert!(h.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_in_flight_request_is_silent() {
        let source = ScriptedSource::new().with_phase(
            PhaseKind::PackageList,
            vec![Step::status(json!({"state": "COMPLETED"})).delayed(Duration::from_secs(5))],
        );
        let mut h = Harness::new();
        let cancel = h.cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        });

        let mut poller = PhasePoller::new(&source, &h.emitter, h.cancel.token(), &h.config);
        let outcome = poller.run(package_list_request()).await.unwrap();

        assert!(matches!(outcome, PhaseOutcome::Cancelled));
        assert!(h.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_is_single_use() {
        let source = ScriptedSource::new().with_phase(
            PhaseKind::PackageList,
            vec![Step::status(json!({"state": "COMPLETED"}))],
        );
        let h = Harness::new();

        let mut poller = PhasePoller::new(&source, &h.emitter, h.cancel.token(), &h.config);
        poller.run(package_list_request()).await.unwrap();

        assert!(poller.run(package_list_request()).await.is_err());
        assert_eq!(source.request_count(PhaseKind::PackageList), 1);
    }
}
