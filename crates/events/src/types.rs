//! Event types emitted while a fetch job is monitored

use aipscan_core::{JobId, PhaseKind, StorageServiceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// Position of the event within its job's stream
    pub sequence: u64,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: Event,
}

impl EventEnvelope {
    /// Create a new event envelope with auto-generated ID and timestamp
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            timestamp: Utc::now(),
            event,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }
}

/// Everything a progress display can observe about a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Job lifecycle
    /// Backend accepted the fetch job
    #[serde(rename = "job.started")]
    JobStarted {
        job_id: JobId,
        storage_service_id: StorageServiceId,
        fetch_job_id: String,
        /// Backend timestamp of the job start, verbatim
        started_at: String,
    },

    /// Backend refused to start the fetch job
    #[serde(rename = "job.start_failed")]
    JobStartFailed { job_id: JobId, reason: String },

    /// Pipeline finished. `indexed` is false when the backend reported that
    /// no index refresh was needed.
    #[serde(rename = "job.completed")]
    JobCompleted {
        job_id: JobId,
        indexed: bool,
        /// Delay after which the display should reload
        refresh_after_ms: u64,
    },

    /// Pipeline halted at a phase
    #[serde(rename = "job.failed")]
    JobFailed {
        job_id: JobId,
        phase: PhaseKind,
        reason: String,
    },

    /// A phase exceeded its maximum duration
    #[serde(rename = "job.timed_out")]
    JobTimedOut {
        job_id: JobId,
        phase: PhaseKind,
        elapsed_ms: u64,
    },

    /// The launch control for this storage service may be used again
    #[serde(rename = "trigger.released")]
    TriggerReleased {
        job_id: JobId,
        storage_service_id: StorageServiceId,
    },

    // Phase events
    #[serde(rename = "phase.started")]
    PhaseStarted { job_id: JobId, phase: PhaseKind },

    /// A line of text for the display
    #[serde(rename = "phase.message")]
    PhaseMessage {
        job_id: JobId,
        phase: PhaseKind,
        message: String,
    },

    /// Heartbeat emitted once per non-terminal poll
    #[serde(rename = "phase.progress")]
    PhaseProgress {
        job_id: JobId,
        phase: PhaseKind,
        state: String,
        processed: Option<u64>,
    },

    #[serde(rename = "phase.succeeded")]
    PhaseSucceeded {
        job_id: JobId,
        phase: PhaseKind,
        state: String,
    },

    #[serde(rename = "phase.failed")]
    PhaseFailed {
        job_id: JobId,
        phase: PhaseKind,
        reason: String,
    },
}

impl Event {
    /// Get the job ID this event belongs to
    pub fn job_id(&self) -> JobId {
        match self {
            Event::JobStarted { job_id, .. }
            | Event::JobStartFailed { job_id, .. }
            | Event::JobCompleted { job_id, .. }
            | Event::JobFailed { job_id, .. }
            | Event::JobTimedOut { job_id, .. }
            | Event::TriggerReleased { job_id, .. }
            | Event::PhaseStarted { job_id, .. }
            | Event::PhaseMessage { job_id, .. }
            | Event::PhaseProgress { job_id, .. }
            | Event::PhaseSucceeded { job_id, .. }
            | Event::PhaseFailed { job_id, .. } => *job_id,
        }
    }

    /// Get the phase this event belongs to, if any
    pub fn phase(&self) -> Option<PhaseKind> {
        match self {
            Event::JobFailed { phase, .. }
            | Event::JobTimedOut { phase, .. }
            | Event::PhaseStarted { phase, .. }
            | Event::PhaseMessage { phase, .. }
            | Event::PhaseProgress { phase, .. }
            | Event::PhaseSucceeded { phase, .. }
            | Event::PhaseFailed { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Whether this event ends the job's stream
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Event::JobStartFailed { .. }
                | Event::JobCompleted { .. }
                | Event::JobFailed { .. }
                | Event::JobTimedOut { .. }
        )
    }
}
