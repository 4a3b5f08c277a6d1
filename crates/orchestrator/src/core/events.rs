//! Per-job event emitter with sequence guarantees.
//!
//! Every event of a job goes through one [`JobEmitter`]. It numbers events,
//! hands them to the job's own stream and mirrors them onto the shared
//! [`EventBus`] when one is attached. Once the job is cancelled it drops
//! everything.

use std::sync::atomic::{AtomicU64, Ordering};

use aipscan_core::JobId;
use events::{Event, EventBus, EventEnvelope};
use tokio::sync::mpsc;
use tracing::trace;

use super::cancel::JobCancellation;

pub struct JobEmitter {
    job_id: JobId,
    sender: mpsc::UnboundedSender<EventEnvelope>,
    bus: Option<EventBus>,
    sequence: AtomicU64,
    cancel: JobCancellation,
}

impl JobEmitter {
    pub fn new(
        job_id: JobId,
        sender: mpsc::UnboundedSender<EventEnvelope>,
        cancel: JobCancellation,
    ) -> Self {
        Self {
            job_id,
            sender,
            bus: None,
            sequence: AtomicU64::new(0),
            cancel,
        }
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Emit an event with the next sequence number.
    ///
    /// Returns `false` when the job was cancelled and the event dropped.
    pub fn emit(&self, event: Event) -> bool {
        let _gate = self.cancel.gate();
        if self.cancel.is_cancelled() {
            trace!(job_id = %self.job_id, ?event, "Dropping event of cancelled job");
            return false;
        }

        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope::new(event).with_sequence(seq);

        if let Some(ref bus) = self.bus {
            bus.publish(envelope.clone());
        }
        // The job keeps running even if nobody holds its stream any more.
        let _ = self.sender.send(envelope);
        true
    }

    /// Number of events emitted so far.
    pub fn current_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}
