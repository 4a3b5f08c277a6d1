//! Broadcast bus shared by every monitored fetch job
//!
//! The orchestrator mirrors each job's events here so that displays other
//! than the job's own caller can follow it. [`JobSubscription`] narrows the
//! stream down to a single job and knows when that job is over.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use aipscan_core::JobId;

use crate::types::EventEnvelope;

/// Events a slow subscriber may fall behind before it starts lagging
const DEFAULT_CAPACITY: usize = 1000;

/// Shared bus carrying the events of every monitored job
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    /// Events published since the bus was created, across all jobs
    event_count: Arc<AtomicUsize>,
}

impl EventBus {
    /// Create a bus holding up to 1000 unread events per subscriber
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus with a custom lag limit
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            event_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Hand an event to every current subscriber
    ///
    /// Returns how many subscribers got it. Without subscribers the event
    /// is counted and then dropped.
    pub fn publish(&self, envelope: EventEnvelope) -> usize {
        self.event_count.fetch_add(1, Ordering::Relaxed);
        self.sender.send(envelope).unwrap_or(0)
    }

    /// Subscribe to the events of all jobs
    ///
    /// Only events published after this call are received.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Subscribe to the events of a single job, up to its terminal event
    pub fn subscribe_job(&self, job_id: JobId) -> JobSubscription {
        JobSubscription {
            job_id,
            receiver: self.sender.subscribe(),
            cancel: None,
            finished: false,
        }
    }

    /// Number of live receivers, job subscriptions included
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Total number of events published so far
    pub fn event_count(&self) -> usize {
        self.event_count.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .field("event_count", &self.event_count())
            .finish()
    }
}

/// Receiver filtered down to one job's events
///
/// A cancelled job emits no terminal event, so the subscription also ends
/// once the job's cancellation token fires and the queued events are
/// drained.
pub struct JobSubscription {
    job_id: JobId,
    receiver: broadcast::Receiver<EventEnvelope>,
    cancel: Option<CancellationToken>,
    finished: bool,
}

impl JobSubscription {
    /// End the subscription when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Next event of the job, or `None` once it is over or the bus is gone
    ///
    /// Lagged events are skipped.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        if self.finished {
            return None;
        }
        loop {
            let received = match self.cancel {
                Some(ref cancel) => tokio::select! {
                    biased;
                    received = self.receiver.recv() => received,
                    _ = cancel.cancelled() => match self.receiver.try_recv() {
                        Ok(envelope) => Ok(envelope),
                        Err(broadcast::error::TryRecvError::Lagged(n)) => {
                            Err(broadcast::error::RecvError::Lagged(n))
                        }
                        Err(_) => {
                            self.finished = true;
                            return None;
                        }
                    },
                },
                None => self.receiver.recv().await,
            };

            match received {
                Ok(envelope) if envelope.event.job_id() == self.job_id => {
                    self.finished = envelope.event.is_terminal();
                    return Some(envelope);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }
}
