//! Core abstractions for observing a single phase.
//!
//! - [`PhasePoller`] - The one poller every pipeline phase runs on
//! - [`PhaseOutcome`] - How a phase ended
//! - [`JobEmitter`] - Event emitter with sequence guarantees
//! - [`JobCancellation`] - Stop signal gating the emitter

mod cancel;
mod events;
mod poller;

pub use cancel::JobCancellation;
pub use events::JobEmitter;
pub use poller::{PhaseFailure, PhaseOutcome, PhasePoller};
