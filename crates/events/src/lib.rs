//! Event system for the fetch-job monitor
//!
//! This crate provides the event bus and event types that carry job and
//! phase progress from the orchestrator to any number of displays.

mod bus;
mod types;

pub use bus::{EventBus, JobSubscription};
pub use types::*;
