//! Ownership of the per-storage-service launch trigger.
//!
//! - [`JobRegistry`] - At most one active job per storage service
//! - [`TriggerGuard`] - Releases the registry slot exactly once

mod registry;
mod trigger_guard;

pub use registry::JobRegistry;
pub use trigger_guard::TriggerGuard;
