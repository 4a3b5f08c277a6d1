mod ids;
mod job;
mod phase;

pub use ids::{FetchJobId, JobId, PhaseTaskId, StorageServiceId};
pub use job::{JobOutcome, JobState};
pub use phase::{state_literal, PhaseKind, PhaseStatus, TaskState};
