use serde::{Deserialize, Serialize};

use super::ids::JobId;
use super::phase::PhaseKind;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    #[default]
    Running,
    Succeeded,
    Failed,
    IndexingSkipped,
    TimedOut,
    Cancelled,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::IndexingSkipped => "indexing_skipped",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Progress of one job through the ordered pipeline phases.
///
/// Exactly one phase is current at a time and the index only moves forward.
/// Once the outcome leaves `Running` the state is frozen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub job_id: JobId,
    pub phases: Vec<PhaseKind>,
    current_phase_index: usize,
    outcome: JobOutcome,
}

impl JobState {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            phases: PhaseKind::PIPELINE.to_vec(),
            current_phase_index: 0,
            outcome: JobOutcome::Running,
        }
    }

    pub fn current_phase_index(&self) -> usize {
        self.current_phase_index
    }

    pub fn current_phase(&self) -> PhaseKind {
        self.phases[self.current_phase_index]
    }

    pub fn outcome(&self) -> JobOutcome {
        self.outcome
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_terminal()
    }

    /// Move to the next phase after the current one succeeded.
    pub fn advance(&mut self) -> Result<PhaseKind> {
        self.ensure_running("advance")?;
        if self.current_phase_index + 1 >= self.phases.len() {
            return Err(CoreError::InvalidJobTransition {
                from: self.current_phase().as_str().to_string(),
                to: "past last phase".to_string(),
            });
        }
        self.current_phase_index += 1;
        Ok(self.current_phase())
    }

    /// Record the terminal outcome. Can only happen once.
    pub fn finish(&mut self, outcome: JobOutcome) -> Result<()> {
        self.ensure_running(outcome.as_str())?;
        if !outcome.is_terminal() {
            return Err(CoreError::Validation(
                "running is not a terminal outcome".to_string(),
            ));
        }
        self.outcome = outcome;
        Ok(())
    }

    fn ensure_running(&self, to: &str) -> Result<()> {
        if self.is_terminal() {
            return Err(CoreError::InvalidJobTransition {
                from: self.outcome.as_str().to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_starts_at_package_list() {
        let state = JobState::new(JobId::new());
        assert_eq!(state.current_phase(), PhaseKind::PackageList);
        assert_eq!(state.current_phase_index(), 0);
        assert_eq!(state.outcome(), JobOutcome::Running);
    }

    #[test]
    fn test_advance_through_pipeline() {
        let mut state = JobState::new(JobId::new());
        assert_eq!(state.advance().unwrap(), PhaseKind::MetsDownload);
        assert_eq!(state.advance().unwrap(), PhaseKind::IndexRefresh);
        assert!(state.advance().is_err());
        assert_eq!(state.current_phase_index(), 2);
    }

    #[test]
    fn test_terminal_state_is_frozen() {
        let mut state = JobState::new(JobId::new());
        state.finish(JobOutcome::Failed).unwrap();

        assert!(state.is_terminal());
        assert!(state.advance().is_err());
        assert!(state.finish(JobOutcome::Succeeded).is_err());
        assert_eq!(state.current_phase(), PhaseKind::PackageList);
    }

    #[test]
    fn test_running_is_not_a_finish() {
        let mut state = JobState::new(JobId::new());
        assert!(state.finish(JobOutcome::Running).is_err());
        assert!(!state.is_terminal());
    }
}
