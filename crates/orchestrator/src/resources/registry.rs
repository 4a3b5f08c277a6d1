use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use aipscan_core::{JobId, StorageServiceId};
use tracing::debug;

use crate::core::JobCancellation;
use crate::error::{OrchestratorError, Result};

use super::trigger_guard::TriggerGuard;

struct ActiveJob {
    job_id: JobId,
    cancel: JobCancellation,
}

/// Active jobs keyed by storage service.
///
/// Holding a slot is what keeps the launch trigger of a storage service
/// inert; the slot is released by the job's [`TriggerGuard`].
#[derive(Clone, Default)]
pub struct JobRegistry {
    active: Arc<Mutex<HashMap<StorageServiceId, ActiveJob>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot of `storage_service_id` for `job_id`.
    pub fn acquire(
        &self,
        storage_service_id: &StorageServiceId,
        job_id: JobId,
        cancel: JobCancellation,
    ) -> Result<TriggerGuard> {
        let mut active = self.lock();
        if let Some(existing) = active.get(storage_service_id) {
            return Err(OrchestratorError::JobAlreadyRunning {
                storage_service_id: storage_service_id.clone(),
                job_id: existing.job_id,
            });
        }

        active.insert(storage_service_id.clone(), ActiveJob { job_id, cancel });
        debug!(
            storage_service_id = %storage_service_id,
            job_id = %job_id,
            "Launch trigger acquired"
        );

        Ok(TriggerGuard::new(
            storage_service_id.clone(),
            job_id,
            self.clone(),
        ))
    }

    /// Signal cancellation to a running job. Returns `false` if it is not
    /// active.
    pub fn cancel(&self, job_id: JobId) -> bool {
        let active = self.lock();
        match active.values().find(|job| job.job_id == job_id) {
            Some(job) => {
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn active_job(&self, storage_service_id: &StorageServiceId) -> Option<JobId> {
        self.lock().get(storage_service_id).map(|job| job.job_id)
    }

    pub fn is_active(&self, storage_service_id: &StorageServiceId) -> bool {
        self.lock().contains_key(storage_service_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Free the slot if it still belongs to `job_id`.
    pub(super) fn release(&self, storage_service_id: &StorageServiceId, job_id: JobId) -> bool {
        let mut active = self.lock();
        match active.get(storage_service_id) {
            Some(job) if job.job_id == job_id => {
                active.remove(storage_service_id);
                true
            }
            _ => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<StorageServiceId, ActiveJob>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(id: &str) -> StorageServiceId {
        StorageServiceId::new(id).unwrap()
    }

    #[test]
    fn test_second_acquire_is_refused() {
        let registry = JobRegistry::new();
        let first = JobId::new();
        let _guard = registry
            .acquire(&service("1"), first, JobCancellation::new())
            .unwrap();

        match registry.acquire(&service("1"), JobId::new(), JobCancellation::new()) {
            Err(OrchestratorError::JobAlreadyRunning { job_id, .. }) => assert_eq!(job_id, first),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(guard) => panic!("second job acquired {guard:?}"),
        }

        // Other storage services are independent.
        assert!(registry
            .acquire(&service("2"), JobId::new(), JobCancellation::new())
            .is_ok());
    }

    #[test]
    fn test_release_frees_slot() {
        let registry = JobRegistry::new();
        let guard = registry
            .acquire(&service("1"), JobId::new(), JobCancellation::new())
            .unwrap();
        assert!(registry.is_active(&service("1")));

        assert!(guard.release());
        assert!(!registry.is_active(&service("1")));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cancel_signals_token() {
        let registry = JobRegistry::new();
        let job_id = JobId::new();
        let token = JobCancellation::new();
        let _guard = registry
            .acquire(&service("1"), job_id, token.clone())
            .unwrap();

        assert!(registry.cancel(job_id));
        assert!(token.is_cancelled());
        assert!(!registry.cancel(JobId::new()));
    }

    #[test]
    fn test_release_ignores_foreign_job() {
        let registry = JobRegistry::new();
        let job_id = JobId::new();
        let _guard = registry
            .acquire(&service("1"), job_id, JobCancellation::new())
            .unwrap();

        assert!(!registry.release(&service("1"), JobId::new()));
        assert_eq!(registry.active_job(&service("1")), Some(job_id));
    }
}
