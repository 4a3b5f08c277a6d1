//! RAII guard for the launch trigger of a storage service.
//!
//! The guard owns one slot of the [`JobRegistry`]. The slot is freed
//! exactly once, either explicitly through [`TriggerGuard::release`] or
//! when the guard goes out of scope.

use aipscan_core::{JobId, StorageServiceId};
use tracing::{debug, warn};

use super::registry::JobRegistry;

/// RAII guard for a claimed launch trigger.
///
/// # Example
///
/// ```ignore
/// let guard = registry.acquire(&storage_service_id, job_id, cancel)?;
/// // ... drive the job ...
/// guard.release(); // explicit release, reported to the caller
/// // If not called, Drop frees the slot silently
/// ```
pub struct TriggerGuard {
    storage_service_id: StorageServiceId,
    job_id: JobId,
    registry: JobRegistry,
    released: bool,
}

impl TriggerGuard {
    pub(super) fn new(
        storage_service_id: StorageServiceId,
        job_id: JobId,
        registry: JobRegistry,
    ) -> Self {
        Self {
            storage_service_id,
            job_id,
            registry,
            released: false,
        }
    }

    /// Free the slot. Returns `true` if this call actually released it.
    pub fn release(mut self) -> bool {
        self.released = true;
        let freed = self.registry.release(&self.storage_service_id, self.job_id);
        debug!(
            storage_service_id = %self.storage_service_id,
            job_id = %self.job_id,
            freed,
            "Launch trigger released"
        );
        freed
    }

    pub fn storage_service_id(&self) -> &StorageServiceId {
        &self.storage_service_id
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }
}

impl std::fmt::Debug for TriggerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerGuard")
            .field("storage_service_id", &self.storage_service_id)
            .field("job_id", &self.job_id)
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for TriggerGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if self.registry.release(&self.storage_service_id, self.job_id) {
            warn!(
                storage_service_id = %self.storage_service_id,
                job_id = %self.job_id,
                "Trigger guard dropped without release - freeing slot"
            );
        }
    }
}
