use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

/// Cancellation of one job, shared by its emitter and everyone allowed to
/// stop it.
///
/// Cancelling and emitting take the same gate, so once [`cancel`] returns
/// no further event of the job can be delivered.
///
/// [`cancel`]: JobCancellation::cancel
#[derive(Clone, Default)]
pub struct JobCancellation {
    token: CancellationToken,
    gate: Arc<Mutex<()>>,
}

impl JobCancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let _gate = self.gate();
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token to await cancellation on.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn gate(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
