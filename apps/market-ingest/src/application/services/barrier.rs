//! Join Barrier
//!
//! Counts running workers. Each started worker holds one [`JoinSlot`]; the
//! slot is released when dropped, so every exit path releases it exactly
//! once. [`JoinBarrier::wait`] resolves when the count reaches zero.

use tokio_util::task::{TaskTracker, task_tracker::TaskTrackerToken};

/// Shared worker counter.
#[derive(Debug, Clone, Default)]
pub struct JoinBarrier {
    tracker: TaskTracker,
}

/// One worker's registration. Dropping it releases the slot.
#[derive(Debug)]
#[must_use = "dropping the slot releases it immediately"]
pub struct JoinSlot {
    _token: TaskTrackerToken,
}

impl JoinBarrier {
    /// Create an empty barrier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker.
    pub fn register(&self) -> JoinSlot {
        JoinSlot {
            _token: self.tracker.token(),
        }
    }

    /// Number of workers still holding a slot.
    #[must_use]
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every registered worker has released its slot.
    ///
    /// Workers may still register while this is pending.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
