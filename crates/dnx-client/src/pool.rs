//! Worker-pool slot bookkeeping. Slots are exclusively owned by the
//! [`crate::wlm::WorkLoadManager`]; worker threads only ever touch their
//! own slot's [`WorkerStats`] (shared so the management listener's
//! STATUS verb can read it without locking the slot table).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Reusable; no thread is running here.
    Dead,
    Running,
    /// The worker thread has returned but has not been joined yet.
    Zombie,
}

/// Per-thread counters maintained for reporting only: not part of the
/// correctness contract, but exposed read-only to the management
/// listener.
#[derive(Default)]
pub struct WorkerStats {
    pub ok_count: AtomicU64,
    pub fail_count: AtomicU64,
    pub total_job_millis: AtomicU64,
}

impl WorkerStats {
    pub fn record_ok(&self, elapsed_millis: u64) {
        self.ok_count.fetch_add(1, Ordering::Relaxed);
        self.total_job_millis.fetch_add(elapsed_millis, Ordering::Relaxed);
    }

    pub fn record_fail(&self) {
        self.fail_count.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct Slot {
    pub state: SlotState,
    pub handle: Option<JoinHandle<()>>,
    pub stats: Arc<WorkerStats>,
}

impl Slot {
    pub fn dead() -> Self {
        Slot {
            state: SlotState::Dead,
            handle: None,
            stats: Arc::new(WorkerStats::default()),
        }
    }
}
