use std::net::SocketAddr;
use std::time::{Duration, Instant};

use dnx_core::Xid;

/// The worker-token consumed at ingress time: who this job was handed to
/// and where the dispatcher should send it.
#[derive(Debug, Clone, Copy)]
pub struct AssignedWorker {
    pub xid: Xid,
    pub address: SocketAddr,
}

/// A job's position in its lifecycle. `Empty` is a vacated slot and is
/// never observed outside the job list itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Empty,
    Pending,
    InProgress,
    Complete,
    Expired,
}

/// One ring slot: a dispatched or dispatch-pending service check, plus the
/// bookkeeping the job list needs to expire and collect it.
///
/// `expires_at` is computed once, at `add()` time, from the caller-supplied
/// timeout plus the configured grace period, and never recomputed. This is
/// what keeps the ring's expiry order consistent with its insertion order
/// without `expire()` needing to scan out of ring order: jobs are appended
/// at increasing wall-clock `expires_at`, so the first unexpired slot the
/// timer finds really is the first unexpired slot in the whole ring.
#[derive(Debug, Clone)]
pub struct Job {
    pub xid: Xid,
    pub command: String,
    pub priority: u32,
    pub timeout: Duration,
    pub state: JobState,
    pub expires_at: Instant,
    pub assigned_worker: Option<AssignedWorker>,
}

impl Job {
    pub fn new(xid: Xid, command: String, priority: u32, timeout: Duration, grace: Duration) -> Self {
        Job {
            xid,
            command,
            priority,
            timeout,
            state: JobState::Pending,
            expires_at: Instant::now() + timeout + grace,
            assigned_worker: None,
        }
    }
}
