//! The ingress hook: called by the monitoring host immediately before it
//! would run a service check itself. Classifies the command as local or
//! remote, reserves a worker token, and enqueues a job - or declines and
//! lets the host execute the check directly.

use std::time::{Duration, Instant};

use dnx_core::{ObjectKind, Xid};
use log::warn;

use crate::context::ServerContext;
use crate::job::{AssignedWorker, Job};

/// A fixed slack added on top of the check's own timeout before the
/// server reclaims it. The original hard-codes this as a literal `5`
/// pending a configuration option that never arrived; kept as a named
/// constant here rather than silently inventing a config field.
const EXPIRY_GRACE: Duration = Duration::from_secs(5);

pub enum IngressOutcome {
    RunLocally,
    Declined,
    Dispatched(Xid),
}

pub struct CheckRequest {
    pub command: String,
    pub timeout: Duration,
    pub serial: u32,
}

/// Returns `RunLocally` when the command matches `local_check_pattern`,
/// `Declined` when no worker token is available or the job list is at
/// capacity, `Dispatched` otherwise.
pub fn on_check(ctx: &ServerContext, req: CheckRequest) -> IngressOutcome {
    if ctx.local_check_pattern.is_match(&req.command) {
        return IngressOutcome::RunLocally;
    }

    let now = Instant::now();
    let token = match ctx.registry.dequeue(now) {
        Some(t) => t,
        None => return IngressOutcome::Declined,
    };

    let xid = Xid::new(ObjectKind::Job, req.serial, 0);
    let mut job = Job::new(xid, req.command, 1, req.timeout, EXPIRY_GRACE);
    job.assigned_worker = Some(AssignedWorker {
        xid: token.worker_xid,
        address: token.address,
    });

    match ctx.job_list.add(job) {
        Ok(assigned_xid) => IngressOutcome::Dispatched(assigned_xid),
        Err(e) => {
            warn!("job list at capacity, declining check: {e}");
            IngressOutcome::Declined
        }
    }
}
