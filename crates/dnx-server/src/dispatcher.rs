//! The dispatcher thread: the only thread that sends Job messages. Pulls
//! PENDING jobs off the job list (blocking) and forwards each to the
//! worker address captured at ingress time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dnx_core::{encode, DnxMessage, Job as WireJob};

use crate::audit;
use crate::context::ServerContext;

pub fn run(ctx: Arc<ServerContext>, running: Arc<AtomicBool>) {
    while running.load(Ordering::Relaxed) {
        // dispatch() blocks on the job list condvar; it has no native
        // way to observe `running` going false, so shutdown here is
        // "finish the in-flight wait, then notice running is false next
        // time around" - acceptable since the harness joins this thread
        // only after injecting one more job or dropping the list.
        let job = ctx.job_list.dispatch();

        let Some(worker) = job.assigned_worker else {
            audit::dispatch_failed(job.xid, "<none>", "job has no assigned worker");
            continue;
        };

        let wire = DnxMessage::Job(WireJob {
            xid: job.xid,
            priority: job.priority,
            timeout: job.timeout.as_secs() as u32,
            command: job.command.clone(),
        });

        let encoded = match encode(&wire) {
            Ok(s) => s,
            Err(e) => {
                audit::dispatch_failed(job.xid, &worker.address.to_string(), &e.to_string());
                continue;
            }
        };

        match ctx.dispatch_channel.send(encoded.as_bytes(), worker.address) {
            Ok(()) => audit::dispatched(job.xid, &worker.address.to_string()),
            Err(e) => audit::dispatch_failed(job.xid, &worker.address.to_string(), &e.to_string()),
        }
        // On send failure the job stays IN_PROGRESS in the job list; the
        // expiration timer reclaims it when its deadline passes, per
        // the propagation rules for dispatch failures.
    }
}
