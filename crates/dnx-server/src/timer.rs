//! The expiration timer: the only thread that reclaims stale jobs. Wakes
//! on a fixed interval, sweeps the job list, and synthesizes a timeout
//! result for anything it collects.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::audit;
use crate::collector::ResultSink;
use crate::context::ServerContext;

/// Matches `dnxTimer.c`'s fixed timeout message text exactly; the exit
/// code is configurable, not the wording.
const TIMEOUT_MESSAGE: &str = "(DNX Service Check Timed Out)";

/// Exit code synthesized for expired checks: `3` (UNKNOWN) is the safer
/// default, since a silent worker could still be working the job; a
/// deployment that prefers `2` (CRITICAL) sets this via configuration if
/// that option is wired up by the host integration.
pub const DEFAULT_EXPIRED_RESULT_CODE: i32 = 3;

pub fn run(ctx: Arc<ServerContext>, running: Arc<AtomicBool>, sink: Arc<dyn ResultSink>) {
    let interval = ctx.config.expire_poll_interval();
    let max_batch = ctx.config.expire_max_batch;

    while running.load(Ordering::Relaxed) {
        thread::sleep(interval);
        if !running.load(Ordering::Relaxed) {
            break;
        }

        let now = Instant::now();
        let expired = ctx.job_list.expire(now, max_batch);
        for job in expired {
            audit::expired(job.xid);
            sink.publish(job.xid, DEFAULT_EXPIRED_RESULT_CODE, TIMEOUT_MESSAGE);
        }
    }
}
