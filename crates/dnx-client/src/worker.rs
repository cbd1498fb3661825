//! The worker thread: requests a job, executes the matching plugin,
//! reports the result, and keeps a consecutive-timeout counter that
//! eventually retires the thread back to the pool.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dnx_core::{decode, encode, CheckResult, DnxMessage, JobAck, NodeReqType, NodeRequest, ObjectKind, Transport, Xid, MAX_MESSAGE_SIZE};
use log::{debug, warn};

use crate::context::ClientContext;
use crate::pool::WorkerStats;
use crate::wlm::WorkLoadManager;

/// Each worker's active channels bind an ephemeral local address at
/// `open_active` time (see `UdpTransport::connect`/`MockTransport::connect`),
/// which already satisfies the "unique per-thread name so channel-map
/// entries do not collide" requirement without any extra bookkeeping here.
pub fn run(wlm: Arc<WorkLoadManager>, ctx: Arc<ClientContext>, slot: usize, stats: Arc<WorkerStats>) {
    let dispatch_channel = match ctx.backend.open_active(&ctx.config.dispatcher_url) {
        Ok(c) => c,
        Err(e) => {
            warn!("worker[{slot}]: failed to open dispatch channel: {e}");
            return;
        }
    };
    let collect_channel = match ctx.backend.open_active(&ctx.config.collector_url) {
        Ok(c) => c,
        Err(e) => {
            warn!("worker[{slot}]: failed to open collect channel: {e}");
            return;
        }
    };
    let dispatcher_peer = dispatch_channel
        .default_peer()
        .expect("active dispatch channel always has a default peer");
    let collector_peer = collect_channel
        .default_peer()
        .expect("active collect channel always has a default peer");

    let mut serial: u32 = 0;
    let mut consecutive_timeouts: u32 = 0;
    let request_timeout = Duration::from_secs(ctx.config.request_timeout_secs);
    let ttl = ctx.config.token_ttl_secs();

    while !wlm.is_terminating() {
        serial += 1;
        let worker_xid = Xid::new(ObjectKind::Worker, serial, slot as u32);

        let round = run_one_round(
            &ctx,
            &wlm,
            dispatch_channel.as_ref(),
            collect_channel.as_ref(),
            dispatcher_peer,
            collector_peer,
            worker_xid,
            ttl,
            request_timeout,
        );

        match round {
            RoundOutcome::Completed { ok, elapsed_millis } => {
                consecutive_timeouts = 0;
                if ok {
                    stats.record_ok(elapsed_millis);
                } else {
                    stats.record_fail();
                }
            }
            RoundOutcome::Timeout => {
                consecutive_timeouts += 1;
            }
            RoundOutcome::Failed => {
                consecutive_timeouts += 1;
                stats.record_fail();
            }
        }

        if consecutive_timeouts >= ctx.config.max_consecutive_timeouts {
            if wlm.active_threads() > wlm.pool_min() {
                debug!(
                    "worker[{slot}]: {consecutive_timeouts} consecutive timeouts, retiring (active > pool_min)"
                );
                return;
            }
            // At the floor: keep retrying rather than shrink below pool_min.
        }

        if matches!(round, RoundOutcome::Failed) {
            std::thread::sleep(request_timeout);
        }
        // Plain request timeouts loop immediately with no extra sleep.
    }
}

#[derive(Debug, Clone, Copy)]
enum RoundOutcome {
    Completed { ok: bool, elapsed_millis: u64 },
    Timeout,
    Failed,
}

#[allow(clippy::too_many_arguments)]
fn run_one_round(
    ctx: &ClientContext,
    wlm: &WorkLoadManager,
    dispatch_channel: &dyn Transport,
    collect_channel: &dyn Transport,
    dispatcher_peer: std::net::SocketAddr,
    collector_peer: std::net::SocketAddr,
    worker_xid: Xid,
    ttl: u64,
    request_timeout: Duration,
) -> RoundOutcome {
    let request = DnxMessage::NodeRequest(NodeRequest {
        xid: worker_xid,
        req_type: NodeReqType::Register,
        job_cap: 1,
        ttl: ttl as u32,
        hostname: ctx.hostname.clone(),
    });
    let encoded = match encode(&request) {
        Ok(s) => s,
        Err(e) => {
            warn!("worker: failed to encode NodeRequest: {e}");
            return RoundOutcome::Failed;
        }
    };
    if let Err(e) = dispatch_channel.send(encoded.as_bytes(), dispatcher_peer) {
        debug!("worker: request send failed: {e}");
        return RoundOutcome::Failed;
    }

    let mut buf = [0u8; MAX_MESSAGE_SIZE];
    let job = match dispatch_channel.recv(&mut buf, request_timeout) {
        Ok(dnx_core::transport::RecvOutcome::Timeout) => return RoundOutcome::Timeout,
        Ok(dnx_core::transport::RecvOutcome::Data { size, .. }) => {
            let text = match std::str::from_utf8(&buf[..size]) {
                Ok(t) => t,
                Err(_) => {
                    warn!("worker: received non-UTF8 Job datagram");
                    return RoundOutcome::Failed;
                }
            };
            match decode(text) {
                Ok(DnxMessage::Job(job)) => job,
                Ok(other) => {
                    debug!("worker: ignoring unexpected message type {other:?}");
                    return RoundOutcome::Failed;
                }
                Err(e) => {
                    warn!("worker: malformed Job datagram: {e}");
                    return RoundOutcome::Failed;
                }
            }
        }
        Err(e) => {
            debug!("worker: Job recv failed: {e}");
            return RoundOutcome::Failed;
        }
    };

    wlm.note_job_start();
    let start = Instant::now();
    let output = ctx
        .plugin
        .invoke(&job.command, Duration::from_secs(job.timeout as u64));
    let elapsed = start.elapsed();
    wlm.note_job_done();

    let result = DnxMessage::Result(CheckResult {
        xid: job.xid,
        delta: elapsed.as_secs_f64(),
        result_code: output.exit_code,
        result_data: output.output,
    });
    let encoded_result = match encode(&result) {
        Ok(s) => s,
        Err(e) => {
            warn!("worker: failed to encode Result: {e}");
            return RoundOutcome::Failed;
        }
    };
    if let Err(e) = collect_channel.send(encoded_result.as_bytes(), collector_peer) {
        warn!("worker: Result send failed: {e}");
        return RoundOutcome::Failed;
    }

    // The ack is observational only: the server never retransmits on a
    // missing one, so a failure to send it does not fail this round.
    let ack = DnxMessage::JobAck(JobAck { xid: job.xid });
    if let Ok(encoded_ack) = encode(&ack) {
        let _ = collect_channel.send(encoded_ack.as_bytes(), collector_peer);
    }

    RoundOutcome::Completed {
        ok: output.exit_code == crate::plugin::EXIT_OK,
        elapsed_millis: elapsed.as_millis() as u64,
    }
}
