//! The collector thread: the only thread that reads the collect channel.
//! Matches incoming Result messages to IN_PROGRESS jobs by XID and
//! publishes matches upstream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dnx_core::transport::RecvOutcome;
use dnx_core::{decode, DnxError, DnxMessage, MAX_MESSAGE_SIZE};
use log::{debug, warn};

use crate::audit;
use crate::context::ServerContext;

const RECV_TIMEOUT: Duration = Duration::from_secs(30);

/// Invoked once per collected result; the harness/host wires this to
/// whatever consumes finished check results (Nagios's own result queue,
/// in a production deployment).
pub trait ResultSink: Send + Sync {
    fn publish(&self, xid: dnx_core::Xid, result_code: i32, result_data: &str);
}

pub fn run(ctx: Arc<ServerContext>, running: Arc<AtomicBool>, sink: Arc<dyn ResultSink>) {
    let mut buf = [0u8; MAX_MESSAGE_SIZE];
    while running.load(Ordering::Relaxed) {
        let outcome = match ctx.collect_channel.recv(&mut buf, RECV_TIMEOUT) {
            Ok(o) => o,
            Err(e) => {
                warn!("collector: recv failed: {e}");
                continue;
            }
        };

        let (size, peer) = match outcome {
            RecvOutcome::Timeout => continue,
            RecvOutcome::Data { size, peer } => (size, peer),
        };

        let text = match std::str::from_utf8(&buf[..size]) {
            Ok(t) => t,
            Err(_) => {
                warn!("collector: received non-UTF8 datagram from {peer}");
                continue;
            }
        };

        let result = match decode(text) {
            Ok(DnxMessage::Result(r)) => r,
            Ok(other) => {
                debug!("collector: ignoring unexpected message type {:?}", other);
                continue;
            }
            Err(e) => {
                warn!("collector: malformed message from {peer}: {e}");
                continue;
            }
        };

        match ctx.job_list.collect(result.xid) {
            Ok(_job) => {
                audit::collected(result.xid, result.result_code);
                sink.publish(result.xid, result.result_code, &result.result_data);
            }
            Err(DnxError::NotFound(_)) => {
                // Already expired and removed by the timer; silent drop.
            }
            Err(e) => warn!("collector: unexpected collect() error for {}: {e}", result.xid),
        }
    }
}
