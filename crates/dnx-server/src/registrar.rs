//! The registrar thread: the only thread that writes to the request
//! registry. Listens for worker-ready advertisements on the dispatch
//! channel and turns REGISTER/DEREGISTER messages into registry updates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dnx_core::transport::RecvOutcome;
use dnx_core::{decode, DnxMessage, NodeReqType, MAX_MESSAGE_SIZE};
use log::{debug, warn};

use crate::audit;
use crate::context::ServerContext;
use crate::registry::RequestToken;

const RECV_TIMEOUT: Duration = Duration::from_secs(30);

pub fn run(ctx: Arc<ServerContext>, running: Arc<AtomicBool>) {
    let mut buf = [0u8; MAX_MESSAGE_SIZE];
    while running.load(Ordering::Relaxed) {
        let outcome = match ctx.dispatch_channel.recv(&mut buf, RECV_TIMEOUT) {
            Ok(o) => o,
            Err(e) => {
                warn!("registrar: recv failed: {e}");
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
                warn!("registrar: received non-UTF8 datagram from {peer}");
                continue;
            }
        };

        let msg = match decode(text) {
            Ok(m) => m,
            Err(e) => {
                warn!("registrar: malformed message from {peer}: {e}");
                continue;
            }
        };

        let req = match msg {
            DnxMessage::NodeRequest(r) => r,
            other => {
                debug!("registrar: ignoring unexpected message type {:?}", other);
                continue;
            }
        };

        match req.req_type {
            NodeReqType::Register => {
                let now = Instant::now();
                ctx.registry.enqueue(RequestToken {
                    worker_xid: req.xid,
                    address: peer,
                    job_capacity: req.job_cap,
                    expires_at: now + Duration::from_secs(req.ttl as u64),
                });
                audit::registered(req.xid, &req.hostname);
            }
            NodeReqType::Deregister => {
                ctx.registry.remove_matching(|t| t.worker_xid == req.xid);
                audit::deregistered(req.xid);
            }
        }
    }
}
