//! The management listener: a single passive channel on the
//! agent URL that accepts one-shot admin commands from `dnxmgr`.

use std::sync::Arc;
use std::time::Duration;

use dnx_core::transport::RecvOutcome;
use dnx_core::{decode, encode, DnxMessage, MgmtReply, MgmtStatus, Transport, MAX_MESSAGE_SIZE};
use log::{debug, info, warn};

use crate::context::ClientContext;
use crate::wlm::WorkLoadManager;

const RECV_TIMEOUT: Duration = Duration::from_secs(10);

pub const ACTION_SHUTDOWN: &str = "SHUTDOWN";
pub const ACTION_STATUS: &str = "STATUS";
pub const ACTION_RELOAD: &str = "RELOAD";

/// Runs until a `SHUTDOWN` request is received. Other recognized verbs
/// are replied to but do not end the loop; unknown verbs are ignored.
pub fn run(ctx: Arc<ClientContext>, wlm: Arc<WorkLoadManager>) {
    let channel = match ctx.backend.open_passive(&ctx.config.agent_url) {
        Ok(c) => c,
        Err(e) => {
            warn!("management listener: failed to bind {}: {e}", ctx.config.agent_url);
            return;
        }
    };

    let mut buf = [0u8; MAX_MESSAGE_SIZE];
    loop {
        let outcome = match channel.recv(&mut buf, RECV_TIMEOUT) {
            Ok(o) => o,
            Err(e) => {
                warn!("management listener: recv failed: {e}");
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
                warn!("management listener: received non-UTF8 datagram from {peer}");
                continue;
            }
        };

        let req = match decode(text) {
            Ok(DnxMessage::MgmtRequest(r)) => r,
            Ok(other) => {
                debug!("management listener: ignoring unexpected message type {other:?}");
                continue;
            }
            Err(e) => {
                warn!("management listener: malformed message from {peer}: {e}");
                continue;
            }
        };

        match req.action.as_str() {
            ACTION_SHUTDOWN => {
                info!("management listener: SHUTDOWN requested by {peer}");
                let reply = MgmtReply {
                    xid: req.xid,
                    status: MgmtStatus::Ack,
                    reply: "shutting down".to_string(),
                };
                send_reply(channel.as_ref(), peer, &reply);
                wlm.request_shutdown();
                break;
            }
            ACTION_STATUS => {
                let reply = MgmtReply {
                    xid: req.xid,
                    status: MgmtStatus::Ack,
                    reply: wlm.stats_summary(),
                };
                send_reply(channel.as_ref(), peer, &reply);
            }
            ACTION_RELOAD => {
                // Config hot-reload is out of scope; acknowledge so the
                // wire contract stays exercised without inventing scope.
                info!("management listener: RELOAD requested by {peer} (no-op)");
                let reply = MgmtReply {
                    xid: req.xid,
                    status: MgmtStatus::Ack,
                    reply: "reload not implemented".to_string(),
                };
                send_reply(channel.as_ref(), peer, &reply);
            }
            other => {
                debug!("management listener: ignoring reserved/unknown action {other}");
            }
        }
    }
}

fn send_reply(channel: &dyn Transport, peer: std::net::SocketAddr, reply: &MgmtReply) {
    match encode(&DnxMessage::MgmtReply(reply.clone())) {
        Ok(encoded) => {
            if let Err(e) = channel.send(encoded.as_bytes(), peer) {
                warn!("management listener: failed to reply to {peer}: {e}");
            }
        }
        Err(e) => warn!("management listener: failed to encode reply: {e}"),
    }
}
