//! A dedicated logging target for job lifecycle events, standing in for
//! the separate audit log file `dnxNebMain.c` used to open. It is just
//! another `log` target, so operators point it at its own file with a
//! normal logger configuration (e.g. a second `env_logger`-compatible
//! filter on `dnx::audit`).

use dnx_core::Xid;

pub const TARGET: &str = "dnx::audit";

pub fn dispatched(xid: Xid, worker: &str) {
    log::info!(target: TARGET, "DISPATCH xid={xid} worker={worker}");
}

pub fn dispatch_failed(xid: Xid, worker: &str, reason: &str) {
    log::warn!(target: TARGET, "DISPATCH-FAIL xid={xid} worker={worker} reason={reason}");
}

pub fn collected(xid: Xid, result_code: i32) {
    log::info!(target: TARGET, "COLLECT xid={xid} result_code={result_code}");
}

pub fn expired(xid: Xid) {
    log::info!(target: TARGET, "EXPIRE xid={xid}");
}

pub fn registered(worker: Xid, hostname: &str) {
    log::info!(target: TARGET, "REGISTER worker={worker} hostname={hostname}");
}

pub fn deregistered(worker: Xid) {
    log::info!(target: TARGET, "DEREGISTER worker={worker}");
}
