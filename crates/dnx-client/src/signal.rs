//! POSIX signal handling for the `dnxcld` daemon: SIGTERM/SIGINT trigger
//! a graceful WLM shutdown; SIGUSR1 dumps a one-line diagnostic instead
//! of exiting.

use std::sync::Arc;
use std::thread;

use log::{info, warn};
use signal_hook::consts::signal::{SIGINT, SIGTERM, SIGUSR1};
use signal_hook::iterator::Signals;

use crate::wlm::WorkLoadManager;

/// Spawns a background thread that waits on `SIGTERM`/`SIGINT`/`SIGUSR1`.
/// Returns without installing anything (logged) if signal registration
/// fails - the daemon still runs, just without graceful-shutdown-by-signal.
pub fn install(wlm: Arc<WorkLoadManager>) {
    let mut signals = match Signals::new([SIGTERM, SIGINT, SIGUSR1]) {
        Ok(s) => s,
        Err(e) => {
            warn!("signal handler: failed to register: {e}");
            return;
        }
    };

    thread::Builder::new()
        .name("dnx-signal".to_string())
        .spawn(move || {
            for sig in signals.forever() {
                match sig {
                    SIGTERM | SIGINT => {
                        info!("received signal {sig}, requesting graceful shutdown");
                        wlm.request_shutdown();
                        break;
                    }
                    SIGUSR1 => {
                        info!("SIGUSR1 diagnostic dump: {}", wlm.stats_summary());
                    }
                    other => {
                        warn!("signal handler: ignoring unexpected signal {other}");
                    }
                }
            }
        })
        .expect("failed to spawn signal handler thread");
}
