//! Client (worker agent) library: the work-load manager, worker threads,
//! plugin invoker and management listener that make up `dnxcld`. The
//! binary at `src/bin/dnxcld.rs` is a thin bootstrap over this crate.

pub mod config;
pub mod context;
pub mod mgmt_listener;
pub mod pidfile;
pub mod plugin;
pub mod pool;
pub mod signal;
pub mod wlm;
pub mod worker;

pub use config::ClientConfig;
pub use context::ClientContext;
pub use pidfile::PidFile;
pub use plugin::PluginInvoker;
pub use wlm::WorkLoadManager;

use std::sync::Arc;
use std::thread;

use dnx_core::DnxResult;

/// Starts the WLM thread and runs the management listener on the calling
/// thread until a `SHUTDOWN` request arrives, then waits for every
/// worker thread to join before returning. An optional PID file is held
/// for the duration of the call.
pub fn run(ctx: Arc<ClientContext>) -> DnxResult<()> {
    let _pidfile = if ctx.config.pid_file.is_empty() {
        None
    } else {
        Some(PidFile::create(&ctx.config.pid_file)?)
    };

    let wlm = WorkLoadManager::new(ctx.clone());
    signal::install(wlm.clone());

    let wlm_thread = {
        let wlm = wlm.clone();
        thread::Builder::new()
            .name("dnx-wlm".to_string())
            .spawn(move || wlm.run())
            .expect("failed to spawn WLM thread")
    };

    // The management listener owns this thread; it returns once it has
    // observed SHUTDOWN.
    mgmt_listener::run(ctx, wlm.clone());

    wlm.wait_until_idle();
    let _ = wlm_thread.join();
    Ok(())
}
