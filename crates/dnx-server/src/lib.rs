//! Server-side job list, request registry, and the four long-running
//! threads (registrar, dispatcher, collector, expiration timer) that
//! coordinate exclusively through them. Loaded as a library by a host
//! process that owns the actual check-scheduling decision; this crate
//! only implements the dispatch/collect/expire machinery and the ingress
//! hook the host calls into.

pub mod audit;
pub mod collector;
pub mod config;
pub mod context;
pub mod deadlock;
pub mod dispatcher;
pub mod ingress;
pub mod job;
pub mod joblist;
pub mod registrar;
pub mod registry;
pub mod timer;

pub use collector::ResultSink;
pub use config::ServerConfig;
pub use context::ServerContext;
pub use ingress::{on_check, CheckRequest, IngressOutcome};
pub use job::{AssignedWorker, Job, JobState};
pub use joblist::JobList;
pub use registry::{RequestRegistry, RequestToken};

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Spawns the four server threads and returns their join handles plus the
/// shared `running` flag used to signal shutdown.
pub fn spawn_threads(
    ctx: Arc<ServerContext>,
    sink: Arc<dyn ResultSink>,
) -> (Vec<JoinHandle<()>>, Arc<AtomicBool>) {
    let running = Arc::new(AtomicBool::new(true));

    let mut handles = Vec::with_capacity(4);

    {
        let ctx = ctx.clone();
        let running = running.clone();
        handles.push(
            thread::Builder::new()
                .name("dnx-registrar".to_string())
                .spawn(move || registrar::run(ctx, running))
                .expect("failed to spawn registrar thread"),
        );
    }
    {
        let ctx = ctx.clone();
        let running = running.clone();
        handles.push(
            thread::Builder::new()
                .name("dnx-dispatcher".to_string())
                .spawn(move || dispatcher::run(ctx, running))
                .expect("failed to spawn dispatcher thread"),
        );
    }
    {
        let ctx = ctx.clone();
        let running = running.clone();
        let sink = sink.clone();
        handles.push(
            thread::Builder::new()
                .name("dnx-collector".to_string())
                .spawn(move || collector::run(ctx, running, sink))
                .expect("failed to spawn collector thread"),
        );
    }
    {
        let ctx = ctx.clone();
        let running = running.clone();
        handles.push(
            thread::Builder::new()
                .name("dnx-timer".to_string())
                .spawn(move || timer::run(ctx, running, sink))
                .expect("failed to spawn timer thread"),
        );
    }

    deadlock::install();

    (handles, running)
}
