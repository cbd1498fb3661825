//! A dev-only stand-in for the monitoring host that would normally load
//! this crate as a module. There is no real host process available to
//! drive the ingress hook in this environment, so this harness starts
//! the four server threads against the in-memory mock transport, fires
//! a handful of synthetic checks, and prints what the collector
//! receives. Not part of the shipped CLI surface.

use std::sync::Arc;
use std::time::Duration;

use dnx_server::collector::ResultSink;
use dnx_server::context::ServerContext;
use dnx_server::ingress::{on_check, CheckRequest};
use dnx_server::{config::ServerConfig, spawn_threads};

struct StdoutSink;

impl ResultSink for StdoutSink {
    fn publish(&self, xid: dnx_core::Xid, result_code: i32, result_data: &str) {
        println!("result xid={xid} code={result_code} data={result_data}");
    }
}

fn main() {
    env_logger::init();

    let config: ServerConfig = toml::from_str(
        r#"
channel_dispatcher = "udp://127.0.0.1:0"
channel_collector = "udp://127.0.0.1:1"
max_node_requests = 10
min_service_slots = 16
expire_poll_interval_secs = 1
expire_max_batch = 100
local_check_pattern = "^check_local_"
"#,
    )
    .expect("harness config is well-formed");

    dnx_core::transport::mock::reset();
    let ctx = Arc::new(ServerContext::new_with_mock(config).expect("harness context"));
    let sink: Arc<dyn ResultSink> = Arc::new(StdoutSink);
    let (_handles, running) = spawn_threads(ctx.clone(), sink);

    let outcome = on_check(
        &ctx,
        CheckRequest {
            command: "check_local_load".to_string(),
            timeout: Duration::from_secs(5),
            serial: 1,
        },
    );
    println!("local check classified as: {}", matches!(outcome, dnx_server::IngressOutcome::RunLocally));

    running.store(false, std::sync::atomic::Ordering::Relaxed);
    std::thread::sleep(Duration::from_millis(100));
}
