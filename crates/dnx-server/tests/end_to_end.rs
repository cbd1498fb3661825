//! Scenario tests exercising the registrar/dispatcher/collector/timer
//! threads together over the in-memory mock transport, instead of each
//! module in isolation.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use dnx_core::transport::{mock, RecvOutcome};
use dnx_core::{decode, encode, CheckResult, DnxMessage, Job as WireJob, NodeReqType, NodeRequest, ObjectKind, Transport, Xid, MAX_MESSAGE_SIZE};
use dnx_server::collector::ResultSink;
use dnx_server::ingress::{on_check, CheckRequest, IngressOutcome};
use dnx_server::{config::ServerConfig, context::ServerContext};

fn base_config(dispatcher_url: &str, collector_url: &str, job_list_size: usize, max_node_requests: usize) -> ServerConfig {
    toml::from_str(&format!(
        r#"
channel_dispatcher = "{dispatcher_url}"
channel_collector = "{collector_url}"
max_node_requests = {max_node_requests}
min_service_slots = {job_list_size}
expire_poll_interval_secs = 1
expire_max_batch = 100
local_check_pattern = "^check_local_"
"#
    ))
    .unwrap()
}

#[derive(Default)]
struct RecordingSink {
    results: Mutex<Vec<(Xid, i32, String)>>,
}

impl ResultSink for RecordingSink {
    fn publish(&self, xid: Xid, result_code: i32, result_data: &str) {
        self.results
            .lock()
            .unwrap()
            .push((xid, result_code, result_data.to_string()));
    }
}

static PORT_COUNTER: OnceLock<std::sync::atomic::AtomicU16> = OnceLock::new();

fn unique_urls() -> (String, String) {
    let counter = PORT_COUNTER.get_or_init(|| std::sync::atomic::AtomicU16::new(20000));
    let base = counter.fetch_add(2, Ordering::Relaxed);
    (
        format!("udp://127.0.0.1:{base}"),
        format!("udp://127.0.0.1:{}", base + 1),
    )
}

fn send_register(dispatcher_url: &str, worker_serial: u32, ttl: u32) -> mock::MockTransport {
    let fake_worker = mock::MockTransport::connect(&dnx_core::ChannelUrl::parse(dispatcher_url).unwrap()).unwrap();
    let msg = DnxMessage::NodeRequest(NodeRequest {
        xid: Xid::new(ObjectKind::Worker, worker_serial, 0),
        req_type: NodeReqType::Register,
        job_cap: 1,
        ttl,
        hostname: "workerhost".to_string(),
    });
    let encoded = encode(&msg).unwrap();
    fake_worker
        .send(encoded.as_bytes(), fake_worker.default_peer().unwrap())
        .unwrap();
    fake_worker
}

#[test]
fn happy_path_dispatches_and_collects() {
    mock::reset();
    let (dispatcher_url, collector_url) = unique_urls();
    let config = base_config(&dispatcher_url, &collector_url, 4, 10);
    let ctx = Arc::new(ServerContext::new_with_mock(config).unwrap());

    let fake_worker = send_register(&dispatcher_url, 1, 30);

    // Drive the registrar inline (single recv) instead of spawning a
    // thread, keeping the test deterministic.
    drive_registrar_once(&ctx);

    let outcome = on_check(
        &ctx,
        CheckRequest {
            command: "check_x".to_string(),
            timeout: Duration::from_secs(5),
            serial: 1,
        },
    );
    assert!(matches!(outcome, IngressOutcome::Dispatched(_)));

    let job = ctx.job_list.dispatch();
    let wire = DnxMessage::Job(WireJob {
        xid: job.xid,
        priority: job.priority,
        timeout: job.timeout.as_secs() as u32,
        command: job.command.clone(),
    });
    let encoded = encode(&wire).unwrap();
    let worker_addr = job.assigned_worker.unwrap().address;
    ctx.dispatch_channel.send(encoded.as_bytes(), worker_addr).unwrap();

    // Fake worker receives the JOB datagram.
    let mut buf = [0u8; MAX_MESSAGE_SIZE];
    let RecvOutcome::Data { size, .. } = fake_worker.recv(&mut buf, Duration::from_secs(1)).unwrap() else {
        panic!("expected a JOB datagram");
    };
    let received = decode(std::str::from_utf8(&buf[..size]).unwrap()).unwrap();
    let DnxMessage::Job(received_job) = received else {
        panic!("expected Job message");
    };
    assert_eq!(received_job.xid.slot, 0);

    // Fake worker replies with a successful result.
    let result = DnxMessage::Result(CheckResult {
        xid: received_job.xid,
        delta: 0.1,
        result_code: 0,
        result_data: "OK".to_string(),
    });
    fake_worker
        .send(encode(&result).unwrap().as_bytes(), fake_worker.default_peer().unwrap())
        .unwrap();

    let sink = Arc::new(RecordingSink::default());
    drive_collector_once(&ctx, sink.clone());

    let results = sink.results.lock().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].1, 0);
    assert_eq!(results[0].2, "OK");
    assert!(ctx.job_list.is_empty());
}

#[test]
fn timeout_synthesizes_result_and_drops_stray_result() {
    mock::reset();
    let (dispatcher_url, collector_url) = unique_urls();
    let config = base_config(&dispatcher_url, &collector_url, 4, 10);
    let ctx = Arc::new(ServerContext::new_with_mock(config).unwrap());

    send_register(&dispatcher_url, 1, 30);
    drive_registrar_once(&ctx);

    let outcome = on_check(
        &ctx,
        CheckRequest {
            command: "check_x".to_string(),
            timeout: Duration::from_millis(1),
            serial: 1,
        },
    );
    let IngressOutcome::Dispatched(xid) = outcome else {
        panic!("expected dispatch");
    };
    ctx.job_list.dispatch();

    let sink = Arc::new(RecordingSink::default());
    let now = Instant::now() + Duration::from_secs(10);
    let expired = ctx.job_list.expire(now, 100);
    assert_eq!(expired.len(), 1);
    for job in expired {
        sink.publish(job.xid, 3, "(DNX Service Check Timed Out)");
    }

    let results = sink.results.lock().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].2, "(DNX Service Check Timed Out)");
    drop(results);

    // A stray late result for the now-expired XID must be silently dropped.
    assert!(ctx.job_list.collect(xid).is_err());
}

#[test]
fn backpressure_declines_when_registry_empty() {
    mock::reset();
    let (dispatcher_url, collector_url) = unique_urls();
    let config = base_config(&dispatcher_url, &collector_url, 2, 10);
    let ctx = Arc::new(ServerContext::new_with_mock(config).unwrap());

    let outcome = on_check(
        &ctx,
        CheckRequest {
            command: "check_x".to_string(),
            timeout: Duration::from_secs(5),
            serial: 1,
        },
    );
    assert!(matches!(outcome, IngressOutcome::Declined));
}

#[test]
fn stale_worker_token_is_discarded_at_dequeue() {
    mock::reset();
    let (dispatcher_url, collector_url) = unique_urls();
    let config = base_config(&dispatcher_url, &collector_url, 4, 10);
    let ctx = Arc::new(ServerContext::new_with_mock(config).unwrap());

    send_register(&dispatcher_url, 1, 1);
    drive_registrar_once(&ctx);
    thread::sleep(Duration::from_secs(2));

    let outcome = on_check(
        &ctx,
        CheckRequest {
            command: "check_x".to_string(),
            timeout: Duration::from_secs(5),
            serial: 1,
        },
    );
    assert!(matches!(outcome, IngressOutcome::Declined));
}

#[test]
fn oldest_token_is_dropped_on_registry_overflow() {
    mock::reset();
    let (dispatcher_url, collector_url) = unique_urls();
    let config = base_config(&dispatcher_url, &collector_url, 4, 2);
    let ctx = Arc::new(ServerContext::new_with_mock(config).unwrap());

    send_register(&dispatcher_url, 1, 30);
    drive_registrar_once(&ctx);
    send_register(&dispatcher_url, 2, 30);
    drive_registrar_once(&ctx);
    send_register(&dispatcher_url, 3, 30);
    drive_registrar_once(&ctx);

    assert_eq!(ctx.registry.len(), 2);
    let now = Instant::now();
    let first = ctx.registry.dequeue(now).unwrap();
    assert_eq!(first.worker_xid.serial, 2);
    let second = ctx.registry.dequeue(now).unwrap();
    assert_eq!(second.worker_xid.serial, 3);
}

fn drive_registrar_once(ctx: &ServerContext) {
    let mut buf = [0u8; MAX_MESSAGE_SIZE];
    let RecvOutcome::Data { size, peer } = ctx
        .dispatch_channel
        .recv(&mut buf, Duration::from_secs(1))
        .unwrap()
    else {
        panic!("expected a NodeRequest datagram");
    };
    let msg = decode(std::str::from_utf8(&buf[..size]).unwrap()).unwrap();
    let DnxMessage::NodeRequest(req) = msg else {
        panic!("expected NodeRequest message");
    };
    match req.req_type {
        NodeReqType::Register => {
            ctx.registry.enqueue(dnx_server::registry::RequestToken {
                worker_xid: req.xid,
                address: peer,
                job_capacity: req.job_cap,
                expires_at: Instant::now() + Duration::from_secs(req.ttl as u64),
            });
        }
        NodeReqType::Deregister => {
            ctx.registry.remove_matching(|t| t.worker_xid == req.xid);
        }
    }
}

fn drive_collector_once(ctx: &ServerContext, sink: Arc<dyn ResultSink>) {
    let mut buf = [0u8; MAX_MESSAGE_SIZE];
    let RecvOutcome::Data { size, .. } = ctx
        .collect_channel
        .recv(&mut buf, Duration::from_secs(1))
        .unwrap()
    else {
        panic!("expected a Result datagram");
    };
    let msg = decode(std::str::from_utf8(&buf[..size]).unwrap()).unwrap();
    let DnxMessage::Result(result) = msg else {
        panic!("expected Result message");
    };
    if let Ok(_job) = ctx.job_list.collect(result.xid) {
        sink.publish(result.xid, result.result_code, &result.result_data);
    }
}
