//! Scenario tests driving the worker thread and work-load manager
//! against a hand-rolled fake server built on the in-memory mock
//! transport - there is no real `dnx-server` process to talk to here,
//! so these tests play both sides of the wire protocol.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use dnx_client::context::ClientContext;
use dnx_client::wlm::WorkLoadManager;
use dnx_client::ClientConfig;
use dnx_core::transport::{mock, RecvOutcome};
use dnx_core::{
    decode, encode, CheckResult, DnxMessage, Job as WireJob, NodeReqType, ObjectKind, Transport, Xid,
    MAX_MESSAGE_SIZE,
};

static PORT_COUNTER: OnceLock<AtomicU16> = OnceLock::new();

fn unique_urls() -> (String, String) {
    let counter = PORT_COUNTER.get_or_init(|| AtomicU16::new(21000));
    let base = counter.fetch_add(2, Ordering::Relaxed);
    (
        format!("udp://127.0.0.1:{base}"),
        format!("udp://127.0.0.1:{}", base + 1),
    )
}

fn config(dispatcher_url: &str, collector_url: &str, extra: &str) -> ClientConfig {
    toml::from_str(&format!(
        r#"
dispatcher_url = "{dispatcher_url}"
collector_url = "{collector_url}"
request_timeout_secs = 10
ttl_backoff_secs = 1
{extra}
"#
    ))
    .unwrap()
}

/// A fake server: replies to every NodeRequest on `dispatcher_url` with
/// a Job running `command`, and forwards every Result it sees on
/// `collector_url` into `results`.
fn spawn_fake_server(
    dispatcher_url: String,
    collector_url: String,
    command: &'static str,
    results: Arc<Mutex<Vec<CheckResult>>>,
) -> std::sync::mpsc::Sender<()> {
    let dispatcher = mock::MockTransport::bind(&dnx_core::ChannelUrl::parse(&dispatcher_url).unwrap()).unwrap();
    let collector = mock::MockTransport::bind(&dnx_core::ChannelUrl::parse(&collector_url).unwrap()).unwrap();
    let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

    thread::spawn(move || {
        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        loop {
            if stop_rx.try_recv().is_ok() {
                break;
            }
            match dispatcher.recv(&mut buf, Duration::from_millis(100)) {
                Ok(RecvOutcome::Data { size, peer }) => {
                    let text = std::str::from_utf8(&buf[..size]).unwrap();
                    if let Ok(DnxMessage::NodeRequest(req)) = decode(text) {
                        if req.req_type == NodeReqType::Register {
                            let job = DnxMessage::Job(WireJob {
                                xid: Xid::new(ObjectKind::Job, req.xid.serial, req.xid.slot),
                                priority: 1,
                                timeout: 5,
                                command: command.to_string(),
                            });
                            let encoded = encode(&job).unwrap();
                            let _ = dispatcher.send(encoded.as_bytes(), peer);
                        }
                    }
                }
                _ => {}
            }
            match collector.recv(&mut buf, Duration::from_millis(1)) {
                Ok(RecvOutcome::Data { size, .. }) => {
                    let text = std::str::from_utf8(&buf[..size]).unwrap();
                    if let Ok(DnxMessage::Result(r)) = decode(text) {
                        results.lock().unwrap().push(r);
                    }
                }
                _ => {}
            }
        }
    });

    stop_tx
}

#[test]
fn worker_completes_a_full_request_job_result_round_trip() {
    mock::reset();
    let (dispatcher_url, collector_url) = unique_urls();
    let results = Arc::new(Mutex::new(Vec::new()));
    let stop = spawn_fake_server(dispatcher_url.clone(), collector_url.clone(), "echo ok", results.clone());

    let cfg = config(&dispatcher_url, &collector_url, "pool_min = 1\npool_initial = 1\npool_max = 1\n");
    let ctx = Arc::new(ClientContext::new_with_mock(cfg));
    let wlm = WorkLoadManager::new(ctx);

    let wlm_for_thread = wlm.clone();
    let handle = thread::spawn(move || wlm_for_thread.run());

    let deadline = Instant::now() + Duration::from_secs(5);
    while results.lock().unwrap().is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }

    wlm.request_shutdown();
    let collected = results.lock().unwrap();
    assert!(!collected.is_empty());
    assert_eq!(collected[0].result_code, 0);
    assert_eq!(collected[0].result_data, "ok");
    drop(collected);

    let _ = handle.join();
    let _ = stop.send(());
}

#[test]
fn pool_grows_under_sustained_saturation_and_respects_pool_max() {
    mock::reset();
    let (dispatcher_url, collector_url) = unique_urls();
    let results = Arc::new(Mutex::new(Vec::new()));
    // Every job sleeps long enough to keep workers busy across several
    // WLM poll ticks, keeping the pool saturated the whole test.
    let stop = spawn_fake_server(dispatcher_url.clone(), collector_url.clone(), "sleep 2", results.clone());

    let cfg = config(
        &dispatcher_url,
        &collector_url,
        "pool_min = 1\npool_initial = 2\npool_max = 4\npool_increment = 2\npoll_interval_secs = 1\n",
    );
    let ctx = Arc::new(ClientContext::new_with_mock(cfg));
    let wlm = WorkLoadManager::new(ctx);

    let wlm_for_thread = wlm.clone();
    let handle = thread::spawn(move || wlm_for_thread.run());

    thread::sleep(Duration::from_secs(4));
    let active = wlm.active_threads();
    assert!(active > 2, "expected pool to have grown past pool_initial, got {active}");
    assert!(active <= 4, "pool must never exceed pool_max, got {active}");

    wlm.request_shutdown();
    let _ = handle.join();
    let _ = stop.send(());
}
