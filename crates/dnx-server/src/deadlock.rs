//! Background deadlock detection for the four server threads, all of
//! which coordinate exclusively through `parking_lot` mutexes (job list,
//! request registry). Debug builds only - release builds pay no
//! overhead for this.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

static INSTALLED: AtomicBool = AtomicBool::new(false);

#[cfg(debug_assertions)]
pub fn install() {
    if INSTALLED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        thread::Builder::new()
            .name("deadlock-detector".to_string())
            .spawn(scan_loop)
            .expect("failed to spawn deadlock detector thread");
    }
}

#[cfg(not(debug_assertions))]
pub fn install() {}

#[cfg(debug_assertions)]
fn scan_loop() {
    loop {
        thread::sleep(Duration::from_secs(5));
        let deadlocks = parking_lot::deadlock::check_deadlock();
        if deadlocks.is_empty() {
            continue;
        }
        log::error!("detected {} deadlock cycle(s)", deadlocks.len());
        for (i, threads) in deadlocks.iter().enumerate() {
            log::error!("deadlock cycle {i}: {} thread(s) blocked", threads.len());
            for thread in threads {
                log::error!("{:?}", thread.backtrace());
            }
        }
    }
}
