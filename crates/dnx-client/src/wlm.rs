//! The work-load manager: owns the worker-thread pool, grows and shrinks
//! it under a saturation policy, and drives the one "WLM thread" the
//! client runs alongside its worker pool and management listener.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};
use parking_lot::{Condvar, Mutex};

use crate::context::ClientContext;
use crate::pool::{Slot, SlotState, WorkerStats};
use crate::worker;

pub struct WorkLoadManager {
    ctx: Arc<ClientContext>,
    slots: Mutex<Vec<Slot>>,
    cond: Condvar,
    active_jobs: AtomicUsize,
    terminating: AtomicBool,
    termination_deadline: Mutex<Option<Instant>>,
}

impl WorkLoadManager {
    pub fn new(ctx: Arc<ClientContext>) -> Arc<Self> {
        Arc::new(WorkLoadManager {
            ctx,
            slots: Mutex::new(Vec::new()),
            cond: Condvar::new(),
            active_jobs: AtomicUsize::new(0),
            terminating: AtomicBool::new(false),
            termination_deadline: Mutex::new(None),
        })
    }

    pub fn is_terminating(&self) -> bool {
        self.terminating.load(Ordering::Relaxed)
    }

    pub fn active_threads(&self) -> usize {
        self.slots
            .lock()
            .iter()
            .filter(|s| s.state == SlotState::Running)
            .count()
    }

    pub fn active_jobs(&self) -> usize {
        self.active_jobs.load(Ordering::Relaxed)
    }

    pub fn pool_min(&self) -> usize {
        self.ctx.config.pool_min
    }

    pub(crate) fn note_job_start(&self) {
        self.active_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_job_done(&self) {
        self.active_jobs.fetch_sub(1, Ordering::Relaxed);
    }

    /// A compact line for the management listener's STATUS reply.
    pub fn stats_summary(&self) -> String {
        let slots = self.slots.lock();
        let threads = slots.iter().filter(|s| s.state == SlotState::Running).count();
        let (ok, fail, total_job_millis) = slots.iter().fold((0u64, 0u64, 0u64), |(ok, fail, millis), s| {
            (
                ok + s.stats.ok_count.load(Ordering::Relaxed),
                fail + s.stats.fail_count.load(Ordering::Relaxed),
                millis + s.stats.total_job_millis.load(Ordering::Relaxed),
            )
        });
        format!("threads={threads} ok={ok} fail={fail} total_job_time_ms={total_job_millis}")
    }

    /// Sets the termination flag and its grace deadline, and wakes the
    /// WLM thread immediately instead of making it wait out a full poll
    /// interval.
    pub fn request_shutdown(&self) {
        *self.termination_deadline.lock() =
            Some(Instant::now() + Duration::from_secs(self.ctx.config.shutdown_grace_secs));
        self.terminating.store(true, Ordering::SeqCst);
        self.cond.notify_all();
    }

    /// Polls until every worker thread has been joined. Intended for a
    /// caller on another thread than the one running [`Self::run`], e.g.
    /// the management listener after it asked for shutdown.
    pub fn wait_until_idle(&self) {
        while self.active_threads() > 0 {
            thread::sleep(Duration::from_millis(50));
        }
    }

    /// The manager's main loop: wait for a poll tick or wakeup, reap dead
    /// slots, grow the pool if saturated, repeat until termination passes
    /// its grace deadline. Runs on its own dedicated thread for the
    /// lifetime of the client.
    pub fn run(self: &Arc<Self>) {
        self.grow(self.ctx.config.pool_initial);

        loop {
            let deadline = Instant::now() + Duration::from_secs(self.ctx.config.poll_interval_secs);
            {
                let mut guard = self.slots.lock();
                self.cond.wait_until(&mut guard, deadline);
            }

            if self.is_terminating() {
                let past_deadline = self
                    .termination_deadline
                    .lock()
                    .map(|d| Instant::now() >= d)
                    .unwrap_or(true);
                if past_deadline {
                    break;
                }
            }

            self.reap();

            let active = self.active_threads();
            let jobs = self.active_jobs();
            if jobs == active || active < self.ctx.config.pool_initial {
                self.grow(self.ctx.config.pool_increment);
            }
        }

        self.shutdown_all();
        info!("work-load manager stopped, all worker threads joined");
    }

    /// Joins and frees any `Zombie` slot (a worker thread that returned on
    /// its own, e.g. after `maxConsecutiveTimeouts`), making it `Dead` and
    /// reusable.
    fn reap(&self) {
        let mut slots = self.slots.lock();
        for slot in slots.iter_mut() {
            if slot.state == SlotState::Running
                && slot.handle.as_ref().map(|h| h.is_finished()).unwrap_or(false)
            {
                slot.state = SlotState::Zombie;
            }
            if slot.state == SlotState::Zombie {
                if let Some(handle) = slot.handle.take() {
                    if let Err(payload) = handle.join() {
                        warn!("worker thread panicked: {payload:?}");
                    }
                }
                slot.state = SlotState::Dead;
            }
        }
    }

    /// Spawns up to `k` new worker threads, reusing `Dead` slots before
    /// appending new ones, capped at `pool_max` total slots.
    fn grow(self: &Arc<Self>, k: usize) {
        let cap = self.ctx.config.pool_max;
        let mut slots = self.slots.lock();
        let mut spawned = 0;

        let dead: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.state == SlotState::Dead)
            .map(|(i, _)| i)
            .collect();
        for idx in dead {
            if spawned >= k {
                break;
            }
            self.spawn_into(&mut slots, idx);
            spawned += 1;
        }
        while spawned < k && slots.len() < cap {
            slots.push(Slot::dead());
            let idx = slots.len() - 1;
            self.spawn_into(&mut slots, idx);
            spawned += 1;
        }
    }

    fn spawn_into(self: &Arc<Self>, slots: &mut [Slot], idx: usize) {
        let stats = Arc::new(WorkerStats::default());
        let wlm = Arc::clone(self);
        let ctx = Arc::clone(&self.ctx);
        let stats_for_thread = Arc::clone(&stats);
        let handle = thread::Builder::new()
            .name(format!("dnx-worker-{idx}"))
            .spawn(move || worker::run(wlm, ctx, idx, stats_for_thread))
            .expect("failed to spawn worker thread");
        slots[idx] = Slot {
            state: SlotState::Running,
            handle: Some(handle),
            stats,
        };
    }

    /// Cleanup path on exit: every slot is already observing the global
    /// `terminating` flag, so this just joins whatever hasn't finished
    /// and frees the slot table.
    fn shutdown_all(&self) {
        let mut slots = self.slots.lock();
        for slot in slots.iter_mut() {
            if let Some(handle) = slot.handle.take() {
                if let Err(payload) = handle.join() {
                    warn!("worker thread panicked during shutdown: {payload:?}");
                }
            }
            slot.state = SlotState::Dead;
        }
        slots.clear();
    }
}
