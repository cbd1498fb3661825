//! The ring-buffer job list: the single point of coordination between the
//! dispatcher, collector and expiration timer threads.
//!
//! Mirrors `dnxJobList.c`'s cursor arithmetic (`head`, `dhead`, `tail`)
//! one-for-one, translated from `pthread_mutex`/
//! `pthread_cond` to `parking_lot::{Mutex, Condvar}`: a blocking
//! condvar wait replaces `pthread_cond_wait`, and the mutex is never held
//! across a network call - every operation here copies data out before
//! releasing the lock.

use std::time::{Duration, Instant};

use dnx_core::{DnxError, DnxResult, Xid};
use parking_lot::{Condvar, Mutex};

use crate::job::{Job, JobState};

struct Inner {
    slots: Vec<Option<Job>>,
    head: usize,
    dispatch_head: usize,
    tail: usize,
}

pub struct JobList {
    size: usize,
    inner: Mutex<Inner>,
    cond: Condvar,
}

impl JobList {
    pub fn new(size: usize) -> DnxResult<Self> {
        if size < 1 {
            return Err(DnxError::Invalid("job list size must be >= 1".to_string()));
        }
        Ok(JobList {
            size,
            inner: Mutex::new(Inner {
                slots: (0..size).map(|_| None).collect(),
                head: 0,
                dispatch_head: 0,
                tail: 0,
            }),
            cond: Condvar::new(),
        })
    }

    /// Assigns `job.xid.slot`, inserts at `tail`, advances `tail`, and
    /// updates `dispatchHead` if this slot is now the oldest PENDING one.
    /// Fails with `Capacity` when the ring is full.
    pub fn add(&self, mut job: Job) -> DnxResult<Xid> {
        let mut inner = self.inner.lock();

        let mut tail = inner.tail;
        if inner.slots[tail].is_some() {
            tail = (tail + 1) % self.size;
            if tail == inner.head {
                return Err(DnxError::Capacity(format!(
                    "job list full (size={})",
                    self.size
                )));
            }
        }

        job.xid.slot = tail as u32;
        let xid = job.xid;

        let prior_tail_was_pending = inner.slots[inner.tail]
            .as_ref()
            .map(|j| j.state == JobState::Pending)
            .unwrap_or(false);

        inner.slots[tail] = Some(job);
        if !prior_tail_was_pending {
            inner.dispatch_head = tail;
        }
        inner.tail = tail;

        self.cond.notify_one();
        Ok(xid)
    }

    /// Blocks until the slot at `dispatchHead` holds a PENDING job,
    /// transitions it to IN_PROGRESS, and returns a copy.
    pub fn dispatch(&self) -> Job {
        let mut inner = self.inner.lock();
        loop {
            let current = inner.dispatch_head;
            if let Some(job) = &inner.slots[current] {
                if job.state == JobState::Pending {
                    break;
                }
            }
            self.cond.wait(&mut inner);
        }

        let current = inner.dispatch_head;
        let job = inner.slots[current].as_mut().expect("checked Pending above");
        job.state = JobState::InProgress;
        let out = job.clone();

        if inner.dispatch_head != inner.tail {
            inner.dispatch_head = (current + 1) % self.size;
        }
        out
    }

    /// Matches a result to its IN_PROGRESS/PENDING slot by XID and removes
    /// it. `NotFound` covers both a bad slot index and a slot that has
    /// already been vacated (collected or expired).
    pub fn collect(&self, xid: Xid) -> DnxResult<Job> {
        let current = xid.slot as usize;
        if current >= self.size {
            return Err(DnxError::NotFound(format!("slot {current} out of range")));
        }

        let mut inner = self.inner.lock();
        let matches = inner.slots[current]
            .as_ref()
            .map(|j| j.xid == xid)
            .unwrap_or(false);
        if !matches {
            return Err(DnxError::NotFound(format!("no live job at xid {xid}")));
        }

        let mut job = inner.slots[current].take().expect("checked above");
        job.state = JobState::Complete;

        if current == inner.head && current != inner.tail {
            inner.head = (current + 1) % self.size;
        }

        Ok(job)
    }

    /// Walks from `head` toward `tail`, moving every expired PENDING or
    /// IN_PROGRESS slot into the returned batch (capped at `max_batch`) and
    /// vacating it. Stops at the first unexpired slot or at `tail`,
    /// whichever comes first - this is why `add()` must keep `expiresAt`
    /// monotonically non-decreasing along the ring (see job.rs).
    pub fn expire(&self, now: Instant, max_batch: usize) -> Vec<Job> {
        let mut inner = self.inner.lock();
        let mut expired = Vec::new();
        let mut current = inner.head;

        loop {
            if expired.len() >= max_batch {
                break;
            }
            let should_take = matches!(
                inner.slots[current].as_ref().map(|j| (j.state, j.expires_at)),
                Some((JobState::Pending, exp)) | Some((JobState::InProgress, exp)) if exp <= now
            );
            if should_take {
                let mut job = inner.slots[current].take().expect("checked above");
                job.state = JobState::Expired;
                expired.push(job);
            } else if inner.slots[current].is_some() {
                break;
            }

            if current == inner.tail {
                break;
            }
            current = (current + 1) % self.size;
        }

        inner.head = current;
        let head_in_progress = inner.slots[current]
            .as_ref()
            .map(|j| j.state == JobState::InProgress)
            .unwrap_or(false);
        if !head_in_progress {
            inner.dispatch_head = current;
        }

        expired
    }

    /// Number of slots currently occupied (PENDING or IN_PROGRESS). Used
    /// by tests and diagnostics only.
    pub fn len(&self) -> usize {
        self.inner.lock().slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dnx_core::ObjectKind;

    fn job(serial: u32, timeout: Duration) -> Job {
        Job::new(
            Xid::new(ObjectKind::Job, serial, 0),
            format!("check_{serial}"),
            1,
            timeout,
            Duration::from_secs(0),
        )
    }

    #[test]
    fn add_then_dispatch_then_collect_round_trips() {
        let list = JobList::new(4).unwrap();
        let xid = list.add(job(1, Duration::from_secs(30))).unwrap();
        let dispatched = list.dispatch();
        assert_eq!(dispatched.xid, xid);
        assert_eq!(dispatched.state, JobState::InProgress);

        let collected = list.collect(xid).unwrap();
        assert_eq!(collected.xid, xid);
        assert!(list.is_empty());
    }

    #[test]
    fn collect_after_collect_is_not_found() {
        let list = JobList::new(4).unwrap();
        let xid = list.add(job(1, Duration::from_secs(30))).unwrap();
        list.dispatch();
        list.collect(xid).unwrap();
        assert!(matches!(list.collect(xid), Err(DnxError::NotFound(_))));
    }

    #[test]
    fn add_fails_with_capacity_when_ring_full() {
        let list = JobList::new(2).unwrap();
        list.add(job(1, Duration::from_secs(30))).unwrap();
        list.add(job(2, Duration::from_secs(30))).unwrap();
        assert!(matches!(
            list.add(job(3, Duration::from_secs(30))),
            Err(DnxError::Capacity(_))
        ));
    }

    #[test]
    fn expire_stops_at_first_unexpired_slot() {
        let list = JobList::new(4).unwrap();
        // First job expires immediately; second has a long timeout and
        // should block the scan even though, hypothetically, a third slot
        // behind it might also be expired.
        list.add(job(1, Duration::from_secs(0))).unwrap();
        list.add(job(2, Duration::from_secs(60))).unwrap();

        let now = Instant::now() + Duration::from_millis(5);
        let expired = list.expire(now, 100);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].xid.serial, 1);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn expire_respects_max_batch() {
        let list = JobList::new(8).unwrap();
        for i in 0..5 {
            list.add(job(i, Duration::from_secs(0))).unwrap();
        }
        let now = Instant::now() + Duration::from_millis(5);
        let expired = list.expire(now, 3);
        assert_eq!(expired.len(), 3);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn dispatch_order_is_fifo_on_pending() {
        let list = JobList::new(4).unwrap();
        let a = list.add(job(1, Duration::from_secs(30))).unwrap();
        let b = list.add(job(2, Duration::from_secs(30))).unwrap();
        assert_eq!(list.dispatch().xid, a);
        assert_eq!(list.dispatch().xid, b);
    }

    proptest::proptest! {
        // Interleaves add/collect against a ring sized to never hit
        // CAPACITY, and checks that occupied-slot count always equals
        // successful adds minus successful collects.
        #[test]
        fn occupied_count_matches_adds_minus_collects(ops in proptest::collection::vec(0u8..2, 0..64)) {
            let list = JobList::new(64).unwrap();
            let mut live = Vec::new();
            let mut serial = 0u32;
            for op in ops {
                if op == 0 || live.is_empty() {
                    serial += 1;
                    let xid = list.add(job(serial, Duration::from_secs(300))).unwrap();
                    live.push(xid);
                } else {
                    let xid = live.remove(0);
                    let _ = list.collect(xid);
                }
            }
            proptest::prop_assert_eq!(list.len(), live.len());
        }
    }
}
