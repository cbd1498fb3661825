//! The worker-request registry: a bounded FIFO of worker-ready tokens
//! consumed by the ingress hook when a new service check needs a worker.
//!
//! Two policies distinguish this from a plain bounded queue: `dequeue`
//! discards stale tokens in-line rather than handing one back to the
//! caller, and `enqueue` never blocks or rejects - on overflow it drops
//! the oldest token to make room, matching `dnxRequestList`'s (from
//! `dnxRegistrar.c`) worker-node request queue semantics, backpressure
//! by `maxNodeRequests`.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Instant;

use dnx_core::Xid;
use log::debug;
use parking_lot::{Condvar, Mutex};

/// A worker's standing offer to accept jobs, valid until `expires_at`.
#[derive(Debug, Clone)]
pub struct RequestToken {
    pub worker_xid: Xid,
    pub address: SocketAddr,
    pub job_capacity: u32,
    pub expires_at: Instant,
}

struct Inner {
    tokens: VecDeque<RequestToken>,
    expired_discards: u64,
}

pub struct RequestRegistry {
    capacity: usize,
    inner: Mutex<Inner>,
    cond: Condvar,
}

impl RequestRegistry {
    pub fn new(capacity: usize) -> Self {
        RequestRegistry {
            capacity,
            inner: Mutex::new(Inner {
                tokens: VecDeque::new(),
                expired_discards: 0,
            }),
            cond: Condvar::new(),
        }
    }

    /// Never blocks. Drops the oldest token and logs an overflow event
    /// when the registry is already at capacity.
    pub fn enqueue(&self, token: RequestToken) {
        let mut inner = self.inner.lock();
        if inner.tokens.len() >= self.capacity {
            if let Some(dropped) = inner.tokens.pop_front() {
                log::warn!(
                    "request registry overflow (capacity={}): dropping oldest token for worker {}",
                    self.capacity,
                    dropped.worker_xid
                );
            }
        }
        inner.tokens.push_back(token);
        self.cond.notify_one();
    }

    /// Pops in FIFO order, discarding expired tokens along the way.
    /// Returns `None` when no live token remains.
    pub fn dequeue(&self, now: Instant) -> Option<RequestToken> {
        let mut inner = self.inner.lock();
        loop {
            let token = inner.tokens.pop_front()?;
            if token.expires_at <= now {
                inner.expired_discards += 1;
                debug!(
                    "discarding expired request token for worker {} (expired {:?} ago)",
                    token.worker_xid,
                    now.saturating_duration_since(token.expires_at)
                );
                continue;
            }
            return Some(token);
        }
    }

    /// Removes the token(s) matching `predicate`, e.g. a DEREGISTER by
    /// worker XID. Not counted as an expiry: this is a voluntary
    /// deregistration, not a stale-token reclaim.
    pub fn remove_matching<F>(&self, predicate: F)
    where
        F: Fn(&RequestToken) -> bool,
    {
        let mut inner = self.inner.lock();
        inner.tokens.retain(|t| !predicate(t));
    }

    pub fn remove_all(&self) {
        let mut inner = self.inner.lock();
        inner.tokens.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn expired_discard_count(&self) -> u64 {
        self.inner.lock().expired_discards
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dnx_core::ObjectKind;
    use std::time::Duration;

    fn token(serial: u32, expires_at: Instant) -> RequestToken {
        RequestToken {
            worker_xid: Xid::new(ObjectKind::Worker, serial, 0),
            address: "127.0.0.1:9000".parse().unwrap(),
            job_capacity: 1,
            expires_at,
        }
    }

    #[test]
    fn fifo_order_preserved() {
        let reg = RequestRegistry::new(4);
        let later = Instant::now() + Duration::from_secs(60);
        reg.enqueue(token(1, later));
        reg.enqueue(token(2, later));
        let now = Instant::now();
        assert_eq!(reg.dequeue(now).unwrap().worker_xid.serial, 1);
        assert_eq!(reg.dequeue(now).unwrap().worker_xid.serial, 2);
        assert!(reg.dequeue(now).is_none());
    }

    #[test]
    fn dequeue_discards_expired_tokens() {
        let reg = RequestRegistry::new(4);
        let now = Instant::now();
        reg.enqueue(token(1, now - Duration::from_secs(1)));
        reg.enqueue(token(2, now + Duration::from_secs(60)));
        let got = reg.dequeue(now).unwrap();
        assert_eq!(got.worker_xid.serial, 2);
        assert_eq!(reg.expired_discard_count(), 1);
    }

    #[test]
    fn enqueue_drops_oldest_on_overflow() {
        let reg = RequestRegistry::new(2);
        let later = Instant::now() + Duration::from_secs(60);
        reg.enqueue(token(1, later));
        reg.enqueue(token(2, later));
        reg.enqueue(token(3, later));
        assert_eq!(reg.len(), 2);
        let now = Instant::now();
        assert_eq!(reg.dequeue(now).unwrap().worker_xid.serial, 2);
        assert_eq!(reg.dequeue(now).unwrap().worker_xid.serial, 3);
    }

    #[test]
    fn remove_matching_does_not_count_as_expiry() {
        let reg = RequestRegistry::new(4);
        let later = Instant::now() + Duration::from_secs(60);
        reg.enqueue(token(1, later));
        reg.enqueue(token(2, later));
        reg.remove_matching(|t| t.worker_xid.serial == 1);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.expired_discard_count(), 0);
    }

    #[test]
    fn remove_all_empties_the_registry() {
        let reg = RequestRegistry::new(4);
        let later = Instant::now() + Duration::from_secs(60);
        reg.enqueue(token(1, later));
        reg.enqueue(token(2, later));
        reg.remove_all();
        assert!(reg.is_empty());
    }
}
