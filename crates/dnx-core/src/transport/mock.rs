//! An in-memory [`Transport`] used by end-to-end tests. Datagrams are
//! routed through a process-wide registry keyed by socket address instead
//! of a real kernel socket, so tests can exercise the full dispatch/
//! collect/registrar pipeline deterministically and inspect every
//! datagram exchanged.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use super::{ChannelUrl, RecvOutcome, Transport};
use crate::error::{DnxError, DnxResult};

type Datagram = (Vec<u8>, SocketAddr);

struct Registry {
    channels: Mutex<HashMap<SocketAddr, Sender<Datagram>>>,
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Registry {
        channels: Mutex::new(HashMap::new()),
    })
}

static NEXT_EPHEMERAL_PORT: AtomicU16 = AtomicU16::new(40000);

/// Resets all registered mock channels. Intended for test isolation
/// between cases that reuse well-known addresses.
pub fn reset() {
    registry().channels.lock().unwrap().clear();
}

pub struct MockTransport {
    addr: SocketAddr,
    rx: Receiver<Datagram>,
    default_peer: Option<SocketAddr>,
}

impl MockTransport {
    pub fn bind(url: &ChannelUrl) -> DnxResult<Self> {
        let addr = url.socket_addr()?;
        Self::register(addr)
    }

    pub fn connect(url: &ChannelUrl) -> DnxResult<Self> {
        let peer = url.socket_addr()?;
        let ephemeral_port = NEXT_EPHEMERAL_PORT.fetch_add(1, Ordering::Relaxed);
        let local: SocketAddr = format!("127.0.0.1:{ephemeral_port}")
            .parse()
            .expect("loopback address is well-formed");
        let mut transport = Self::register(local)?;
        transport.default_peer = Some(peer);
        Ok(transport)
    }

    fn register(addr: SocketAddr) -> DnxResult<Self> {
        let (tx, rx) = unbounded();
        let mut channels = registry().channels.lock().unwrap();
        if channels.contains_key(&addr) {
            return Err(DnxError::Exist(format!("mock channel {addr} already bound")));
        }
        channels.insert(addr, tx);
        Ok(MockTransport {
            addr,
            rx,
            default_peer: None,
        })
    }

    pub fn default_peer(&self) -> Option<SocketAddr> {
        self.default_peer
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        registry().channels.lock().unwrap().remove(&self.addr);
    }
}

impl Transport for MockTransport {
    fn recv(&self, buf: &mut [u8], timeout: Duration) -> DnxResult<RecvOutcome> {
        let outcome = if timeout.is_zero() {
            self.rx.try_recv().map_err(|_| RecvTimeoutError::Timeout)
        } else {
            self.rx.recv_timeout(timeout)
        };
        match outcome {
            Ok((data, peer)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(RecvOutcome::Data { size: n, peer })
            }
            Err(RecvTimeoutError::Timeout) => Ok(RecvOutcome::Timeout),
            Err(RecvTimeoutError::Disconnected) => {
                Err(DnxError::Receive("mock channel disconnected".to_string()))
            }
        }
    }

    fn send(&self, buf: &[u8], peer: SocketAddr) -> DnxResult<()> {
        let channels = registry().channels.lock().unwrap();
        let tx = channels
            .get(&peer)
            .ok_or_else(|| DnxError::Send(format!("no mock channel listening at {peer}")))?;
        tx.send((buf.to_vec(), self.addr))
            .map_err(|e| DnxError::Send(e.to_string()))
    }

    fn local_addr(&self) -> DnxResult<SocketAddr> {
        Ok(self.addr)
    }

    fn default_peer(&self) -> Option<SocketAddr> {
        self.default_peer
    }
}

pub fn open_passive(url: &str) -> DnxResult<Arc<MockTransport>> {
    Ok(Arc::new(MockTransport::bind(&ChannelUrl::parse(url)?)?))
}

pub fn open_active(url: &str) -> DnxResult<Arc<MockTransport>> {
    Ok(Arc::new(MockTransport::connect(&ChannelUrl::parse(url)?)?))
}
