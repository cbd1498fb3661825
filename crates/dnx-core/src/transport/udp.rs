use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use super::{ChannelUrl, RecvOutcome, Scheme, Transport, MAX_MESSAGE_SIZE};
use crate::error::{DnxError, DnxResult};

/// A UDP-backed [`Transport`]. Passive channels bind; active channels
/// connect to a default destination (still usable with an explicit `peer`
/// on `send`, since `UdpSocket::send_to` ignores the connected peer).
pub struct UdpTransport {
    socket: UdpSocket,
    default_peer: Option<SocketAddr>,
}

impl UdpTransport {
    pub fn bind(url: &ChannelUrl) -> DnxResult<Self> {
        debug_assert_eq!(url.scheme, Scheme::Udp);
        let addr = url.socket_addr()?;
        let socket = UdpSocket::bind(addr)
            .map_err(|e| DnxError::Open(format!("bind {addr} failed: {e}")))?;
        Ok(UdpTransport {
            socket,
            default_peer: None,
        })
    }

    pub fn connect(url: &ChannelUrl) -> DnxResult<Self> {
        debug_assert_eq!(url.scheme, Scheme::Udp);
        // Active channels still need a local socket to send/receive from;
        // bind to an ephemeral port on all interfaces.
        let socket = UdpSocket::bind("0.0.0.0:0")
            .map_err(|e| DnxError::Open(format!("bind ephemeral socket failed: {e}")))?;
        let peer = url.socket_addr()?;
        Ok(UdpTransport {
            socket,
            default_peer: Some(peer),
        })
    }

    /// Used by the worker thread to bind a uniquely-named active channel
    /// (see dnx-client::worker): same as `connect`, but exposes the bound
    /// ephemeral port for diagnostics.
    pub fn default_peer(&self) -> Option<SocketAddr> {
        self.default_peer
    }
}

impl Transport for UdpTransport {
    fn recv(&self, buf: &mut [u8], timeout: Duration) -> DnxResult<RecvOutcome> {
        // A zero timeout means "no wait" (poll); Rust's socket timeout API
        // treats a zero duration as an error, so round up to 1ns - this
        // still yields "return immediately if nothing is queued" behavior
        // on every platform this targets.
        let sock_timeout = if timeout.is_zero() {
            Duration::from_nanos(1)
        } else {
            timeout
        };
        self.socket
            .set_read_timeout(Some(sock_timeout))
            .map_err(|e| DnxError::Receive(format!("set_read_timeout failed: {e}")))?;

        if buf.len() > MAX_MESSAGE_SIZE {
            return Err(DnxError::Invalid(
                "recv buffer exceeds MAX_MESSAGE_SIZE".to_string(),
            ));
        }

        match self.socket.recv_from(buf) {
            Ok((size, peer)) => {
                if size > MAX_MESSAGE_SIZE {
                    return Err(DnxError::Size(format!(
                        "received {size} bytes, max is {MAX_MESSAGE_SIZE}"
                    )));
                }
                Ok(RecvOutcome::Data { size, peer })
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                Ok(RecvOutcome::Timeout)
            }
            Err(e) => Err(DnxError::Receive(e.to_string())),
        }
    }

    fn send(&self, buf: &[u8], peer: SocketAddr) -> DnxResult<()> {
        if buf.len() > MAX_MESSAGE_SIZE {
            return Err(DnxError::Size(format!(
                "message is {} bytes, max is {MAX_MESSAGE_SIZE}",
                buf.len()
            )));
        }
        let sent = self
            .socket
            .send_to(buf, peer)
            .map_err(|e| DnxError::Send(e.to_string()))?;
        if sent != buf.len() {
            return Err(DnxError::Send(format!(
                "short send: {sent} of {} bytes",
                buf.len()
            )));
        }
        Ok(())
    }

    fn local_addr(&self) -> DnxResult<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| DnxError::Address(e.to_string()))
    }

    fn default_peer(&self) -> Option<SocketAddr> {
        self.default_peer
    }
}
