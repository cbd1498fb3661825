//! Datagram transport abstraction.
//!
//! `Transport` models the send/recv contract the rest of the system is
//! built on: bounded messages, per-call timeouts, no guaranteed delivery,
//! no ordering. [`UdpTransport`] is the production implementation; the
//! `test-support` feature adds [`mock::MockTransport`], an in-memory
//! channel-map used by the end-to-end scenario tests in `dnx-server` and
//! `dnx-client`.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{DnxError, DnxResult};

/// Maximum datagram payload, matching `DNX_MAX_MSG`.
pub const MAX_MESSAGE_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Udp,
    Tcp,
    MsgQ,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Scheme::Udp => "udp",
            Scheme::Tcp => "tcp",
            Scheme::MsgQ => "msgq",
        };
        write!(f, "{s}")
    }
}

/// A parsed `"<scheme>://<host>:<port>"` channel URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelUrl {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub raw: String,
}

impl ChannelUrl {
    pub fn parse(url: &str) -> DnxResult<Self> {
        let (scheme_str, rest) = url
            .split_once("://")
            .ok_or_else(|| DnxError::BadUrl(format!("missing scheme in {url}")))?;
        let scheme = match scheme_str {
            "udp" => Scheme::Udp,
            "tcp" => Scheme::Tcp,
            "msgq" => Scheme::MsgQ,
            other => return Err(DnxError::BadUrl(format!("unsupported scheme {other}"))),
        };
        let (host, port_str) = rest
            .rsplit_once(':')
            .ok_or_else(|| DnxError::BadUrl(format!("missing port in {url}")))?;
        let port: u16 = port_str
            .parse()
            .map_err(|_| DnxError::BadUrl(format!("invalid port in {url}")))?;
        if host.is_empty() {
            return Err(DnxError::BadUrl(format!("missing host in {url}")));
        }
        Ok(ChannelUrl {
            scheme,
            host: host.to_string(),
            port,
            raw: url.to_string(),
        })
    }

    /// `0.0.0.0` / `INADDR_ANY` / `0` forces passive-any-address binding;
    /// that form is only meaningful for a listening (passive) socket.
    pub fn is_any_address(&self) -> bool {
        matches!(self.host.as_str(), "0.0.0.0" | "INADDR_ANY" | "0")
    }

    pub fn socket_addr(&self) -> DnxResult<SocketAddr> {
        let host = if self.is_any_address() {
            "0.0.0.0"
        } else {
            self.host.as_str()
        };
        format!("{host}:{}", self.port)
            .parse()
            .map_err(|_| DnxError::Address(format!("cannot resolve {}", self.raw)))
    }
}

pub enum RecvOutcome {
    Data { size: usize, peer: SocketAddr },
    Timeout,
}

/// A send/receive datagram endpoint. Implementations own exactly one
/// underlying socket/channel and are used by exactly one thread at a time -
/// no sharing a channel across threads.
pub trait Transport: Send {
    /// Receives into `buf`, blocking up to `timeout`. `Duration::ZERO`
    /// means "no wait"; the timeout contract has no representation for
    /// negative durations since `Duration` cannot be negative - callers
    /// validate that at the config layer instead.
    fn recv(&self, buf: &mut [u8], timeout: Duration) -> DnxResult<RecvOutcome>;

    /// Sends `buf` to `peer`. `peer` is required for active-mode channels
    /// with no stored default destination and is ignored by passive
    /// channels that reply to whichever peer last called `recv`... in
    /// practice every send in this codebase targets an explicit address
    /// captured from a prior `recv`, so no implicit default-destination
    /// bookkeeping is needed here.
    fn send(&self, buf: &[u8], peer: SocketAddr) -> DnxResult<()>;

    fn local_addr(&self) -> DnxResult<SocketAddr>;

    /// The destination captured at `open_active` time, if any. Passive
    /// channels (which reply to whatever address their last `recv`
    /// returned) have none; active channels always do. Active-channel
    /// callers such as the client's worker threads use this instead of
    /// tracking the server's address themselves.
    fn default_peer(&self) -> Option<SocketAddr> {
        None
    }
}

mod udp;
pub use udp::UdpTransport;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub fn open_passive(url: &str) -> DnxResult<UdpTransport> {
    let parsed = ChannelUrl::parse(url)?;
    if parsed.scheme != Scheme::Udp {
        return Err(DnxError::Unsupported(format!(
            "transport scheme {} not implemented",
            parsed.scheme
        )));
    }
    UdpTransport::bind(&parsed)
}

pub fn open_active(url: &str) -> DnxResult<UdpTransport> {
    let parsed = ChannelUrl::parse(url)?;
    if parsed.scheme != Scheme::Udp {
        return Err(DnxError::Unsupported(format!(
            "transport scheme {} not implemented",
            parsed.scheme
        )));
    }
    if parsed.is_any_address() {
        return Err(DnxError::BadUrl(
            "any-address host is only valid for passive channels".to_string(),
        ));
    }
    UdpTransport::connect(&parsed)
}
