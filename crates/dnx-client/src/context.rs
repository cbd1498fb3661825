//! Shared, read-mostly state handed to every client-side thread (worker
//! threads, the WLM thread, the management listener). Mirrors
//! `dnx-server::context::ServerContext`'s role: a single owned bundle
//! instead of scattered process-wide globals.

use std::sync::Arc;

use dnx_core::transport::UdpTransport;
use dnx_core::{DnxResult, Transport};

use crate::config::ClientConfig;
use crate::plugin::PluginInvoker;

/// Chooses which concrete `Transport` a worker's active channels bind to.
/// Production code always uses `Udp`; `Mock` backs the end-to-end tests
/// with the in-memory channel-map transport so the whole worker loop can
/// run without real sockets.
#[derive(Clone, Copy)]
pub enum TransportBackend {
    Udp,
    #[cfg(any(test, feature = "test-support"))]
    Mock,
}

impl TransportBackend {
    pub fn open_active(self, url: &str) -> DnxResult<Arc<dyn Transport>> {
        match self {
            TransportBackend::Udp => Ok(Arc::new(UdpTransport::connect(&dnx_core::ChannelUrl::parse(url)?)?)),
            #[cfg(any(test, feature = "test-support"))]
            TransportBackend::Mock => {
                Ok(dnx_core::transport::mock::open_active(url)? as Arc<dyn Transport>)
            }
        }
    }

    pub fn open_passive(self, url: &str) -> DnxResult<Arc<dyn Transport>> {
        match self {
            TransportBackend::Udp => Ok(Arc::new(dnx_core::transport::open_passive(url)?)),
            #[cfg(any(test, feature = "test-support"))]
            TransportBackend::Mock => {
                Ok(dnx_core::transport::mock::open_passive(url)? as Arc<dyn Transport>)
            }
        }
    }
}

pub struct ClientContext {
    pub config: ClientConfig,
    pub backend: TransportBackend,
    pub plugin: PluginInvoker,
    pub hostname: String,
}

impl ClientContext {
    pub fn new(config: ClientConfig) -> Self {
        let plugin = PluginInvoker::new(config.plugin_path.clone());
        let hostname = hostname_or_unknown();
        ClientContext {
            config,
            backend: TransportBackend::Udp,
            plugin,
            hostname,
        }
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn new_with_mock(config: ClientConfig) -> Self {
        let plugin = PluginInvoker::new(config.plugin_path.clone());
        let hostname = hostname_or_unknown();
        ClientContext {
            config,
            backend: TransportBackend::Mock,
            plugin,
            hostname,
        }
    }
}

fn hostname_or_unknown() -> String {
    // `libc::gethostname` instead of an extra crate dependency - the
    // workspace already links libc for process-group signalling.
    let mut buf = vec![0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return "unknown".to_string();
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..len]).into_owned()
}
