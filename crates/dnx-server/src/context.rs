use std::sync::Arc;

use dnx_core::transport::open_passive;
use dnx_core::{DnxResult, Transport};
use regex::Regex;

use crate::config::ServerConfig;
use crate::joblist::JobList;
use crate::registry::RequestRegistry;

/// Shared state handed to every server thread. Threads never talk to each
/// other directly; they only ever go through `job_list` and `registry`.
pub struct ServerContext {
    pub config: ServerConfig,
    pub job_list: Arc<JobList>,
    pub registry: Arc<RequestRegistry>,
    pub local_check_pattern: Regex,
    pub dispatch_channel: Arc<dyn Transport>,
    pub collect_channel: Arc<dyn Transport>,
}

impl ServerContext {
    pub fn new(config: ServerConfig) -> DnxResult<Self> {
        let local_check_pattern = Regex::new(&config.local_check_pattern)
            .expect("validated at ServerConfig::load");
        let job_list = Arc::new(JobList::new(config.min_service_slots)?);
        let registry = Arc::new(RequestRegistry::new(config.max_node_requests));
        let dispatch_channel: Arc<dyn Transport> = Arc::new(open_passive(&config.channel_dispatcher)?);
        let collect_channel: Arc<dyn Transport> = Arc::new(open_passive(&config.channel_collector)?);
        Ok(ServerContext {
            config,
            job_list,
            registry,
            local_check_pattern,
            dispatch_channel,
            collect_channel,
        })
    }

    /// Test-only constructor that swaps in the in-memory mock transport so
    /// the four threads can be exercised without real sockets.
    #[cfg(any(test, feature = "test-support"))]
    pub fn new_with_mock(config: ServerConfig) -> DnxResult<Self> {
        let local_check_pattern = Regex::new(&config.local_check_pattern)
            .expect("validated at ServerConfig::load");
        let job_list = Arc::new(JobList::new(config.min_service_slots)?);
        let registry = Arc::new(RequestRegistry::new(config.max_node_requests));
        let dispatch_channel: Arc<dyn Transport> =
            dnx_core::transport::mock::open_passive(&config.channel_dispatcher)?;
        let collect_channel: Arc<dyn Transport> =
            dnx_core::transport::mock::open_passive(&config.channel_collector)?;
        Ok(ServerContext {
            config,
            job_list,
            registry,
            local_check_pattern,
            dispatch_channel,
            collect_channel,
        })
    }
}
