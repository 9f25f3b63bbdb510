//! Shared services handed to sessions by reference.
//!
//! Everything here used to be a process-wide static in older renditions of
//! this server; passing one explicitly constructed bundle instead keeps tests
//! isolated and state per instance.

use crate::config::GateConfig;
use crate::protocol::{AuthService, CredentialUnwrapper, Dispatcher};
use crate::session::registry::PlayerRegistry;
use crate::utils::buffer_pool::BufferPool;
use std::sync::Arc;
use std::time::Duration;

pub struct GateServices {
    pub auth: Arc<AuthService>,
    pub credentials: Arc<CredentialUnwrapper>,
    pub players: Arc<PlayerRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub pool: BufferPool,

    pub login_timeout: Duration,
    pub inbound_queue: usize,
    pub outbound_queue: usize,
    pub max_connections: usize,
    pub per_ip_limit: usize,
    pub accept_pool_size: usize,
    pub recv_buffer_size: usize,
    pub accept_backlog: u32,
}

impl GateServices {
    pub fn new(
        config: &GateConfig,
        auth: Arc<AuthService>,
        credentials: Arc<CredentialUnwrapper>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        let pool = BufferPool::new(config.server.buffer_pool_size);
        Self {
            auth,
            credentials,
            players: Arc::new(PlayerRegistry::new(pool.clone())),
            dispatcher,
            pool,
            login_timeout: config.server.login_timeout,
            inbound_queue: config.server.inbound_queue,
            outbound_queue: config.server.outbound_queue,
            max_connections: config.server.max_connections,
            per_ip_limit: config.server.per_ip_limit,
            accept_pool_size: config.server.accept_pool_size,
            recv_buffer_size: config.server.recv_buffer_size,
            accept_backlog: config.server.accept_backlog,
        }
    }
}
