//! # Connection Acceptor
//!
//! Listens for TCP connections and applies admission control before any
//! session state exists: a global live-connection limit backed by a
//! semaphore, and a per-IP limit backed by a counter table. A socket refused
//! by either is closed on the spot; no visitor is constructed for it.
//!
//! Admitted sockets are handed to a visitor rented from a bounded pool.
//! Accept failures are logged and never stop the loop.

use crate::error::{constants, Result};
use crate::session::services::GateServices;
use crate::session::visitor::VisitorPool;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, instrument, warn};

const IP_TABLE_SHARDS: usize = 16;

/// Per-IP live-connection counters, sharded so unrelated addresses never
/// contend on one lock.
pub struct IpTable {
    limit: usize,
    shards: Vec<Mutex<HashMap<IpAddr, usize>>>,
}

impl IpTable {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            shards: (0..IP_TABLE_SHARDS)
                .map(|_| Mutex::new(HashMap::new()))
                .collect(),
        }
    }

    fn shard(&self, ip: &IpAddr) -> &Mutex<HashMap<IpAddr, usize>> {
        let mut hasher = DefaultHasher::new();
        ip.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % IP_TABLE_SHARDS]
    }

    /// Count a connection against `ip`, unless it is already at the limit.
    /// The permit decrements the count when dropped.
    pub fn try_acquire(self: &Arc<Self>, ip: IpAddr) -> Option<IpPermit> {
        let mut shard = self.shard(&ip).lock().expect("ip table poisoned");
        let count = shard.entry(ip).or_insert(0);
        if *count >= self.limit {
            return None;
        }
        *count += 1;
        drop(shard);
        Some(IpPermit {
            table: Arc::clone(self),
            ip,
        })
    }

    pub fn count(&self, ip: IpAddr) -> usize {
        self.shard(&ip)
            .lock()
            .expect("ip table poisoned")
            .get(&ip)
            .copied()
            .unwrap_or(0)
    }
}

/// RAII slot in the per-IP table.
pub struct IpPermit {
    table: Arc<IpTable>,
    ip: IpAddr,
}

impl Drop for IpPermit {
    fn drop(&mut self) {
        let mut shard = self.table.shard(&self.ip).lock().expect("ip table poisoned");
        if let Some(count) = shard.get_mut(&self.ip) {
            *count -= 1;
            if *count == 0 {
                shard.remove(&self.ip);
            }
        }
    }
}

/// The two admission counters a connection occupies for its lifetime.
pub struct AdmissionPermit {
    _global: OwnedSemaphorePermit,
    _ip: IpPermit,
}

impl AdmissionPermit {
    pub fn new(global: OwnedSemaphorePermit, ip: IpPermit) -> Self {
        Self {
            _global: global,
            _ip: ip,
        }
    }
}

/// TCP accept loop with admission control.
pub struct Acceptor {
    services: Arc<GateServices>,
    visitors: Arc<VisitorPool>,
    ip_table: Arc<IpTable>,
    conn_limit: Arc<Semaphore>,
}

impl Acceptor {
    pub fn new(services: Arc<GateServices>) -> Self {
        let ip_table = Arc::new(IpTable::new(services.per_ip_limit));
        let conn_limit = Arc::new(Semaphore::new(services.max_connections));
        let visitors = Arc::new(VisitorPool::new(services.accept_pool_size));
        Self {
            services,
            visitors,
            ip_table,
            conn_limit,
        }
    }

    /// Bind with the configured backlog and serve until the shutdown channel
    /// fires.
    #[instrument(skip(self, shutdown_rx), fields(addr = %addr))]
    pub async fn run(&self, addr: &str, shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        let addr: std::net::SocketAddr = addr
            .parse()
            .map_err(|e| crate::error::GateError::ConfigError(format!("Invalid bind address: {e}")))?;
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(self.services.accept_backlog)?;
        self.run_on(listener, shutdown_rx).await
    }

    /// Serve on an already-bound listener until the shutdown channel fires.
    pub async fn run_on(
        &self,
        listener: TcpListener,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) -> Result<()> {
        info!(
            max_connections = self.services.max_connections,
            per_ip_limit = self.services.per_ip_limit,
            "Listening"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Acceptor shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => self.admit(stream, peer),
                        Err(e) => {
                            // Transient accept failures must not stop the loop.
                            error!(error = %e, "Error accepting connection");
                        }
                    }
                }
            }
        }
    }

    fn admit(&self, stream: tokio::net::TcpStream, peer: std::net::SocketAddr) {
        let Ok(global) = Arc::clone(&self.conn_limit).try_acquire_owned() else {
            warn!(%peer, "{}; refusing connection", constants::ERR_MAX_CONNECTIONS);
            drop(stream);
            return;
        };
        let Some(ip_permit) = self.ip_table.try_acquire(peer.ip()) else {
            info!(%peer, "{}; refusing connection", constants::ERR_IP_LIMIT);
            drop(stream);
            return;
        };

        debug!(%peer, "Connection admitted");
        let permit = AdmissionPermit::new(global, ip_permit);
        let mut visitor = self.visitors.rent();
        let services = Arc::clone(&self.services);
        let visitors = Arc::clone(&self.visitors);
        tokio::spawn(async move {
            visitor.run(stream, peer, &services, permit).await;
            visitors.put_back(visitor);
        });
    }
}
