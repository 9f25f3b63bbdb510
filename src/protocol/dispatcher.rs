//! # Packet Dispatcher
//!
//! Routes a decoded packet to a handler registered under its numeric packet
//! id. The registry is built explicitly at startup; there is no runtime
//! discovery. Handler failures — errors and panics alike — are isolated per
//! packet: they are logged and the owning player's consumer loop continues.
//!
//! Packets move into their handler, so the pooled buffer is released when the
//! packet drops — at the end of the handler on success, during unwind on a
//! panic, or right here when no handler is registered.

use crate::core::packet::{PacketIn, PacketOut};
use crate::error::{constants, GateError, Result};
use crate::utils::buffer_pool::BufferPool;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// What a handler sees of its player: identity and the outbound path.
#[derive(Clone)]
pub struct PlayerContext {
    pub role_id: i32,
    outbound: mpsc::Sender<PacketOut>,
    pool: BufferPool,
}

impl PlayerContext {
    pub fn new(role_id: i32, outbound: mpsc::Sender<PacketOut>, pool: BufferPool) -> Self {
        Self {
            role_id,
            outbound,
            pool,
        }
    }

    /// Queue a packet for the player's connection. Suspends while the
    /// outbound queue is full.
    pub async fn send(&self, packet: PacketOut) -> Result<()> {
        self.outbound
            .send(packet)
            .await
            .map_err(|_| GateError::Custom(constants::ERR_SEND_QUEUE_CLOSED.into()))
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }
}

type HandlerFn =
    dyn Fn(PlayerContext, PacketIn) -> BoxFuture<'static, Result<()>> + Send + Sync;

/// Packet-id keyed handler registry.
pub struct Dispatcher {
    handlers: RwLock<HashMap<u16, Arc<HandlerFn>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn register<F>(&self, pid: u16, handler: F) -> Result<()>
    where
        F: Fn(PlayerContext, PacketIn) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| GateError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.to_string()))?;
        handlers.insert(pid, Arc::new(handler));
        Ok(())
    }

    /// Dispatch one packet. Never propagates handler failures.
    pub async fn dispatch(&self, ctx: PlayerContext, packet: PacketIn) {
        let pid = packet.pid();
        let handler = match self.handlers.read() {
            Ok(handlers) => handlers.get(&pid).cloned(),
            Err(_) => {
                error!("{}", constants::ERR_DISPATCHER_READ_LOCK);
                return;
            }
        };

        let Some(handler) = handler else {
            warn!(role_id = ctx.role_id, pid, "No handler for packet id; dropped");
            return;
        };

        debug!(role_id = ctx.role_id, pid, "Dispatching packet");
        let role_id = ctx.role_id;
        match AssertUnwindSafe(handler(ctx, packet)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(role_id, pid, error = %e, "Handler failed");
            }
            Err(_) => {
                error!(role_id, pid, "Handler panicked");
            }
        }
    }

    /// Number of registered packet ids.
    pub fn len(&self) -> usize {
        self.handlers.read().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
