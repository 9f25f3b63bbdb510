//! # Player Session
//!
//! The long-lived per-account actor. A player outlives any single connection:
//! a new login for the same role id takes over, kicking the previous
//! transport, so at most one live transport exists per player at any time.
//!
//! Inbound packets flow through a bounded queue drained by a single consumer
//! task, one packet at a time, strictly in arrival order — never two packets
//! of one player concurrently, even across reconnects.

use crate::core::packet::{PacketIn, PacketOut};
use crate::error::Result;
use crate::protocol::{Dispatcher, PlayerContext};
use crate::transport::{system_notice, Connection};
use crate::utils::buffer_pool::BufferPool;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

struct Attachment {
    conn: Connection,
    consumer: JoinHandle<()>,
}

pub struct Player {
    role_id: i32,
    pool: BufferPool,
    state: Mutex<Option<Attachment>>,
}

impl Player {
    pub(crate) fn new(role_id: i32, pool: BufferPool) -> Arc<Self> {
        Arc::new(Self {
            role_id,
            pool,
            state: Mutex::new(None),
        })
    }

    pub fn role_id(&self) -> i32 {
        self.role_id
    }

    /// Attach a freshly authenticated transport, replacing any prior one.
    ///
    /// The old transport is notified, disconnected, and its consumer task is
    /// fully stopped before the new consumer starts, preserving sequential
    /// dispatch across the takeover.
    #[instrument(skip(self, conn, inbound, dispatcher), fields(role_id = self.role_id))]
    pub async fn attach(
        &self,
        conn: Connection,
        inbound: mpsc::Receiver<PacketIn>,
        dispatcher: Arc<Dispatcher>,
    ) {
        let mut state = self.state.lock().await;

        if let Some(old) = state.take() {
            info!("Duplicate login; kicking previous transport");
            // Best-effort: a wedged transport must not stall the takeover.
            // The disconnect drain delivers the notice when the socket is
            // still writable.
            let _ = old
                .conn
                .sender()
                .try_send(system_notice(&self.pool, "Account logged in elsewhere"));
            old.conn.disconnect();
            old.consumer.abort();
            let _ = old.consumer.await;
        }

        let ctx = PlayerContext::new(self.role_id, conn.sender(), self.pool.clone());
        let consumer = tokio::spawn(consume(ctx, inbound, dispatcher));
        *state = Some(Attachment { conn, consumer });
    }

    /// Queue a packet on the current transport, if any.
    pub async fn send(&self, packet: PacketOut) -> Result<()> {
        let conn = {
            let state = self.state.lock().await;
            state.as_ref().map(|a| a.conn.clone())
        };
        match conn {
            Some(conn) => conn.send(packet).await,
            None => Err(crate::error::GateError::ConnectionClosed),
        }
    }

    /// Tear down the current transport and consumer, if any.
    pub async fn disconnect(&self) {
        let mut state = self.state.lock().await;
        if let Some(old) = state.take() {
            old.conn.disconnect();
            old.consumer.abort();
            let _ = old.consumer.await;
        }
    }

    /// Whether a transport is currently attached and open.
    pub async fn has_live_transport(&self) -> bool {
        let state = self.state.lock().await;
        state.as_ref().map(|a| !a.conn.is_closed()).unwrap_or(false)
    }
}

/// Drain the inbound queue into the dispatcher, one packet at a time.
/// The queue closing is the disconnect signal.
async fn consume(ctx: PlayerContext, mut inbound: mpsc::Receiver<PacketIn>, dispatcher: Arc<Dispatcher>) {
    let role_id = ctx.role_id;
    while let Some(packet) = inbound.recv().await {
        dispatcher.dispatch(ctx.clone(), packet).await;
    }
    debug!(role_id, "Inbound queue closed; consumer stopping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn queue_only_player() -> (Arc<Player>, BufferPool) {
        let pool = BufferPool::new(8);
        (Player::new(7, pool.clone()), pool)
    }

    fn packet(pool: &BufferPool, pid: u16) -> PacketIn {
        let out = PacketOut::new(pool, pid);
        let mut dst = bytes::BytesMut::new();
        out.encode_into(&mut dst);
        PacketIn::from_bytes(pool, &dst)
    }

    #[tokio::test]
    async fn consumer_preserves_arrival_order_with_suspending_handler() {
        let (_player, pool) = queue_only_player();
        let dispatcher = Arc::new(Dispatcher::new());
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        for pid in [21u16, 22, 23] {
            let order = order.clone();
            dispatcher
                .register(pid, move |_ctx, pkt| {
                    let order = order.clone();
                    async move {
                        // The first handler suspends; later packets must still
                        // wait their turn.
                        if pkt.pid() == 21 {
                            tokio::time::sleep(Duration::from_millis(30)).await;
                        }
                        order.lock().unwrap().push(pkt.pid());
                        Ok(())
                    }
                    .boxed()
                })
                .unwrap();
        }

        let (tx, rx) = mpsc::channel(100);
        let (out_tx, _out_rx) = mpsc::channel(100);
        let ctx = PlayerContext::new(7, out_tx, pool.clone());
        let consumer = tokio::spawn(consume(ctx, rx, dispatcher));

        for pid in [21u16, 22, 23] {
            tx.send(packet(&pool, pid)).await.unwrap();
        }
        drop(tx);
        consumer.await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec![21, 22, 23]);
    }

    #[tokio::test]
    async fn consumer_survives_failing_handler() {
        let (_player, pool) = queue_only_player();
        let dispatcher = Arc::new(Dispatcher::new());
        let hits = Arc::new(AtomicUsize::new(0));

        dispatcher
            .register(1, |_ctx, _pkt| {
                async { Err(crate::error::GateError::Custom("bad".into())) }.boxed()
            })
            .unwrap();
        let counter = hits.clone();
        dispatcher
            .register(2, move |_ctx, _pkt| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
                .boxed()
            })
            .unwrap();

        let (tx, rx) = mpsc::channel(100);
        let (out_tx, _out_rx) = mpsc::channel(100);
        let ctx = PlayerContext::new(7, out_tx, pool.clone());
        let consumer = tokio::spawn(consume(ctx, rx, dispatcher));

        tx.send(packet(&pool, 1)).await.unwrap();
        tx.send(packet(&pool, 2)).await.unwrap();
        drop(tx);
        consumer.await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
