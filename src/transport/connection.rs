//! # Live Connection
//!
//! After the handshake, a connection is a pair of tasks over the split framed
//! transport: the reader drives the decrypting codec and forwards packets to
//! the owning session, the writer drains a bounded outbound queue through the
//! encrypting codec.
//!
//! ## Backpressure
//! - Inbound is drop-newest-and-notify: when the session's queue is full the
//!   packet is released and a busy notice is queued instead; the network
//!   reader never blocks.
//! - Outbound blocks the producer until space frees up.
//!
//! ## Teardown
//! Disconnect is idempotent: any number of triggers (socket error, kick,
//! shutdown) resolve to one cancellation. The writer flushes what was already
//! queued best-effort, then closes the socket; buffers still in flight return
//! to their pool by drop.

use crate::core::codec::GateCodec;
use crate::core::packet::{PacketIn, PacketOut};
use crate::error::{constants, GateError, Result};
use crate::protocol::NOTICE_PID;
use crate::utils::buffer_pool::BufferPool;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::acceptor::AdmissionPermit;

/// Build the pid-3 notice sent on kicks and busy queues.
pub fn system_notice(pool: &BufferPool, message: &str) -> PacketOut {
    let mut notice = PacketOut::new(pool, NOTICE_PID);
    notice.write_i32(1);
    notice.write_utf(message);
    notice
}

/// Handle to one authenticated connection.
#[derive(Clone)]
pub struct Connection {
    peer: Option<SocketAddr>,
    outbound: mpsc::Sender<PacketOut>,
    cancel: CancellationToken,
    closed: Arc<AtomicBool>,
}

impl Connection {
    /// Take ownership of an authenticated framed transport and spawn its
    /// reader and writer tasks. Returns the handle and the inbound packet
    /// queue for the owning session to consume.
    ///
    /// The admission permit rides with the tasks, so the global and per-IP
    /// counters release exactly when the connection is fully torn down.
    pub fn spawn(
        framed: Framed<TcpStream, GateCodec>,
        peer: Option<SocketAddr>,
        inbound_capacity: usize,
        outbound_capacity: usize,
        pool: BufferPool,
        permit: AdmissionPermit,
    ) -> (Self, mpsc::Receiver<PacketIn>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(inbound_capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(outbound_capacity);
        let cancel = CancellationToken::new();
        let closed = Arc::new(AtomicBool::new(false));
        let permit = Arc::new(permit);

        let (sink, stream) = framed.split();

        tokio::spawn(read_loop(
            stream,
            inbound_tx,
            outbound_tx.clone(),
            pool,
            cancel.clone(),
            Arc::clone(&permit),
            peer,
        ));
        tokio::spawn(write_loop(sink, outbound_rx, cancel.clone(), permit, peer));

        (
            Self {
                peer,
                outbound: outbound_tx,
                cancel,
                closed,
            },
            inbound_rx,
        )
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Sender half of the outbound queue, for handler contexts.
    pub fn sender(&self) -> mpsc::Sender<PacketOut> {
        self.outbound.clone()
    }

    /// Queue a packet, suspending while the outbound queue is full.
    pub async fn send(&self, packet: PacketOut) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(GateError::ConnectionClosed);
        }
        self.outbound
            .send(packet)
            .await
            .map_err(|_| GateError::Custom(constants::ERR_SEND_QUEUE_CLOSED.into()))
    }

    /// Stop accepting outbound frames and tear the connection down. Safe to
    /// call any number of times from any task.
    pub fn disconnect(&self) {
        self.closed.store(true, Ordering::Release);
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.cancel.is_cancelled()
    }
}

async fn read_loop(
    mut stream: SplitStream<Framed<TcpStream, GateCodec>>,
    inbound: mpsc::Sender<PacketIn>,
    outbound: mpsc::Sender<PacketOut>,
    pool: BufferPool,
    cancel: CancellationToken,
    _permit: Arc<AdmissionPermit>,
    peer: Option<SocketAddr>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = stream.next() => match next {
                Some(Ok(packet)) => match inbound.try_send(packet) {
                    Ok(()) => {}
                    Err(TrySendError::Full(packet)) => {
                        // Drop-newest: the packet's buffer goes back to the
                        // pool here; the client learns it was shed.
                        warn!(?peer, pid = packet.pid(), "Inbound queue full; packet dropped");
                        drop(packet);
                        let _ = outbound.try_send(system_notice(&pool, "Server busy, slow down"));
                    }
                    Err(TrySendError::Closed(packet)) => {
                        drop(packet);
                        break;
                    }
                },
                Some(Err(e)) => {
                    warn!(?peer, error = %e, "Read error; disconnecting");
                    break;
                }
                None => {
                    debug!(?peer, "Peer closed connection");
                    break;
                }
            },
        }
    }
    cancel.cancel();
    // Dropping `inbound` closes the session's queue: that is the disconnect
    // signal, delivered exactly once.
}

async fn write_loop(
    mut sink: SplitSink<Framed<TcpStream, GateCodec>, PacketOut>,
    mut outbound: mpsc::Receiver<PacketOut>,
    cancel: CancellationToken,
    _permit: Arc<AdmissionPermit>,
    peer: Option<SocketAddr>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            packet = outbound.recv() => match packet {
                Some(packet) => {
                    if let Err(e) = sink.send(packet).await {
                        warn!(?peer, error = %e, "Write error; disconnecting");
                        cancel.cancel();
                        break;
                    }
                }
                None => break,
            },
        }
    }

    // Flush what was already queued, best-effort, then close the socket.
    // Anything unsent is released by drop when the channel is dropped.
    while let Ok(packet) = outbound.try_recv() {
        if sink.send(packet).await.is_err() {
            break;
        }
    }
    let _ = sink.close().await;
    cancel.cancel();
}
