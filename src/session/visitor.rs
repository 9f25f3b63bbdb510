//! # Visitor Session
//!
//! The short-lived pre-authentication actor wrapping one accepted socket.
//! A visitor reads exactly one framed packet — racing a login timeout — and
//! either completes the handshake and hands the live transport to a player,
//! or disconnects. Exactly one terminal action runs per visitor; the flow is
//! sequential, so a late timeout or disconnect cannot fire a second one.
//!
//! Visitors are rented from a bounded pool and returned after their terminal
//! action, surviving connection churn without reallocation.

use crate::core::codec::GateCodec;
use crate::core::packet::{PacketIn, PacketOut};
use crate::error::{GateError, Result};
use crate::protocol::LOGIN_PID;
use crate::session::services::GateServices;
use crate::transport::acceptor::AdmissionPermit;
use crate::transport::Connection;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, info, instrument, warn};

struct LoginOutcome {
    role_id: i32,
    cipher_key: [u8; 8],
}

pub struct Visitor {
    /// Connections this pooled instance has processed.
    handled: u64,
}

impl Visitor {
    fn new() -> Self {
        Self { handled: 0 }
    }

    /// Drive one accepted socket to its terminal action.
    #[instrument(skip(self, stream, services, permit), fields(%peer))]
    pub async fn run(
        &mut self,
        stream: TcpStream,
        peer: SocketAddr,
        services: &GateServices,
        permit: AdmissionPermit,
    ) {
        self.handled += 1;
        let mut framed = Framed::with_capacity(
            stream,
            GateCodec::new(services.pool.clone()),
            services.recv_buffer_size,
        );

        let first = match timeout(services.login_timeout, framed.next()).await {
            Err(_) => {
                info!("Login timed out; disconnecting");
                return;
            }
            Ok(None) => {
                debug!("Disconnected before login");
                return;
            }
            Ok(Some(Err(e))) => {
                warn!(error = %e, "Transport error before login");
                return;
            }
            Ok(Some(Ok(packet))) => packet,
        };

        if first.pid() != LOGIN_PID {
            warn!(pid = first.pid(), "Unexpected packet type during handshake");
            return;
        }

        match authenticate(first, services).await {
            Ok(outcome) => {
                framed.codec_mut().set_key(outcome.cipher_key);
                let player = services.players.get_or_create(outcome.role_id);
                let (conn, inbound) = Connection::spawn(
                    framed,
                    Some(peer),
                    services.inbound_queue,
                    services.outbound_queue,
                    services.pool.clone(),
                    permit,
                );
                player
                    .attach(conn, inbound, Arc::clone(&services.dispatcher))
                    .await;
                info!(role_id = outcome.role_id, "Login complete; transport handed over");
            }
            Err(e) => {
                info!(error = %e, "Login rejected; disconnecting");
                let mut refusal = PacketOut::new(&services.pool, LOGIN_PID);
                refusal.write_u8(1);
                let _ = framed.send(refusal).await;
                // Dropping the transport closes the socket; the admission
                // permit releases with it.
            }
        }
    }
}

/// Unwrap the login blob and validate the credential: token first, then the
/// direct password path for clients that never went through the web stage.
async fn authenticate(mut packet: PacketIn, services: &GateServices) -> Result<LoginOutcome> {
    let _is_change = packet.read_bool()?;
    let _version = packet.read_i32()?;
    let _client_type = packet.read_i32()?;
    let blob = packet.read_rest().to_vec();
    drop(packet);

    let creds = services.credentials.unwrap_direct(&blob)?;

    let mut role_id = services.auth.tcp_login(&creds.account, &creds.credential);
    if role_id == 0 {
        role_id = services
            .auth
            .password_login(&creds.account, &creds.credential)
            .await?
            .unwrap_or(0);
    }
    if role_id == 0 {
        return Err(GateError::Credential(format!(
            "Login rejected for account {}",
            creds.account
        )));
    }

    Ok(LoginOutcome {
        role_id,
        cipher_key: creds.cipher_seed,
    })
}

/// Bounded pool of reusable visitors.
pub struct VisitorPool {
    max: usize,
    pool: Mutex<Vec<Visitor>>,
}

impl VisitorPool {
    pub fn new(max: usize) -> Self {
        Self {
            max,
            pool: Mutex::new(Vec::with_capacity(max)),
        }
    }

    pub fn rent(&self) -> Visitor {
        self.pool
            .lock()
            .expect("visitor pool poisoned")
            .pop()
            .unwrap_or_else(Visitor::new)
    }

    pub fn put_back(&self, visitor: Visitor) {
        let mut pool = self.pool.lock().expect("visitor pool poisoned");
        if pool.len() < self.max {
            pool.push(visitor);
        } else {
            debug!("Visitor pool full; instance dropped");
        }
    }

    pub fn idle(&self) -> usize {
        self.pool.lock().expect("visitor pool poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_reuses_and_bounds() {
        let pool = VisitorPool::new(2);
        assert_eq!(pool.idle(), 0);

        let mut a = pool.rent();
        a.handled = 5;
        pool.put_back(a);
        assert_eq!(pool.idle(), 1);

        let reused = pool.rent();
        assert_eq!(reused.handled, 5);

        pool.put_back(reused);
        pool.put_back(Visitor::new());
        pool.put_back(Visitor::new()); // beyond the bound: dropped
        assert_eq!(pool.idle(), 2);
    }
}
