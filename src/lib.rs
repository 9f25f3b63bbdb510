//! # tank-gate
//!
//! Secure session edge for a multiplayer game server.
//!
//! The gate accepts raw TCP connections, applies global and per-IP admission
//! control, authenticates each connection through a multi-stage token
//! handshake, runs an enciphered framed transport over it, and hands the
//! authenticated connection to a long-lived per-account player session that
//! serializes inbound traffic into registered packet handlers.
//!
//! ## Architecture
//!
//! - [`transport`] — the accept loop and per-connection reader/writer tasks
//! - [`core`] — the rolling-key cipher, frame layout, codec, and packet views
//! - [`protocol`] — the three-stage credential handshake and the dispatcher
//! - [`session`] — visitor (pre-auth) and player (post-auth) actors
//! - [`store`] — the credential cache and the account-store seam
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use tank_gate::config::GateConfig;
//! use tank_gate::protocol::Dispatcher;
//! use tank_gate::store::MemoryAccountStore;
//! use tank_gate::Gate;
//!
//! #[tokio::main]
//! async fn main() -> tank_gate::error::Result<()> {
//!     let dispatcher = Arc::new(Dispatcher::new());
//!     let gate = Gate::new(
//!         GateConfig::default(),
//!         Arc::new(MemoryAccountStore::new()),
//!         dispatcher,
//!     )?;
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel(1);
//!     gate.serve(shutdown_rx).await
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod session;
pub mod store;
pub mod transport;
pub mod utils;

use crate::config::GateConfig;
use crate::error::Result;
use crate::protocol::{AuthService, CredentialUnwrapper, Dispatcher};
use crate::session::GateServices;
use crate::store::AccountStore;
use crate::transport::Acceptor;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use crate::error::GateError;

/// One fully wired gate instance: services, admission state, and the accept
/// loop. All state is per-instance; two gates in one process do not share
/// anything.
pub struct Gate {
    config: GateConfig,
    accounts: Arc<dyn AccountStore>,
    services: Arc<GateServices>,
    acceptor: Acceptor,
    sweeper_cancel: CancellationToken,
}

impl Gate {
    pub fn new(
        config: GateConfig,
        accounts: Arc<dyn AccountStore>,
        dispatcher: Arc<Dispatcher>,
    ) -> Result<Self> {
        config.validate_strict()?;

        let credentials = match &config.auth.rsa_private_key_pem {
            Some(pem) => CredentialUnwrapper::from_pem(pem)?,
            None => CredentialUnwrapper::generate()?,
        };
        let auth = Arc::new(AuthService::new(
            Arc::clone(&accounts),
            config.auth.web_token_ttl,
            config.auth.tcp_token_ttl,
        ));
        let services = Arc::new(GateServices::new(
            &config,
            auth,
            Arc::new(credentials),
            dispatcher,
        ));
        let acceptor = Acceptor::new(Arc::clone(&services));

        Ok(Self {
            config,
            accounts,
            services,
            acceptor,
            sweeper_cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn services(&self) -> &Arc<GateServices> {
        &self.services
    }

    /// The handshake service, for the surrounding HTTP/control layer to drive
    /// the web and client login stages.
    pub fn auth(&self) -> &Arc<AuthService> {
        &self.services.auth
    }

    /// Stage 2 as it arrives over the HTTP channel: a base64-encoded,
    /// RSA-encrypted token blob. Unwraps it and consumes the web-stage token,
    /// binding the tcp-stage token to `role_id`.
    pub fn client_login_blob(&self, role_id: i32, encoded: &str) -> bool {
        match self.services.credentials.unwrap_token(encoded) {
            Ok(creds) => self.services.auth.client_login(
                &creds.account,
                &creds.web_token,
                &creds.tcp_token,
                role_id,
            ),
            Err(e) => {
                tracing::warn!(error = %e, "Token login blob rejected");
                false
            }
        }
    }

    /// Bind with the configured backlog, start the background token sweeper,
    /// and serve until the shutdown channel fires.
    pub async fn serve(&self, shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        self.start_background().await?;
        let result = self
            .acceptor
            .run(&self.config.server.bind_addr(), shutdown_rx)
            .await;
        self.sweeper_cancel.cancel();
        result
    }

    /// Serve on an already-bound listener; useful when the caller needs the
    /// ephemeral port before the loop starts.
    pub async fn serve_on(
        &self,
        listener: tokio::net::TcpListener,
        shutdown_rx: mpsc::Receiver<()>,
    ) -> Result<()> {
        self.start_background().await?;
        let result = self.acceptor.run_on(listener, shutdown_rx).await;
        self.sweeper_cancel.cancel();
        result
    }

    async fn start_background(&self) -> Result<()> {
        self.accounts.ensure_indexes().await?;
        // Detached; stopped through the cancellation token on shutdown.
        let _ = self
            .services
            .auth
            .spawn_sweeper(self.config.auth.sweep_interval, self.sweeper_cancel.clone());
        info!(app = %self.config.logging.app_name, "Gate starting");
        Ok(())
    }
}
