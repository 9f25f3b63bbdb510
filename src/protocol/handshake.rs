//! # Three-Stage Credential Handshake
//!
//! Binds a web-issued token, a role-selection token, and a TCP connection to
//! one authenticated account:
//!
//! 1. [`web_login`](AuthService::web_login) — password check against the
//!    account store; issues a web-stage token.
//! 2. [`client_login`](AuthService::client_login) — consumes the web-stage
//!    token; on success issues a tcp-stage token bound to `(account, roleId)`.
//! 3. [`tcp_login`](AuthService::tcp_login) — consumed by the visitor session
//!    on the first TCP packet; `0` signals failure.
//!
//! Every token is single-use and TTL-bounded; each stage sweeps its store
//! before acting, and a background sweeper covers idle periods.

use crate::error::Result;
use crate::store::{Account, AccountStore, TokenCache};
use crate::utils::rand;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Length of issued web-stage tokens.
const WEB_TOKEN_LEN: usize = 7;

pub struct AuthService {
    accounts: Arc<dyn AccountStore>,
    web: TokenCache,
    tcp: TokenCache,
}

impl AuthService {
    pub fn new(accounts: Arc<dyn AccountStore>, web_ttl: Duration, tcp_ttl: Duration) -> Self {
        Self {
            accounts,
            web: TokenCache::new(web_ttl),
            tcp: TokenCache::new(tcp_ttl),
        }
    }

    /// Register a new account; `false` if the name is taken.
    #[instrument(skip(self, password))]
    pub async fn create_account(
        &self,
        name: &str,
        password: &str,
        external_id: i32,
    ) -> Result<bool> {
        if self.accounts.get(name).await?.is_some() {
            warn!(account = name, "Attempted to create existing account");
            return Ok(false);
        }
        self.accounts
            .save(Account {
                name: name.to_string(),
                password: password.to_string(),
                external_id,
                registered_at: SystemTime::now(),
            })
            .await?;
        info!(account = name, "Account created");
        Ok(true)
    }

    /// Stage 1: password check, web-stage token issuance.
    #[instrument(skip(self, password))]
    pub async fn web_login(&self, name: &str, password: &str) -> Result<Option<String>> {
        self.sweep();

        let Some(account) = self.accounts.get(name).await? else {
            warn!(account = name, "Web login for unknown account");
            return Ok(None);
        };
        if account.password.is_empty() || account.password != password {
            warn!(account = name, "Web login password mismatch");
            return Ok(None);
        }

        let token = rand::token(WEB_TOKEN_LEN);
        self.web.issue(name, token.clone(), 0);
        info!(account = name, "Web login succeeded");
        Ok(Some(token))
    }

    /// Stage 2: consume the web-stage token, bind the tcp-stage token to the
    /// selected role.
    #[instrument(skip(self, web_token, tcp_token))]
    pub fn client_login(&self, name: &str, web_token: &str, tcp_token: &str, role_id: i32) -> bool {
        self.sweep();

        if self.web.consume(name, web_token).is_none() {
            warn!(account = name, "Web token validation failed");
            return false;
        }
        self.tcp.issue(name, tcp_token.to_string(), role_id);
        info!(account = name, role_id, "Client login succeeded");
        true
    }

    /// Stage 3: consume the tcp-stage token; returns the bound role id, or 0.
    #[instrument(skip(self, tcp_token))]
    pub fn tcp_login(&self, name: &str, tcp_token: &str) -> i32 {
        self.sweep();

        match self.tcp.consume(name, tcp_token) {
            Some(role_id) => {
                info!(account = name, role_id, "Tcp login succeeded");
                role_id
            }
            None => {
                warn!(account = name, "Tcp login failed");
                0
            }
        }
    }

    /// Direct password check against the account store, for clients that
    /// reach the game port without a prior web stage. Bypasses the token
    /// caches entirely; the account's external id serves as the role id.
    #[instrument(skip(self, password))]
    pub async fn password_login(&self, name: &str, password: &str) -> Result<Option<i32>> {
        let Some(account) = self.accounts.get(name).await? else {
            return Ok(None);
        };
        if account.password.is_empty() || account.password != password {
            return Ok(None);
        }
        info!(account = name, "Password login succeeded");
        Ok(Some(account.external_id))
    }

    /// Evict expired tokens from both stores.
    pub fn sweep(&self) {
        self.web.sweep();
        self.tcp.sweep();
    }

    /// Periodic sweep covering accounts that never come back to consume.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let auth = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        auth.sweep();
                        debug!("Token sweep completed");
                    }
                }
            }
        })
    }

    #[cfg(test)]
    pub(crate) fn pending_tokens(&self) -> (usize, usize) {
        (self.web.len(), self.tcp.len())
    }
}
