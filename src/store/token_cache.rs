//! # Single-Use Token Cache
//!
//! One store of short-lived bearer tokens keyed by account name, with an
//! insertion-ordered expiry queue. The handshake runs two independent
//! instances: the web stage (issued after a password check) and the tcp stage
//! (issued after role selection), with different TTLs.
//!
//! ## Semantics
//! - **Single use**: a lookup removes the record whether or not the token
//!   matches. A wrong guess burns the pending token, so a guessed-wrong value
//!   never gets a second try.
//! - **Overwrite on reissue**: issuing for an account that already holds an
//!   unconsumed token invalidates the prior one.
//! - **Monotonic sweep**: the expiry queue is ordered by insertion time, so
//!   the sweep only ever inspects the queue front; it never scans the map.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// One issued token. `role_id` is 0 for the web stage.
#[derive(Debug, Clone)]
struct TokenRecord {
    token: String,
    role_id: i32,
    issued_at: Instant,
}

struct CacheInner {
    records: HashMap<String, TokenRecord>,
    /// `(issued_at, account)` in insertion order.
    expiry: VecDeque<(Instant, String)>,
}

/// Thread-safe single-use token store with TTL eviction.
pub struct TokenCache {
    ttl: Duration,
    inner: Mutex<CacheInner>,
}

impl TokenCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(CacheInner {
                records: HashMap::new(),
                expiry: VecDeque::new(),
            }),
        }
    }

    /// Insert or overwrite the token for `account`.
    pub fn issue(&self, account: &str, token: String, role_id: i32) {
        let mut inner = self.inner.lock().expect("token cache poisoned");
        let issued_at = Instant::now();
        inner.records.insert(
            account.to_string(),
            TokenRecord {
                token,
                role_id,
                issued_at,
            },
        );
        inner.expiry.push_back((issued_at, account.to_string()));
        trace!(account, "Token issued");
    }

    /// Remove the record for `account` if present and return its role id when
    /// the token matches. The record is removed even on mismatch.
    pub fn consume(&self, account: &str, token: &str) -> Option<i32> {
        let mut inner = self.inner.lock().expect("token cache poisoned");
        let record = inner.records.remove(account)?;
        if record.token == token {
            Some(record.role_id)
        } else {
            debug!(account, "Token mismatch; pending token burned");
            None
        }
    }

    /// Evict expired entries from the front of the queue.
    ///
    /// A queue entry may be stale: the account's record can have been consumed
    /// or superseded by a newer issue. The issue timestamp guards against
    /// removing a successor record through an old queue slot.
    pub fn sweep(&self) {
        let mut inner = self.inner.lock().expect("token cache poisoned");
        let mut evicted = 0usize;
        while let Some(&(issued_at, _)) = inner.expiry.front() {
            if issued_at.elapsed() <= self.ttl {
                break;
            }
            let (slot_issued_at, account) = inner.expiry.pop_front().expect("front checked");
            let still_same = inner
                .records
                .get(&account)
                .map(|r| r.issued_at == slot_issued_at)
                .unwrap_or(false);
            if still_same {
                inner.records.remove(&account);
                evicted += 1;
            }
        }
        if evicted > 0 {
            debug!(evicted, "Expired tokens swept");
        }
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("token cache poisoned").records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn consume_is_single_use() {
        let cache = TokenCache::new(Duration::from_secs(60));
        cache.issue("alice", "tok".into(), 42);

        assert_eq!(cache.consume("alice", "tok"), Some(42));
        assert_eq!(cache.consume("alice", "tok"), None);
    }

    #[test]
    fn mismatch_burns_pending_token() {
        let cache = TokenCache::new(Duration::from_secs(60));
        cache.issue("alice", "tok".into(), 1);

        assert_eq!(cache.consume("alice", "wrong"), None);
        // The correct token no longer works either.
        assert_eq!(cache.consume("alice", "tok"), None);
    }

    #[test]
    fn reissue_invalidates_prior_token() {
        let cache = TokenCache::new(Duration::from_secs(60));
        cache.issue("alice", "first".into(), 1);
        cache.issue("alice", "second".into(), 2);

        assert_eq!(cache.consume("alice", "first"), None);
        assert_eq!(cache.consume("alice", "second"), None); // burned above
    }

    #[test]
    fn sweep_evicts_expired() {
        let cache = TokenCache::new(Duration::from_millis(10));
        cache.issue("alice", "tok".into(), 1);
        thread::sleep(Duration::from_millis(20));

        cache.sweep();
        assert!(cache.is_empty());
        assert_eq!(cache.consume("alice", "tok"), None);
    }

    #[test]
    fn sweep_stops_at_first_unexpired() {
        let cache = TokenCache::new(Duration::from_millis(30));
        cache.issue("old", "a".into(), 1);
        thread::sleep(Duration::from_millis(40));
        cache.issue("new", "b".into(), 2);

        cache.sweep();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.consume("new", "b"), Some(2));
    }

    #[test]
    fn sweep_spares_superseding_record() {
        let cache = TokenCache::new(Duration::from_millis(20));
        cache.issue("alice", "stale".into(), 1);
        thread::sleep(Duration::from_millis(30));
        // Reissue after the first entry expired; the stale queue slot must not
        // take the fresh record with it.
        cache.issue("alice", "fresh".into(), 2);

        cache.sweep();
        assert_eq!(cache.consume("alice", "fresh"), Some(2));
    }
}
