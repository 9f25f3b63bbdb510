//! # Account Store Seam
//!
//! The persistent account repository is an external collaborator; the gate
//! only needs lookup by name, save, and index bootstrap. [`AccountStore`] is
//! that seam, and [`MemoryAccountStore`] backs tests and standalone runs.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::SystemTime;

/// One account record as the gate sees it.
#[derive(Debug, Clone)]
pub struct Account {
    pub name: String,
    pub password: String,
    /// Identifier assigned by the surrounding platform; doubles as the role id
    /// for password-path logins that never went through role selection.
    pub external_id: i32,
    pub registered_at: SystemTime,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<Account>>;
    async fn save(&self, account: Account) -> Result<()>;
    async fn ensure_indexes(&self) -> Result<()>;
}

/// In-memory store keyed by account name.
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<HashMap<String, Account>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get(&self, name: &str) -> Result<Option<Account>> {
        Ok(self
            .accounts
            .read()
            .expect("account store poisoned")
            .get(name)
            .cloned())
    }

    async fn save(&self, account: Account) -> Result<()> {
        self.accounts
            .write()
            .expect("account store poisoned")
            .insert(account.name.clone(), account);
        Ok(())
    }

    async fn ensure_indexes(&self) -> Result<()> {
        // The map is its own index.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_and_get() {
        let store = MemoryAccountStore::new();
        store
            .save(Account {
                name: "alice".into(),
                password: "secret".into(),
                external_id: 42,
                registered_at: SystemTime::now(),
            })
            .await
            .unwrap();

        let found = store.get("alice").await.unwrap().expect("account exists");
        assert_eq!(found.password, "secret");
        assert_eq!(found.external_id, 42);
        assert!(store.get("bob").await.unwrap().is_none());
    }
}
