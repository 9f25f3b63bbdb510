//! # Stores
//!
//! The credential cache owned by this crate, and the seam to the external
//! account repository.

pub mod account;
pub mod token_cache;

pub use account::{Account, AccountStore, MemoryAccountStore};
pub use token_cache::TokenCache;
