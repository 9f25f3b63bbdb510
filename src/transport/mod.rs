//! # Transport Layer
//!
//! Socket-facing machinery: the accept loop with admission control and the
//! per-connection reader/writer task pair.

pub mod acceptor;
pub mod connection;

pub use acceptor::{Acceptor, AdmissionPermit, IpPermit, IpTable};
pub use connection::{system_notice, Connection};
