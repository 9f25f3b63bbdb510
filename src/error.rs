//! # Error Types
//!
//! Comprehensive error handling for the gate.
//!
//! This module defines all error variants that can occur while admitting,
//! authenticating, and serving a connection, from low-level I/O errors to
//! protocol violations on the wire.
//!
//! ## Error Categories
//! - **I/O Errors**: socket failures, partial reads, torn writes
//! - **Protocol Errors**: bad frames, oversized declarations, wrong packet type
//! - **Credential Errors**: RSA unwrap failures, token mismatches
//! - **Resource Errors**: admission limits, exhausted queues
//!
//! All errors implement `std::error::Error` for interoperability. Nothing in
//! this taxonomy is process-fatal: the acceptor and every session recover
//! independently.

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
/// Static strings are borrowed, avoiding heap allocations for common error cases.
pub mod constants {
    /// Dispatcher-related error messages
    pub const ERR_DISPATCHER_WRITE_LOCK: &str = "Failed to acquire write lock on dispatcher";
    pub const ERR_DISPATCHER_READ_LOCK: &str = "Failed to acquire read lock on dispatcher";

    /// Frame validation errors
    pub const ERR_FRAME_TOO_SHORT: &str = "Declared frame length below header size";

    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";
    pub const ERR_LOGIN_TIMEOUT: &str = "No login packet before timeout";
    pub const ERR_SEND_QUEUE_CLOSED: &str = "Outbound queue closed";

    /// Credential errors
    pub const ERR_RSA_UNWRAP: &str = "RSA credential unwrap failed";
    pub const ERR_BLOB_TOO_SHORT: &str = "Decrypted login blob too short";
    pub const ERR_BLOB_SHAPE: &str = "Login blob does not match any accepted shape";
    pub const ERR_KEY_MATERIAL: &str = "RSA key material missing or unparseable";

    /// Admission errors
    pub const ERR_MAX_CONNECTIONS: &str = "Global connection limit reached";
    pub const ERR_IP_LIMIT: &str = "Per-IP connection limit reached";
}

/// Primary error type for all gate operations.
#[derive(Error, Debug)]
pub enum GateError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Login timed out")]
    LoginTimeout,

    #[error("Unsupported packet type during handshake: {0}")]
    UnexpectedPacket(u16),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Rejected by admission control: {0}")]
    Admission(&'static str),

    #[error("Packet read out of range at offset {0}")]
    PacketBounds(usize),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

/// Type alias for Results using GateError
pub type Result<T> = std::result::Result<T, GateError>;
