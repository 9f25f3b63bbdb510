//! # Sessions
//!
//! The two session kinds on either side of authentication: the ephemeral
//! visitor handling the handshake, and the persistent per-account player.

pub mod player;
pub mod registry;
pub mod services;
pub mod visitor;

pub use player::Player;
pub use registry::PlayerRegistry;
pub use services::GateServices;
pub use visitor::{Visitor, VisitorPool};
