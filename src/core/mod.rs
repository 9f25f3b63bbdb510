//! # Core Wire Components
//!
//! Low-level frame handling: the rolling-key cipher, the frame layout, the
//! tokio codec tying them together, and the pooled packet views.
//!
//! ## Wire Format
//! ```text
//! [Marker(2)] [Length(2)] [Checksum(2)] [Pid(2)] [Client(4)] [Ext1(4)] [Ext2(4)] [Body(N)]
//! ```
//!
//! The entire frame, header included, is passed through the stream cipher in
//! transmission order; framing therefore depends on the cumulative traffic
//! history of the connection direction.

pub mod cipher;
pub mod codec;
pub mod frame;
pub mod packet;

pub use cipher::{CipherState, DEFAULT_KEY};
pub use codec::GateCodec;
pub use packet::{PacketIn, PacketOut};
