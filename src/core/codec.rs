//! # Enciphered Frame Codec
//!
//! [`GateCodec`] implements `tokio_util`'s [`Decoder`]/[`Encoder`] over the
//! rolling-key cipher and the frame layout, yielding decrypted [`PacketIn`]s
//! and consuming [`PacketOut`]s.
//!
//! Because every byte on the wire is enciphered, the decoder cannot look for
//! the plaintext marker. Instead it predicts what the encrypted marker bytes
//! must be under the current receive key, scans the buffered bytes for that
//! two-byte pattern, peeks the enciphered length field through the same
//! recurrence, and defers until the whole declared frame is buffered. Garbage
//! ahead of a match is discarded.
//!
//! The decoder never re-validates the checksum; a mismatch is logged at debug
//! level and the frame is delivered anyway.

use crate::core::cipher::CipherState;
use crate::core::frame::{self, HEADER_LEN, MARKER_BYTES};
use crate::core::packet::{PacketIn, PacketOut};
use crate::error::{constants, GateError};
use crate::utils::buffer_pool::BufferPool;
use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

pub struct GateCodec {
    recv: CipherState,
    send: CipherState,
    pool: BufferPool,
}

impl GateCodec {
    /// Both directions start from the well-known default key.
    pub fn new(pool: BufferPool) -> Self {
        Self {
            recv: CipherState::default(),
            send: CipherState::default(),
            pool,
        }
    }

    /// Re-key both directions with the session key negotiated by the
    /// handshake. Called exactly once per connection, on login success.
    pub fn set_key(&mut self, key: [u8; 8]) {
        self.recv.set_key(key);
        self.send.set_key(key);
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }
}

impl Decoder for GateCodec {
    type Item = PacketIn;
    type Error = GateError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<PacketIn>, GateError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let prelude = self.recv.peek_prelude(MARKER_BYTES);
        let scan_limit = src.len() - HEADER_LEN;
        let start = (0..=scan_limit).find(|&i| src[i] == prelude[0] && src[i + 1] == prelude[1]);

        let Some(start) = start else {
            // Every scanned position failed; drop them and wait for more bytes.
            src.advance(scan_limit + 1);
            return Ok(None);
        };

        if start > 0 {
            debug!(skipped = start, "Discarded bytes ahead of frame marker");
            src.advance(start);
        }

        let declared = self.recv.peek_length(prelude, src[2], src[3]) as usize;
        if declared < HEADER_LEN {
            return Err(GateError::Protocol(constants::ERR_FRAME_TOO_SHORT.into()));
        }
        if src.len() < declared {
            src.reserve(declared - src.len());
            return Ok(None);
        }

        let frame_bytes = src.split_to(declared);
        let mut buf = self.pool.acquire();
        buf.extend_from_slice(&frame_bytes);
        self.recv.decrypt(&mut buf);

        let packet = PacketIn::from_frame(buf);
        let computed = packet.computed_checksum();
        if packet.wire_checksum() != computed {
            debug!(
                pid = packet.pid(),
                wire = packet.wire_checksum(),
                computed,
                "Frame checksum mismatch (non-fatal)"
            );
        }
        Ok(Some(packet))
    }
}

impl Encoder<PacketOut> for GateCodec {
    type Error = GateError;

    fn encode(&mut self, item: PacketOut, dst: &mut BytesMut) -> Result<(), GateError> {
        let start = dst.len();
        item.encode_into(dst);
        self.send.encrypt(&mut dst[start..]);
        Ok(())
    }
}
