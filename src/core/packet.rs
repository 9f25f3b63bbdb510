//! # Packet Views
//!
//! [`PacketIn`] is a read cursor over one received, already-decrypted frame;
//! [`PacketOut`] accumulates an outbound payload and frames it at encode time.
//!
//! Both own their bytes through a [`PooledBuffer`], so releasing a packet's
//! backing storage is the drop of the packet itself — there is no release call
//! to forget on an error path.
//!
//! Field encoding follows the wire convention throughout: big-endian integers,
//! strings as a u16 length prefix followed by UTF-8 bytes.

use crate::core::frame::{self, HEADER_LEN};
use crate::error::{GateError, Result};
use crate::utils::buffer_pool::{BufferPool, PooledBuffer};
use bytes::BufMut;

/// A received frame with a read position walking its body.
pub struct PacketIn {
    buf: PooledBuffer,
    pos: usize,
}

impl PacketIn {
    /// Wrap a full decrypted frame (header included). The read position starts
    /// at the first body byte.
    pub(crate) fn from_frame(buf: PooledBuffer) -> Self {
        debug_assert!(buf.len() >= HEADER_LEN);
        Self {
            buf,
            pos: HEADER_LEN,
        }
    }

    /// Build a packet from raw frame bytes, for tests and loopback paths.
    pub fn from_bytes(pool: &BufferPool, frame: &[u8]) -> Self {
        let mut buf = pool.acquire();
        buf.extend_from_slice(frame);
        Self::from_frame(buf)
    }

    pub fn pid(&self) -> u16 {
        u16::from_be_bytes([self.buf[6], self.buf[7]])
    }

    pub fn client_id(&self) -> i32 {
        i32::from_be_bytes([self.buf[8], self.buf[9], self.buf[10], self.buf[11]])
    }

    pub fn ext1(&self) -> i32 {
        i32::from_be_bytes([self.buf[12], self.buf[13], self.buf[14], self.buf[15]])
    }

    pub fn ext2(&self) -> i32 {
        i32::from_be_bytes([self.buf[16], self.buf[17], self.buf[18], self.buf[19]])
    }

    /// Declared frame length from the envelope.
    pub fn declared_len(&self) -> u16 {
        u16::from_be_bytes([self.buf[2], self.buf[3]])
    }

    /// Checksum as transmitted.
    pub fn wire_checksum(&self) -> u16 {
        u16::from_be_bytes([self.buf[4], self.buf[5]])
    }

    /// Recompute the checksum over the received payload.
    pub fn computed_checksum(&self) -> u16 {
        frame::checksum(&self.buf[frame::ENVELOPE_LEN..])
    }

    /// Bytes left after the read position.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize) -> Result<&[u8]> {
        if self.pos + n > self.buf.len() {
            return Err(GateError::PacketBounds(self.pos));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        let b = self.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let b = self.take(8)?;
        Ok(i64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Length-prefixed UTF-8 string.
    pub fn read_utf(&mut self) -> Result<String> {
        let len = self.read_i16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| GateError::Protocol("Invalid UTF-8 in string field".into()))
    }

    /// All bytes from the read position to the end of the frame.
    pub fn read_rest(&mut self) -> &[u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }
}

/// An outbound payload under construction.
///
/// The pid, client id, and extension fields are laid down at rent time; body
/// writes append after them. Framing (envelope, checksum) happens when the
/// codec encodes the packet.
pub struct PacketOut {
    buf: PooledBuffer,
}

impl PacketOut {
    pub fn new(pool: &BufferPool, pid: u16) -> Self {
        Self::with_ids(pool, pid, 0, 0, 0)
    }

    pub fn with_ids(pool: &BufferPool, pid: u16, client_id: i32, ext1: i32, ext2: i32) -> Self {
        let mut buf = pool.acquire();
        buf.put_u16(pid);
        buf.put_i32(client_id);
        buf.put_i32(ext1);
        buf.put_i32(ext2);
        Self { buf }
    }

    pub fn pid(&self) -> u16 {
        u16::from_be_bytes([self.buf[0], self.buf[1]])
    }

    /// Frame length this packet will declare: envelope plus payload.
    pub fn frame_len(&self) -> usize {
        frame::ENVELOPE_LEN + self.buf.len()
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.put_u8(v as u8);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn write_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    pub fn write_i16(&mut self, v: i16) {
        self.buf.put_i16(v);
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    /// Length-prefixed UTF-8 string.
    pub fn write_utf(&mut self, v: &str) {
        self.buf.put_i16(v.len() as i16);
        self.buf.extend_from_slice(v.as_bytes());
    }

    /// Append the plaintext frame (envelope + payload) to `dst`.
    pub(crate) fn encode_into(&self, dst: &mut bytes::BytesMut) {
        dst.reserve(self.frame_len());
        dst.put_slice(&frame::MARKER_BYTES);
        dst.put_u16(self.frame_len() as u16);
        dst.put_u16(frame::checksum(&self.buf));
        dst.put_slice(&self.buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn header_fields_round_trip() {
        let pool = BufferPool::new(4);
        let mut out = PacketOut::with_ids(&pool, 42, 7, -1, 99);
        out.write_utf("hello");

        let mut dst = BytesMut::new();
        out.encode_into(&mut dst);

        let pkt = PacketIn::from_bytes(&pool, &dst);
        assert_eq!(pkt.pid(), 42);
        assert_eq!(pkt.client_id(), 7);
        assert_eq!(pkt.ext1(), -1);
        assert_eq!(pkt.ext2(), 99);
        assert_eq!(pkt.declared_len() as usize, dst.len());
        assert_eq!(pkt.wire_checksum(), pkt.computed_checksum());
    }

    #[test]
    fn declared_length_is_payload_plus_envelope() {
        let pool = BufferPool::new(4);
        let mut out = PacketOut::new(&pool, 1);
        out.write_bytes(&[0xAA; 37]);
        // payload = pid/client/ext fields (14) + 37 body bytes
        assert_eq!(out.frame_len(), 6 + 14 + 37);
    }

    #[test]
    fn body_reads_in_write_order() {
        let pool = BufferPool::new(4);
        let mut out = PacketOut::new(&pool, 9);
        out.write_bool(true);
        out.write_i16(300);
        out.write_i32(123_456);
        out.write_utf("account");
        out.write_i64(-5);

        let mut dst = BytesMut::new();
        out.encode_into(&mut dst);

        let mut pkt = PacketIn::from_bytes(&pool, &dst);
        assert!(pkt.read_bool().unwrap());
        pkt.skip(2).unwrap();
        assert_eq!(pkt.read_i32().unwrap(), 123_456);
        assert_eq!(pkt.read_utf().unwrap(), "account");
        assert_eq!(pkt.read_i64().unwrap(), -5);
        assert_eq!(pkt.remaining(), 0);
    }

    #[test]
    fn out_of_range_read_is_an_error() {
        let pool = BufferPool::new(4);
        let out = PacketOut::new(&pool, 1);
        let mut dst = BytesMut::new();
        out.encode_into(&mut dst);

        let mut pkt = PacketIn::from_bytes(&pool, &dst);
        assert!(matches!(pkt.read_i32(), Err(GateError::PacketBounds(_))));
    }

    #[test]
    fn buffers_return_to_pool_on_drop() {
        let pool = BufferPool::new(2);
        let before = pool.available();
        {
            let _p = PacketOut::new(&pool, 1);
            assert_eq!(pool.available(), before - 1);
        }
        assert_eq!(pool.available(), before);
    }
}
