//! # Rolling-Key Stream Cipher
//!
//! Legacy wire cipher carried for client compatibility. An 8-byte key array
//! is mutated per byte position using the previous ciphertext byte, so the
//! keystream of every frame depends on the cumulative traffic history of its
//! direction. This is not a modern cipher and is not presented as one; it is
//! a wire-compatibility requirement.
//!
//! Two independent states exist per connection: one for the send direction,
//! one for receive. Each state is exclusively owned by its reader or writer
//! task and must never be copied or reset after connection establishment,
//! except for the single key swap performed when a login succeeds.

/// Key both directions start from before the handshake negotiates a session key.
pub const DEFAULT_KEY: [u8; 8] = [174, 191, 86, 120, 171, 205, 239, 241];

/// One direction's cipher state: the 8-byte rolling key.
///
/// The per-frame `prev` byte and position counter restart at zero for every
/// frame, but the key array carries forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherState {
    key: [u8; 8],
}

impl CipherState {
    pub fn new(key: [u8; 8]) -> Self {
        Self { key }
    }

    /// Replace the key, as done once after a successful handshake.
    pub fn set_key(&mut self, key: [u8; 8]) {
        self.key = key;
    }

    pub fn key(&self) -> &[u8; 8] {
        &self.key
    }

    /// Encrypt one whole frame in place.
    ///
    /// Position 0: `c[0] = p[0] ^ k[0]`. For `i >= 1` with `idx = i % 8`:
    /// `k[idx] = (k[idx] + prev) ^ i`, then `c[i] = (p[i] ^ k[idx]) + prev`,
    /// all arithmetic byte-wrapping, `prev` tracking the ciphertext.
    pub fn encrypt(&mut self, buf: &mut [u8]) {
        if buf.is_empty() {
            return;
        }
        buf[0] ^= self.key[0];
        let mut prev = buf[0];
        for i in 1..buf.len() {
            let idx = i % 8;
            self.key[idx] = self.key[idx].wrapping_add(prev) ^ (i as u8);
            buf[i] = (buf[i] ^ self.key[idx]).wrapping_add(prev);
            prev = buf[i];
        }
    }

    /// Decrypt one whole frame in place.
    ///
    /// Inverse of [`encrypt`](Self::encrypt). The key update is driven by the
    /// ciphertext bytes, which both sides observe identically, so the two key
    /// arrays evolve in lockstep.
    pub fn decrypt(&mut self, buf: &mut [u8]) {
        if buf.is_empty() {
            return;
        }
        let mut prev = buf[0];
        buf[0] ^= self.key[0];
        for i in 1..buf.len() {
            let idx = i % 8;
            self.key[idx] = self.key[idx].wrapping_add(prev) ^ (i as u8);
            let cipher = buf[i];
            buf[i] = cipher.wrapping_sub(prev) ^ self.key[idx];
            prev = cipher;
        }
    }

    /// Predict the first four ciphertext bytes of the next frame without
    /// consuming any state.
    ///
    /// Because the plaintext marker is fixed, the encrypted marker under the
    /// current key is deterministic; the de-framing scanner matches on it and
    /// then peeks the length field through the same recurrence. `c2`/`c3` are
    /// the observed third and fourth ciphertext bytes of a candidate frame.
    pub fn peek_prelude(&self, marker: [u8; 2]) -> [u8; 2] {
        let e0 = marker[0] ^ self.key[0];
        let k1 = self.key[1].wrapping_add(e0) ^ 1;
        let e1 = (marker[1] ^ k1).wrapping_add(e0);
        [e0, e1]
    }

    /// Decrypt the big-endian length field from ciphertext bytes 2 and 3,
    /// given the two (already predicted) prelude bytes. Does not mutate state.
    pub fn peek_length(&self, prelude: [u8; 2], c2: u8, c3: u8) -> u16 {
        let [_, e1] = prelude;
        let k2 = self.key[2].wrapping_add(e1) ^ 2;
        let hi = c2.wrapping_sub(e1) ^ k2;
        let k3 = self.key[3].wrapping_add(c2) ^ 3;
        let lo = c3.wrapping_sub(c2) ^ k3;
        u16::from_be_bytes([hi, lo])
    }
}

impl Default for CipherState {
    fn default() -> Self {
        Self::new(DEFAULT_KEY)
    }
}
