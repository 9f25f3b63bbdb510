//! # Credential Unwrapping
//!
//! The login packet carries an RSA-encrypted blob (PKCS#1 v1.5, a legacy
//! client requirement). Two shapes are accepted:
//!
//! - **Direct** (game port): `[7 reserved bytes][8-byte cipher seed][utf8 "account,credential"]`
//! - **Token** (HTTP channel, base64-encoded ciphertext): `[7 reserved bytes][utf8 "account,webToken,tcpToken,displayName"]`
//!
//! The seal functions are the client-side counterparts, used by tests and
//! tooling to produce blobs the unwrapper accepts.

use crate::error::{constants, GateError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use tracing::warn;

const RESERVED_LEN: usize = 7;
const SEED_LEN: usize = 8;

/// Credentials from the direct login shape.
#[derive(Debug)]
pub struct DirectCredentials {
    /// Seed for the connection's post-login cipher key.
    pub cipher_seed: [u8; 8],
    pub account: String,
    pub credential: String,
}

/// Credentials from the token-based login shape.
#[derive(Debug)]
pub struct TokenCredentials {
    pub account: String,
    pub web_token: String,
    pub tcp_token: String,
    pub display_name: String,
}

/// Holds the server's RSA private key and unwraps login blobs with it.
pub struct CredentialUnwrapper {
    key: RsaPrivateKey,
}

impl CredentialUnwrapper {
    /// Parse key material from PEM, accepting PKCS#8 or PKCS#1 encodings.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|_| GateError::Credential(constants::ERR_KEY_MATERIAL.into()))?;
        Ok(Self { key })
    }

    /// Generate a fresh key pair, for tests and standalone runs without
    /// configured key material.
    pub fn generate() -> Result<Self> {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024)
            .map_err(|e| GateError::Credential(e.to_string()))?;
        Ok(Self { key })
    }

    /// The matching public key, for the client-side seal path.
    pub fn public_key(&self) -> RsaPublicKey {
        RsaPublicKey::from(&self.key)
    }

    /// Decrypt and parse the direct login shape.
    pub fn unwrap_direct(&self, blob: &[u8]) -> Result<DirectCredentials> {
        let plain = self.decrypt(blob)?;
        if plain.len() < RESERVED_LEN + SEED_LEN + 3 {
            return Err(GateError::Credential(constants::ERR_BLOB_TOO_SHORT.into()));
        }

        let mut cipher_seed = [0u8; 8];
        cipher_seed.copy_from_slice(&plain[RESERVED_LEN..RESERVED_LEN + SEED_LEN]);

        let text = std::str::from_utf8(&plain[RESERVED_LEN + SEED_LEN..])
            .map_err(|_| GateError::Credential(constants::ERR_BLOB_SHAPE.into()))?;
        let (account, credential) = text
            .split_once(',')
            .ok_or_else(|| GateError::Credential(constants::ERR_BLOB_SHAPE.into()))?;

        Ok(DirectCredentials {
            cipher_seed,
            account: account.to_string(),
            credential: credential.to_string(),
        })
    }

    /// Decode, decrypt, and parse the token-based shape.
    pub fn unwrap_token(&self, encoded: &str) -> Result<TokenCredentials> {
        let blob = BASE64
            .decode(encoded)
            .map_err(|_| GateError::Credential(constants::ERR_BLOB_SHAPE.into()))?;
        let plain = self.decrypt(&blob)?;
        if plain.len() < RESERVED_LEN {
            return Err(GateError::Credential(constants::ERR_BLOB_TOO_SHORT.into()));
        }

        let text = std::str::from_utf8(&plain[RESERVED_LEN..])
            .map_err(|_| GateError::Credential(constants::ERR_BLOB_SHAPE.into()))?;
        let fields: Vec<&str> = text.split(',').collect();
        if fields.len() != 4 {
            warn!(fields = fields.len(), "Token login blob has wrong field count");
            return Err(GateError::Credential(constants::ERR_BLOB_SHAPE.into()));
        }

        Ok(TokenCredentials {
            account: fields[0].to_string(),
            web_token: fields[1].to_string(),
            tcp_token: fields[2].to_string(),
            display_name: fields[3].to_string(),
        })
    }

    fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>> {
        self.key
            .decrypt(Pkcs1v15Encrypt, blob)
            .map_err(|_| GateError::Credential(constants::ERR_RSA_UNWRAP.into()))
    }
}

/// Client-side counterpart of [`CredentialUnwrapper::unwrap_direct`].
pub fn seal_direct(
    public: &RsaPublicKey,
    cipher_seed: [u8; 8],
    account: &str,
    credential: &str,
) -> Result<Vec<u8>> {
    let mut plain = vec![0u8; RESERVED_LEN];
    plain.extend_from_slice(&cipher_seed);
    plain.extend_from_slice(format!("{account},{credential}").as_bytes());
    public
        .encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, &plain)
        .map_err(|e| GateError::Credential(e.to_string()))
}

/// Client-side counterpart of [`CredentialUnwrapper::unwrap_token`].
pub fn seal_token(
    public: &RsaPublicKey,
    account: &str,
    web_token: &str,
    tcp_token: &str,
    display_name: &str,
) -> Result<String> {
    let mut plain = vec![0u8; RESERVED_LEN];
    plain.extend_from_slice(format!("{account},{web_token},{tcp_token},{display_name}").as_bytes());
    let blob = public
        .encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, &plain)
        .map_err(|e| GateError::Credential(e.to_string()))?;
    Ok(BASE64.encode(blob))
}
