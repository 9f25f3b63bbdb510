//! Random token material.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Generate a random alphanumeric bearer token of `len` characters.
///
/// Tokens are short-lived and single-use; entropy per character comes from the
/// thread-local CSPRNG.
pub fn token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
