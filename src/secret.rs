//! Opaque one-time token generation and hashing.
//!
//! Tokens minted here ride in verification and reset links and are never
//! persisted in plaintext; the store only ever sees the SHA-256 digest.
//! Expiry is tracked separately by the caller; a token by itself is just
//! random bytes.

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Bytes of randomness per token (256 bits before encoding).
const TOKEN_BYTES: usize = 32;

/// Generate a URL-safe opaque token.
///
/// The returned string is only ever sent to the user out-of-band; callers
/// store [`hash_token`] of it.
pub fn generate_token() -> Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate token")?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Digest a token for storage or lookup.
#[must_use]
pub fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Recompute the digest of `candidate` and compare it against `stored_hash`
/// in constant time.
#[must_use]
pub fn verify_token(candidate: &str, stored_hash: &[u8]) -> bool {
    hashes_match(&hash_token(candidate), stored_hash)
}

/// Constant-time equality for two stored digests.
#[must_use]
pub fn hashes_match(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
