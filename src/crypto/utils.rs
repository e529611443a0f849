use crate::crypto::errors::{CryptoResult, Error};
use rand::{TryRngCore, rngs::OsRng};

/// Generate cryptographically secure random bytes
pub fn generate_random_bytes(length: usize) -> CryptoResult<Vec<u8>> {
    let mut buf = vec![0u8; length];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| Error::Random(e.to_string()))?;
    Ok(buf)
}
