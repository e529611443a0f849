//! The `P_SHA-1` pseudo-random function of TLS 1.0 (RFC 2246, section 5),
//! used by WS-Trust to combine client and server entropy into a proof key.

use crate::crypto::errors::CryptoResult;
use crate::crypto::keys::SecureBytes;
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::sign::Signer;

const SHA1_OUTPUT: usize = 20;

/// Expands `secret` and `seed` into `size` bytes of key material.
///
/// ```text
/// A(0) = seed
/// A(i) = HMAC_SHA1(secret, A(i-1))
/// P_SHA1(secret, seed) = HMAC_SHA1(secret, A(1) + seed) + HMAC_SHA1(secret, A(2) + seed) + ...
/// ```
pub fn p_sha1(secret: &[u8], seed: &[u8], size: usize) -> CryptoResult<SecureBytes> {
    let key = PKey::hmac(secret)?;
    let hmac = |parts: &[&[u8]]| -> CryptoResult<Vec<u8>> {
        let mut signer = Signer::new(MessageDigest::sha1(), &key)?;
        for part in parts {
            signer.update(part)?;
        }
        Ok(signer.sign_to_vec()?)
    };

    let mut output = Vec::with_capacity(size + SHA1_OUTPUT);
    let mut a = seed.to_vec();
    while output.len() < size {
        a = hmac(&[&a])?;
        output.extend(hmac(&[&a, seed])?);
    }
    output.truncate(size);
    Ok(SecureBytes::new(output))
}
