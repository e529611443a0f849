mod cert;
mod errors;
mod keys;
pub mod psha1;
pub mod rsa;
pub mod sym;
mod utils;

pub use cert::Certificate;
pub use errors::Error;
pub use keys::SecureBytes;
pub use utils::*;

use errors::CryptoResult;
use openssl::hash::{Hasher, MessageDigest as Digest};
use std::fmt;

const SHA1_URI: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
const SHA256_URI: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

/// Digest algorithms used by XML signatures and key derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlg {
    /// SHA-1
    Sha1,
    /// SHA-256
    Sha256,
}

impl HashAlg {
    /// Hash the given data with this hash algorithm
    pub fn hash(&self, data: impl AsRef<[u8]>) -> CryptoResult<Vec<u8>> {
        let mut hasher = Hasher::new(self.into())?;
        hasher.update(data.as_ref())?;
        Ok(hasher.finish()?.to_vec())
    }

    /// Get the output size in bytes
    pub fn output_size(self) -> usize {
        match self {
            HashAlg::Sha1 => 20,
            HashAlg::Sha256 => 32,
        }
    }

    /// The XML-DSig `DigestMethod` URI of this algorithm
    pub fn uri(self) -> &'static str {
        match self {
            HashAlg::Sha1 => SHA1_URI,
            HashAlg::Sha256 => SHA256_URI,
        }
    }

    pub fn from_uri(uri: &str) -> Result<Self, Error> {
        match uri {
            SHA1_URI => Ok(HashAlg::Sha1),
            SHA256_URI => Ok(HashAlg::Sha256),
            other => Err(Error::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl From<&HashAlg> for Digest {
    fn from(hash_alg: &HashAlg) -> Self {
        match hash_alg {
            HashAlg::Sha1 => Digest::sha1(),
            HashAlg::Sha256 => Digest::sha256(),
        }
    }
}

impl fmt::Display for HashAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HashAlg::Sha1 => "SHA-1",
            HashAlg::Sha256 => "SHA-256",
        };
        write!(f, "{name}")
    }
}
