use crate::crypto::HashAlg;
use crate::crypto::errors::{CryptoResult, Error};
use openssl::bn::BigNum;
use openssl::pkey::{PKey, Private, Public};
use openssl::rsa::{Padding, Rsa};
use openssl::sign::{Signer, Verifier};

const RSA_OAEP_URI: &str = "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p";
const RSA_V15_URI: &str = "http://www.w3.org/2001/04/xmlenc#rsa-1_5";

/// Key transport algorithms for wrapping symmetric keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyWrap {
    /// RSA-OAEP with MGF1 and SHA-1
    #[default]
    RsaOaep,
    /// RSA PKCS#1 v1.5
    RsaV15,
}

impl KeyWrap {
    pub fn uri(self) -> &'static str {
        match self {
            KeyWrap::RsaOaep => RSA_OAEP_URI,
            KeyWrap::RsaV15 => RSA_V15_URI,
        }
    }

    pub fn from_uri(uri: &str) -> CryptoResult<Self> {
        match uri {
            RSA_OAEP_URI => Ok(KeyWrap::RsaOaep),
            RSA_V15_URI => Ok(KeyWrap::RsaV15),
            other => Err(Error::UnsupportedAlgorithm(other.to_string())),
        }
    }

    fn padding(self) -> Padding {
        match self {
            KeyWrap::RsaOaep => Padding::PKCS1_OAEP,
            KeyWrap::RsaV15 => Padding::PKCS1,
        }
    }
}

/// RSA private key wrapper
#[derive(Debug, Clone)]
pub struct RsaPrivateKey {
    key: PKey<Private>,
}

impl RsaPrivateKey {
    /// Generate a new RSA private key
    pub fn generate(bits: u32) -> CryptoResult<Self> {
        let rsa = Rsa::generate(bits)?;
        let key = PKey::from_rsa(rsa)?;
        Ok(Self { key })
    }

    /// Load from PEM-encoded PKCS#1/PKCS#8.
    pub fn from_pem(pem_bytes: impl AsRef<[u8]>) -> CryptoResult<Self> {
        let key = PKey::private_key_from_pem(pem_bytes.as_ref())?;
        Self::from_pkey(key)
    }

    fn from_pkey(key: PKey<Private>) -> CryptoResult<Self> {
        // Rejects EC and other non-RSA keys early
        key.rsa()?;
        Ok(Self { key })
    }

    /// Get the corresponding public key
    pub fn public_key(&self) -> CryptoResult<RsaPublicKey> {
        let key = PKey::public_key_from_der(&self.key.public_key_to_der()?)?;
        Ok(RsaPublicKey { key })
    }

    /// Size of the modulus in bits
    pub fn bits(&self) -> u32 {
        self.key.bits()
    }

    /// Recover a symmetric key wrapped for this key
    pub fn unwrap_key(&self, wrapped: &[u8], algorithm: KeyWrap) -> CryptoResult<Vec<u8>> {
        let rsa = self.key.rsa()?;
        let mut buf = vec![0u8; rsa.size() as usize];
        let len = rsa.private_decrypt(wrapped, &mut buf, algorithm.padding())?;
        buf.truncate(len);
        Ok(buf)
    }

    /// Sign data with RSA PKCS#1 v1.5 over the given digest
    pub fn sign(&self, data: impl AsRef<[u8]>, hash_alg: HashAlg) -> CryptoResult<Vec<u8>> {
        let mut signer = Signer::new((&hash_alg).into(), &self.key)?;
        signer.update(data.as_ref())?;
        Ok(signer.sign_to_vec()?)
    }
}

/// RSA public key wrapper
#[derive(Debug, Clone)]
pub struct RsaPublicKey {
    key: PKey<Public>,
}

impl RsaPublicKey {
    /// Load from a PEM-encoded SubjectPublicKeyInfo.
    pub fn from_pem(pem_bytes: impl AsRef<[u8]>) -> CryptoResult<Self> {
        let key = PKey::public_key_from_pem(pem_bytes.as_ref())?;
        Self::from_pkey(key)
    }

    /// Build a key from the big-endian modulus and exponent of an `RSAKeyValue`
    pub fn from_components(modulus: &[u8], exponent: &[u8]) -> CryptoResult<Self> {
        if modulus.is_empty() || exponent.is_empty() {
            return Err(Error::Invalid("empty RSA key component".to_string()));
        }
        let rsa = Rsa::from_public_components(
            BigNum::from_slice(modulus)?,
            BigNum::from_slice(exponent)?,
        )?;
        Ok(Self {
            key: PKey::from_rsa(rsa)?,
        })
    }

    pub(crate) fn from_pkey(key: PKey<Public>) -> CryptoResult<Self> {
        key.rsa()?;
        Ok(Self { key })
    }

    /// Export key in SubjectPublicKeyInfo DER format
    pub fn to_der(&self) -> CryptoResult<Vec<u8>> {
        Ok(self.key.public_key_to_der()?)
    }

    /// Big-endian modulus and public exponent
    pub fn components(&self) -> CryptoResult<(Vec<u8>, Vec<u8>)> {
        let rsa = self.key.rsa()?;
        Ok((rsa.n().to_vec(), rsa.e().to_vec()))
    }

    /// Size of the modulus in bits
    pub fn bits(&self) -> u32 {
        self.key.bits()
    }

    /// Encrypt a symmetric key so only the holder of the private key can read it
    pub fn wrap_key(&self, key: &[u8], algorithm: KeyWrap) -> CryptoResult<Vec<u8>> {
        let rsa = self.key.rsa()?;
        let mut buf = vec![0u8; rsa.size() as usize];
        let len = rsa.public_encrypt(key, &mut buf, algorithm.padding())?;
        buf.truncate(len);
        Ok(buf)
    }

    /// Verify an RSA PKCS#1 v1.5 signature
    pub fn verify(
        &self,
        data: impl AsRef<[u8]>,
        signature: &[u8],
        hash_alg: HashAlg,
    ) -> CryptoResult<bool> {
        let mut verifier = Verifier::new((&hash_alg).into(), &self.key)?;
        verifier.update(data.as_ref())?;
        Ok(verifier.verify(signature)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STS_KEY: &[u8] = include_bytes!("../../test_data/sts/sts.key");

    #[test]
    fn test_rsa_sign_verify() {
        let private_key = RsaPrivateKey::from_pem(STS_KEY).unwrap();
        let public_key = private_key.public_key().unwrap();
        let data = b"test data";

        let signature = private_key.sign(data, HashAlg::Sha256).unwrap();
        assert!(public_key.verify(data, &signature, HashAlg::Sha256).unwrap());
        assert!(!public_key.verify(b"wrong data", &signature, HashAlg::Sha256).unwrap());
    }

    #[test]
    fn test_cross_key_verification_fails() {
        let key1 = RsaPrivateKey::generate(2048).unwrap();
        let key2 = RsaPrivateKey::generate(2048).unwrap();
        let signature = key1.sign(b"test data", HashAlg::Sha256).unwrap();
        let is_valid = key2
            .public_key()
            .unwrap()
            .verify(b"test data", &signature, HashAlg::Sha256)
            .unwrap();
        assert!(!is_valid);
    }

    #[test]
    fn test_key_wrap_both_paddings() {
        let private_key = RsaPrivateKey::from_pem(STS_KEY).unwrap();
        let public_key = private_key.public_key().unwrap();
        let secret = [7u8; 16];

        for algorithm in [KeyWrap::RsaOaep, KeyWrap::RsaV15] {
            let wrapped = public_key.wrap_key(&secret, algorithm).unwrap();
            assert_eq!(wrapped.len(), 256);
            assert_eq!(private_key.unwrap_key(&wrapped, algorithm).unwrap(), secret);
        }
    }

    #[test]
    fn test_components_roundtrip() {
        let public_key = RsaPrivateKey::from_pem(STS_KEY).unwrap().public_key().unwrap();
        let (n, e) = public_key.components().unwrap();
        let rebuilt = RsaPublicKey::from_components(&n, &e).unwrap();
        assert_eq!(rebuilt.to_der().unwrap(), public_key.to_der().unwrap());
        assert_eq!(rebuilt.bits(), 2048);
        assert!(RsaPublicKey::from_components(&[], &e).is_err());
    }

    #[test]
    fn test_key_wrap_uri() {
        assert_eq!(KeyWrap::from_uri(RSA_V15_URI).unwrap(), KeyWrap::RsaV15);
        assert_eq!(KeyWrap::default().uri(), RSA_OAEP_URI);
        assert!(KeyWrap::from_uri("urn:unknown").is_err());
    }
}
