use crate::crypto::errors::{CryptoResult, Error};
use crate::crypto::rsa::RsaPublicKey;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use openssl::x509::X509;
use x509_parser::parse_x509_certificate;

/// An X.509 certificate carrying an RSA public key
#[derive(Debug, Clone)]
pub struct Certificate {
    x509: X509,
    der: Vec<u8>,
}

impl Certificate {
    pub fn from_pem(pem: impl AsRef<[u8]>) -> CryptoResult<Self> {
        let x509 = X509::from_pem(pem.as_ref())?;
        let der = x509.to_der()?;
        Ok(Self { x509, der })
    }

    /// Parse and validate a DER certificate
    pub fn from_der(der: impl AsRef<[u8]>) -> CryptoResult<Self> {
        let der = der.as_ref();
        let (rest, _) =
            parse_x509_certificate(der).map_err(|e| Error::Certificate(e.to_string()))?;
        if !rest.is_empty() {
            return Err(Error::Certificate(
                "trailing data after certificate".to_string(),
            ));
        }
        let x509 = X509::from_der(der)?;
        Ok(Self {
            x509,
            der: der.to_vec(),
        })
    }

    /// Parse the base64 text of a `ds:X509Certificate` element
    pub fn from_base64(text: &str) -> CryptoResult<Self> {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        Self::from_der(BASE64.decode(compact)?)
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.der)
    }

    /// RFC 4514 rendering of the subject name
    pub fn subject(&self) -> CryptoResult<String> {
        let (_, cert) =
            parse_x509_certificate(&self.der).map_err(|e| Error::Certificate(e.to_string()))?;
        Ok(cert.subject().to_string())
    }

    /// Whether the current time is inside the validity period
    pub fn is_current(&self) -> CryptoResult<bool> {
        let (_, cert) =
            parse_x509_certificate(&self.der).map_err(|e| Error::Certificate(e.to_string()))?;
        Ok(cert.validity().is_valid())
    }

    pub fn public_key(&self) -> CryptoResult<RsaPublicKey> {
        RsaPublicKey::from_pkey(self.x509.public_key()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::rsa::RsaPrivateKey;

    const SP_CERT: &[u8] = include_bytes!("../../test_data/sts/sp.crt");
    const SP_KEY: &[u8] = include_bytes!("../../test_data/sts/sp.key");

    #[test]
    fn test_pem_and_base64_agree() {
        let cert = Certificate::from_pem(SP_CERT).unwrap();
        let reparsed = Certificate::from_base64(&cert.to_base64()).unwrap();
        assert_eq!(cert.der(), reparsed.der());
        assert!(cert.subject().unwrap().contains("CN=sp.example.org"));
        assert!(cert.is_current().unwrap());
    }

    #[test]
    fn test_public_key_matches_private_key() {
        let cert = Certificate::from_pem(SP_CERT).unwrap();
        let private_key = RsaPrivateKey::from_pem(SP_KEY).unwrap();
        assert_eq!(
            cert.public_key().unwrap().to_der().unwrap(),
            private_key.public_key().unwrap().to_der().unwrap()
        );
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(Certificate::from_base64("AAAA").is_err());
        assert!(Certificate::from_base64("not base64 at all!").is_err());
    }
}
