use crate::crypto::errors::CryptoResult;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use secrecy::{ExposeSecret, SecretSlice};

/// Secure wrapper for key material that zeroizes on drop
#[derive(Debug, Clone, Default)]
pub struct SecureBytes(SecretSlice<u8>);

impl SecureBytes {
    /// Create new SecureBytes
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self(SecretSlice::new(data.into().into()))
    }

    /// Create from hex string
    pub fn from_hex(hex_str: &str) -> CryptoResult<Self> {
        let data = hex::decode(hex_str)?;
        Ok(Self::new(data))
    }

    /// Expose the secret data
    pub fn expose_secret(&self) -> &[u8] {
        self.0.expose_secret()
    }

    /// Get the length of the data
    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    /// Check if the data is empty
    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    /// Returns the hex representation of the data
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.expose_secret())
    }

    /// Returns the base64 representation used on the wire
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0.expose_secret())
    }
}

impl From<&[u8]> for SecureBytes {
    fn from(value: &[u8]) -> Self {
        Self::new(value)
    }
}

impl From<Vec<u8>> for SecureBytes {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_bytes() {
        let data = vec![1, 2, 3, 4, 5];
        let secure = SecureBytes::new(&*data);
        assert_eq!(secure.len(), 5);
        assert_eq!(secure.expose_secret(), &data);

        let hex_str = secure.to_hex();
        let recovered = SecureBytes::from_hex(&hex_str).unwrap();
        assert_eq!(recovered.expose_secret(), secure.expose_secret());
        assert_eq!(secure.to_base64(), "AQIDBAU=");
    }

    #[test]
    fn test_debug_does_not_leak() {
        let secure = SecureBytes::from(vec![0xAB; 4]);
        assert!(!format!("{secure:?}").contains("171"));
    }
}
