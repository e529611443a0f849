use crate::crypto::SecureBytes;
use crate::crypto::errors::{CryptoResult, Error};
use crate::crypto::utils::generate_random_bytes;
use openssl::symm::{Cipher as OpenSslCipher, Crypter, Mode};

const AES_BLOCK_SIZE: usize = 16;

/// Represents a symmetric cipher algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cipher {
    /// AES-128-CBC cipher
    Aes128Cbc,
    /// AES-256-CBC cipher
    Aes256Cbc,
}

impl Cipher {
    /// Get the key size of the cipher in bytes
    pub const fn key_size(self) -> usize {
        match self {
            Self::Aes128Cbc => 16,
            Self::Aes256Cbc => 32,
        }
    }

    /// Get the block size of the cipher in bytes.
    pub const fn block_size(self) -> usize {
        AES_BLOCK_SIZE
    }

    /// The XML-Encryption algorithm URI of this cipher
    pub const fn uri(self) -> &'static str {
        match self {
            Self::Aes128Cbc => "http://www.w3.org/2001/04/xmlenc#aes128-cbc",
            Self::Aes256Cbc => "http://www.w3.org/2001/04/xmlenc#aes256-cbc",
        }
    }

    /// Convert the cipher to an OpenSSL cipher
    pub fn to_openssl_cipher(self) -> OpenSslCipher {
        match self {
            Self::Aes128Cbc => OpenSslCipher::aes_128_cbc(),
            Self::Aes256Cbc => OpenSslCipher::aes_256_cbc(),
        }
    }
}

/// An AES encryptor producing XML-Encryption style cipher data,
/// where the IV is prepended to the ciphertext
#[derive(Debug, Clone)]
pub struct AesEncryptor {
    cipher: Cipher,
}

impl Default for AesEncryptor {
    fn default() -> Self {
        Self::new()
    }
}

impl AesEncryptor {
    /// Create a new AES encryptor.
    ///
    /// Uses AES-128-CBC by default. Could be overridden using [`with_cipher`].
    pub const fn new() -> Self {
        Self {
            cipher: Cipher::Aes128Cbc,
        }
    }

    /// Override the cipher used by this encryptor
    pub fn with_cipher(mut self, cipher: Cipher) -> Self {
        self.cipher = cipher;
        self
    }

    pub fn cipher(&self) -> Cipher {
        self.cipher
    }

    /// Generate a fresh content key of the cipher's size
    pub fn generate_key(&self) -> CryptoResult<SecureBytes> {
        Ok(SecureBytes::new(generate_random_bytes(self.cipher.key_size())?))
    }

    /// Encrypt with a random IV, returning `IV || ciphertext`
    pub fn encrypt(&self, key: &SecureBytes, plaintext: impl AsRef<[u8]>) -> CryptoResult<Vec<u8>> {
        self.check_key(key)?;
        let iv = generate_random_bytes(self.cipher.block_size())?;
        let plaintext = plaintext.as_ref();

        let mut encrypter = Crypter::new(
            self.cipher.to_openssl_cipher(),
            Mode::Encrypt,
            key.expose_secret(),
            Some(&iv),
        )?;
        encrypter.pad(true);

        let mut ciphertext = vec![0u8; plaintext.len() + self.cipher.block_size()];
        let mut count = encrypter.update(plaintext, &mut ciphertext)?;
        count += encrypter.finalize(&mut ciphertext[count..])?;
        ciphertext.truncate(count);

        let mut output = iv;
        output.extend(ciphertext);
        Ok(output)
    }

    /// Decrypt `IV || ciphertext` as produced by [`encrypt`](Self::encrypt)
    pub fn decrypt(&self, key: &SecureBytes, data: impl AsRef<[u8]>) -> CryptoResult<Vec<u8>> {
        self.check_key(key)?;
        let data = data.as_ref();
        let block = self.cipher.block_size();
        if data.len() < 2 * block || data.len() % block != 0 {
            return Err(Error::Invalid(format!(
                "cipher data of {} bytes is not IV plus whole blocks",
                data.len()
            )));
        }
        let (iv, ciphertext) = data.split_at(block);

        let mut decrypter = Crypter::new(
            self.cipher.to_openssl_cipher(),
            Mode::Decrypt,
            key.expose_secret(),
            Some(iv),
        )?;
        decrypter.pad(true);

        let mut plaintext = vec![0u8; ciphertext.len() + block];
        let mut count = decrypter.update(ciphertext, &mut plaintext)?;
        count += decrypter.finalize(&mut plaintext[count..])?;
        plaintext.truncate(count);
        Ok(plaintext)
    }

    fn check_key(&self, key: &SecureBytes) -> CryptoResult<()> {
        if key.len() != self.cipher.key_size() {
            return Err(Error::Invalid(format!(
                "{} byte key for a {} byte cipher",
                key.len(),
                self.cipher.key_size()
            )));
        }
        Ok(())
    }
}
