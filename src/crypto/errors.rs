use openssl::error::ErrorStack;
use thiserror::Error;

pub(crate) type CryptoResult<T> = Result<T, Error>;

/// Error type for cryptographic operations
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid data format or corrupted data
    #[error("Invalid data: {0}")]
    Invalid(String),

    /// Algorithm URI this service does not implement
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Certificate could not be parsed or is not usable
    #[error("Invalid certificate: {0}")]
    Certificate(String),

    /// The operating system random source failed
    #[error("Random source failure: {0}")]
    Random(String),

    /// Internal OpenSSL error
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] ErrorStack),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
}
