use thiserror::Error;

use crate::crypto;
use crate::wstrust::registry::RegistryError;
use crate::xml::ParseError;
use crate::xmlsec;

/// Failure of a WS-Trust request. Every variant is fatal to the request
/// and is reported to the caller as a SOAP fault.
#[derive(Debug, Error)]
pub enum WsTrustError {
    #[error("Parsing error: {0}")]
    Parse(#[from] ParseError),

    #[error("Unsupported request type: {0}")]
    UnsupportedRequestType(String),

    #[error("Request does not specify a RequestType")]
    MissingRequestType,

    #[error("Either TokenType or AppliesTo must be defined")]
    MissingTokenTypeOrAppliesTo,

    #[error("No token provider found for {0}")]
    NoTokenProviderForType(String),

    #[error("{0} is required for this request")]
    MissingTarget(&'static str),

    #[error("Unable to locate client public key")]
    UnableToLocateClientPublicKey,

    #[error("Unsupported UseKey content: {0}")]
    UnsupportedUseKey(String),

    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("Requested key size of {0} bits is not supported")]
    InvalidKeySize(u32),

    #[error("Validation failure during renewal: {0}")]
    InvalidTokenSignature(#[source] xmlsec::Error),

    #[error("Token provider failure: {0}")]
    Provider(#[from] ProviderError),

    #[error("Cryptographic failure: {0}")]
    Crypto(#[from] crypto::Error),

    #[error("Token protection failure: {0}")]
    Security(#[from] xmlsec::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl WsTrustError {
    /// Whether the request itself is at fault rather than the service
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            Self::Parse(_)
                | Self::UnsupportedRequestType(_)
                | Self::MissingRequestType
                | Self::MissingTokenTypeOrAppliesTo
                | Self::NoTokenProviderForType(_)
                | Self::MissingTarget(_)
                | Self::UnableToLocateClientPublicKey
                | Self::UnsupportedUseKey(_)
                | Self::UnsupportedKeyType(_)
                | Self::InvalidKeySize(_)
                | Self::InvalidTokenSignature(_)
        )
    }
}

/// Failure raised by a token provider or claims processor
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The operation was understood but cannot be carried out
    #[error("{0}")]
    Processing(String),

    /// The supplied token is not of the provider's kind
    #[error("Unsupported token: {0}")]
    UnsupportedToken(String),

    #[error("Revocation registry failure: {0}")]
    Revocation(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Crypto(#[from] crypto::Error),

    #[error(transparent)]
    Security(#[from] xmlsec::Error),
}

impl From<redis::RedisError> for ProviderError {
    fn from(err: redis::RedisError) -> Self {
        ProviderError::Revocation(err.to_string())
    }
}
