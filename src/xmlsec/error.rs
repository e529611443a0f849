use color_eyre::eyre::Report;

use crate::xml::ParseError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("XML processing error: {0}")]
    Xml(#[from] Report),

    #[error("Malformed XML: {0}")]
    Parse(#[from] ParseError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] crate::crypto::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Element {0} carries no signature")]
    MissingSignature(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid data: {0}")]
    Invalid(String),
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Xml(err.into())
    }
}

impl From<quick_xml::DeError> for Error {
    fn from(err: quick_xml::DeError) -> Self {
        Error::Xml(err.into())
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::Xml(err.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Xml(err.into())
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Error::Utf8(err.utf8_error())
    }
}
