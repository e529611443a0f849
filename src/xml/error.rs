use std::num::ParseIntError;

use quick_xml::events::attributes::AttrError;
use thiserror::Error;

/// Error raised while reading or interpreting an XML payload
#[derive(Debug, Error)]
pub enum ParseError {
    /// The input ended while more events were expected
    #[error("Unexpected end of XML input")]
    UnexpectedEof,

    /// A start element was expected but something else was found
    #[error("Expected a start element but found {0}")]
    ExpectedStart(String),

    /// An end element was expected but something else was found
    #[error("Expected an end element but found {0}")]
    ExpectedEnd(String),

    /// The element was expected to carry a text value
    #[error("Expected text value in element {0}")]
    ExpectedTextValue(String),

    /// A specific element was expected at this position
    #[error("Expected element {expected} but found {found}")]
    UnexpectedElement { expected: String, found: String },

    /// Element outside the known vocabulary and the extension registry
    #[error("Unknown tag: {0}")]
    UnknownTag(String),

    /// End element that closes neither the current message nor a wrapper
    #[error("Unknown end element: {0}")]
    UnknownEndElement(String),

    /// Element that may appear at most once per message
    #[error("Duplicate element: {0}")]
    DuplicateElement(String),

    /// Element known to the protocol but not supported at this position
    #[error("Unsupported tag: {0}")]
    UnsupportedTag(String),

    #[error("Invalid number in element {element}: {source}")]
    InvalidNumber {
        element: String,
        #[source]
        source: ParseIntError,
    },

    #[error("Invalid boolean value {value:?} in attribute {attribute}")]
    InvalidBoolean { attribute: String, value: String },

    #[error("Invalid timestamp {value:?}: {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Invalid lifetime: {0}")]
    InvalidLifetime(String),

    #[error("Unbound namespace prefix: {0}")]
    UnboundPrefix(String),

    /// Lexical error reported by quick-xml
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Invalid UTF-8 in XML: {0}")]
    Encoding(#[from] std::str::Utf8Error),
}

impl From<AttrError> for ParseError {
    fn from(err: AttrError) -> Self {
        ParseError::Xml(err.into())
    }
}
