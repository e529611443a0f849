//! Namespace-aware XML plumbing shared by the WS-Trust parsers, writers and
//! the XML security layer.
//!
//! Inbound documents are lexed once into [`XmlEvent`]s and consumed through an
//! [`ElementReader`]. Opaque fragments (embedded tokens, key material) are kept
//! as [`XmlElement`] trees that serialize back into self-contained XML.

mod element;
mod error;
mod reader;

pub use element::{Attribute, Node, QName, XmlElement};
pub use error::ParseError;
pub use reader::{ElementReader, StartTag, XmlEvent};

/// Namespace of the `xml:` prefix, implicitly bound in every document.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";
