//! SOAP 1.1 and 1.2 binding of the token service.
//!
//! Inbound envelopes are read with the namespace-aware XML layer so the
//! WS-Trust payload stays an opaque [`XmlElement`]. Responses and faults are
//! built as elements and wrapped by [`to_envelope_string`].

mod fault;

pub use fault::{FaultCode, ReceivedFault, SoapFault};

use thiserror::Error;

use crate::wstrust::constants::{attributes, elements};
use crate::wstrust::model::BinarySecurityToken;
use crate::xml::{ElementReader, ParseError, XmlElement};

pub mod ns {
    pub const SOAP11_ENV: &str = "http://schemas.xmlsoap.org/soap/envelope/";
    pub const SOAP12_ENV: &str = "http://www.w3.org/2003/05/soap-envelope";
}

pub mod prefix {
    pub const SOAP_ENV: &str = "soapenv";
}

#[derive(Debug, Error)]
pub enum SoapError {
    #[error("Malformed SOAP envelope: {0}")]
    Parse(#[from] ParseError),

    #[error("Not a SOAP envelope: {0}")]
    NotAnEnvelope(String),

    #[error("SOAP envelope has an empty Body")]
    EmptyBody,

    #[error("SOAP body does not hold a Fault: {0}")]
    NotAFault(String),

    #[error("Unable to write SOAP envelope: {0}")]
    Write(#[from] quick_xml::Error),
}

/// Protocol version, identified by the envelope namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoapVersion {
    #[default]
    Soap11,
    Soap12,
}

impl SoapVersion {
    pub fn from_namespace(namespace: &str) -> Option<Self> {
        match namespace {
            ns::SOAP11_ENV => Some(Self::Soap11),
            ns::SOAP12_ENV => Some(Self::Soap12),
            _ => None,
        }
    }

    pub fn namespace(self) -> &'static str {
        match self {
            Self::Soap11 => ns::SOAP11_ENV,
            Self::Soap12 => ns::SOAP12_ENV,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Soap11 => "text/xml; charset=utf-8",
            Self::Soap12 => "application/soap+xml; charset=utf-8",
        }
    }

    /// Picks the version from an HTTP `Content-Type` header
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.starts_with("application/soap+xml") {
            Self::Soap12
        } else {
            Self::Soap11
        }
    }
}

/// An inbound SOAP message
#[derive(Debug, Clone)]
pub struct SoapMessage {
    version: SoapVersion,
    header: Option<XmlElement>,
    payload: XmlElement,
}

impl SoapMessage {
    /// Reads an envelope and keeps the first element of its body
    pub fn parse(xml: &str) -> Result<Self, SoapError> {
        let envelope = ElementReader::new(xml)?.raw_subtree()?;
        let name = envelope.name();
        let version = SoapVersion::from_namespace(name.namespace())
            .filter(|_| name.local_name() == "Envelope")
            .ok_or_else(|| SoapError::NotAnEnvelope(name.to_string()))?;

        let header = envelope.child(version.namespace(), "Header").cloned();
        let payload = envelope
            .child(version.namespace(), "Body")
            .and_then(XmlElement::first_element)
            .cloned()
            .ok_or(SoapError::EmptyBody)?;

        Ok(Self {
            version,
            header,
            payload,
        })
    }

    pub fn version(&self) -> SoapVersion {
        self.version
    }

    pub fn header(&self) -> Option<&XmlElement> {
        self.header.as_ref()
    }

    /// First element of the body
    pub fn payload(&self) -> &XmlElement {
        &self.payload
    }

    pub fn into_payload(self) -> XmlElement {
        self.payload
    }

    /// The first `wsse:BinarySecurityToken` anywhere in the header
    pub fn binary_security_token(&self) -> Option<BinarySecurityToken> {
        let token = self
            .header
            .as_ref()?
            .find(crate::wstrust::constants::ns::WSSE, elements::BINARY_SECURITY_TOKEN)?;
        Some(BinarySecurityToken {
            value_type: token.attribute(attributes::VALUE_TYPE).map(str::to_string),
            encoding_type: token.attribute(attributes::ENCODING_TYPE).map(str::to_string),
            value: token.text().trim().to_string(),
        })
    }
}

/// Wraps a payload in an envelope of the given version
pub fn envelope(version: SoapVersion, payload: XmlElement) -> XmlElement {
    let namespace = version.namespace();
    XmlElement::new(namespace, prefix::SOAP_ENV, "Envelope")
        .with_child(XmlElement::new(namespace, prefix::SOAP_ENV, "Body").with_child(payload))
}

/// Serializes a payload into a complete SOAP document
pub fn to_envelope_string(version: SoapVersion, payload: XmlElement) -> Result<String, SoapError> {
    let body = envelope(version, payload).to_xml()?;
    Ok(format!(r#"<?xml version="1.0" encoding="UTF-8"?>{body}"#))
}
