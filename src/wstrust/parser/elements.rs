//! Sub-parsers for the elements nested inside RST and RSTR messages.
//!
//! Each function expects the reader to be positioned before the element's
//! start tag and leaves it after the matching end tag.

use chrono::{DateTime, Utc};

use crate::wstrust::constants::{attributes, elements, ns};
use crate::wstrust::model::{
    BinarySecret, Claims, EndpointReference, Entropy, KeyIdentifier, Lifetime, OnBehalfOf,
    Reference, Renewing, RequestedProofToken, RequestedReference, SecurityTokenReference, Status,
    UseKey, UsernameToken,
};
use crate::xml::{ElementReader, ParseError, XmlElement};

/// Reads a simple text element, trimmed
pub(crate) fn text_element(reader: &mut ElementReader, local_name: &str) -> Result<String, ParseError> {
    reader.next_start_named(local_name)?;
    Ok(reader.element_text()?.trim().to_string())
}

pub(crate) fn key_size(reader: &mut ElementReader) -> Result<u32, ParseError> {
    let text = text_element(reader, elements::KEY_SIZE)?;
    text.parse().map_err(|source| ParseError::InvalidNumber {
        element: elements::KEY_SIZE.to_string(),
        source,
    })
}

fn timestamp(reader: &mut ElementReader, local_name: &str) -> Result<DateTime<Utc>, ParseError> {
    let value = text_element(reader, local_name)?;
    DateTime::parse_from_rfc3339(&value)
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|source| ParseError::InvalidTimestamp { value, source })
}

/// `Lifetime` with `Created` followed by `Expires`, in that order
pub(crate) fn lifetime(reader: &mut ElementReader) -> Result<Lifetime, ParseError> {
    reader.next_start_named(elements::LIFETIME)?;
    let created = timestamp(reader, elements::CREATED)?;
    let expires = timestamp(reader, elements::EXPIRES)?;
    reader.next_end_named(elements::LIFETIME)?;

    if created >= expires {
        return Err(ParseError::InvalidLifetime(format!(
            "Created {created} is not before Expires {expires}"
        )));
    }
    Ok(Lifetime::new(created, expires))
}

/// `BinarySecret` with its optional `Type`. The value stays base64 text.
pub(crate) fn binary_secret(reader: &mut ElementReader) -> Result<BinarySecret, ParseError> {
    let tag = reader.next_start_named(elements::BINARY_SECRET)?;
    let value = reader.element_text()?.trim().to_string();
    Ok(BinarySecret {
        secret_type: tag.attribute(attributes::TYPE).map(str::to_string),
        value,
    })
}

pub(crate) fn entropy(reader: &mut ElementReader) -> Result<Entropy, ParseError> {
    reader.next_start_named(elements::ENTROPY)?;
    let binary_secret = binary_secret(reader)?;
    reader.next_end_named(elements::ENTROPY)?;
    Ok(Entropy { binary_secret })
}

/// WS-Addressing endpoint reference. Only the address is kept.
pub(crate) fn endpoint_reference(
    reader: &mut ElementReader,
) -> Result<EndpointReference, ParseError> {
    let start = reader.next_start()?;
    let mut address = None;
    while let Some(tag) = reader.peek_next_start() {
        if tag.local_name() == elements::ADDRESS {
            address = Some(text_element(reader, elements::ADDRESS)?);
        } else {
            reader.skip_element()?;
        }
    }
    reader.next_end_named(start.local_name())?;
    address
        .map(EndpointReference::new)
        .ok_or_else(|| ParseError::ExpectedTextValue(elements::ADDRESS.to_string()))
}

/// `OnBehalfOf` carrying a `UsernameToken`. Other tokens are not supported.
pub(crate) fn on_behalf_of(reader: &mut ElementReader) -> Result<OnBehalfOf, ParseError> {
    reader.next_start_named(elements::ON_BEHALF_OF)?;
    let token = reader.next_start()?;
    if !token.name.is(ns::WSSE, elements::USERNAME_TOKEN) {
        return Err(ParseError::UnsupportedTag(token.name.to_string()));
    }

    let id = token
        .attributes
        .iter()
        .find(|attr| attr.name.local_name() == attributes::ID)
        .map(|attr| attr.value.clone());
    let mut username = None;
    while let Some(tag) = reader.peek_next_start() {
        if tag.local_name() == elements::USERNAME {
            username = Some(text_element(reader, elements::USERNAME)?);
        } else {
            reader.skip_element()?;
        }
    }
    reader.next_end_named(elements::USERNAME_TOKEN)?;
    reader.next_end_named(elements::ON_BEHALF_OF)?;

    let username =
        username.ok_or_else(|| ParseError::ExpectedTextValue(elements::USERNAME.to_string()))?;
    Ok(OnBehalfOf {
        username_token: UsernameToken { id, username },
    })
}

/// Captures the token wrapped by `CancelTarget`, `ValidateTarget` or `RenewTarget`
pub(crate) fn target(reader: &mut ElementReader, local_name: &str) -> Result<XmlElement, ParseError> {
    reader.next_start_named(local_name)?;
    let token = reader.raw_subtree()?;
    reader.next_end_named(local_name)?;
    Ok(token)
}

fn boolean(attribute: &str, value: Option<&str>) -> Result<Option<bool>, ParseError> {
    match value.map(str::trim) {
        None => Ok(None),
        Some("true") | Some("1") => Ok(Some(true)),
        Some("false") | Some("0") => Ok(Some(false)),
        Some(other) => Err(ParseError::InvalidBoolean {
            attribute: attribute.to_string(),
            value: other.to_string(),
        }),
    }
}

pub(crate) fn renewing(reader: &mut ElementReader) -> Result<Renewing, ParseError> {
    let tag = reader.next_start_named(elements::RENEWING)?;
    let renewing = Renewing {
        allow: boolean(attributes::ALLOW, tag.attribute(attributes::ALLOW))?,
        ok: boolean(attributes::OK, tag.attribute(attributes::OK))?,
    };
    reader.next_end_named(elements::RENEWING)?;
    Ok(renewing)
}

pub(crate) fn claims(reader: &mut ElementReader) -> Result<Claims, ParseError> {
    let element = reader.raw_subtree()?;
    Ok(Claims {
        dialect: element.attribute(attributes::DIALECT).map(str::to_string),
        element,
    })
}

/// Key material inside `UseKey`
pub(crate) fn use_key_content(reader: &mut ElementReader) -> Result<UseKey, ParseError> {
    let element = reader.raw_subtree()?;
    let name = element.name();
    if name.is(ns::DSIG, elements::X509_CERTIFICATE) {
        return Ok(UseKey::Certificate(element.text().trim().to_string()));
    }
    if name.is(ns::DSIG, elements::X509_DATA) {
        if let Some(cert) = element.child(ns::DSIG, elements::X509_CERTIFICATE) {
            return Ok(UseKey::Certificate(cert.text().trim().to_string()));
        }
    }
    if name.is(ns::DSIG, elements::KEY_VALUE) {
        return Ok(UseKey::KeyValue(element));
    }
    if name.is(ns::DSIG, elements::KEY_INFO) {
        return Ok(UseKey::KeyInfo(element));
    }
    Ok(UseKey::Opaque(element))
}

pub(crate) fn requested_proof_token(
    reader: &mut ElementReader,
) -> Result<RequestedProofToken, ParseError> {
    reader.next_start_named(elements::REQUESTED_PROOF_TOKEN)?;
    let child = reader
        .peek_next_start()
        .map(|tag| tag.local_name().to_string())
        .ok_or_else(|| ParseError::ExpectedStart(elements::REQUESTED_PROOF_TOKEN.to_string()))?;
    let proof = match child.as_str() {
        elements::BINARY_SECRET => RequestedProofToken::BinarySecret(binary_secret(reader)?),
        elements::COMPUTED_KEY => {
            RequestedProofToken::ComputedKey(text_element(reader, elements::COMPUTED_KEY)?)
        }
        other => return Err(ParseError::UnsupportedTag(other.to_string())),
    };
    reader.next_end_named(elements::REQUESTED_PROOF_TOKEN)?;
    Ok(proof)
}

pub(crate) fn requested_security_token(
    reader: &mut ElementReader,
) -> Result<Option<XmlElement>, ParseError> {
    reader.next_start_named(elements::REQUESTED_TOKEN)?;
    let token = if reader.peek_next_start().is_some() {
        Some(reader.raw_subtree()?)
    } else {
        None
    };
    reader.next_end_named(elements::REQUESTED_TOKEN)?;
    Ok(token)
}

fn security_token_reference(
    reader: &mut ElementReader,
) -> Result<SecurityTokenReference, ParseError> {
    let tag = reader.next_start_named(elements::SECURITY_TOKEN_REFERENCE)?;
    let mut reference = SecurityTokenReference {
        token_type: tag
            .attributes
            .iter()
            .find(|attr| attr.name.local_name() == attributes::TOKEN_TYPE)
            .map(|attr| attr.value.clone()),
        ..Default::default()
    };

    while let Some(child) = reader.peek_next_start() {
        let child = child.local_name().to_string();
        match child.as_str() {
            elements::KEY_IDENTIFIER => {
                let tag = reader.next_start()?;
                let value = reader.element_text()?.trim().to_string();
                reference.key_identifier = Some(KeyIdentifier {
                    value_type: tag.attribute(attributes::VALUE_TYPE).map(str::to_string),
                    value,
                });
            }
            elements::REFERENCE => {
                let tag = reader.next_start()?;
                reader.next_end_named(elements::REFERENCE)?;
                reference.reference = Some(Reference {
                    uri: tag.attribute(attributes::URI).unwrap_or_default().to_string(),
                    value_type: tag.attribute(attributes::VALUE_TYPE).map(str::to_string),
                });
            }
            _ => reader.skip_element()?,
        }
    }
    reader.next_end_named(elements::SECURITY_TOKEN_REFERENCE)?;
    Ok(reference)
}

/// `RequestedAttachedReference` or `RequestedUnattachedReference`
pub(crate) fn requested_reference(
    reader: &mut ElementReader,
    local_name: &str,
) -> Result<RequestedReference, ParseError> {
    reader.next_start_named(local_name)?;
    let security_token_reference = security_token_reference(reader)?;
    reader.next_end_named(local_name)?;
    Ok(RequestedReference {
        security_token_reference,
    })
}

pub(crate) fn status(reader: &mut ElementReader) -> Result<Status, ParseError> {
    reader.next_start_named(elements::STATUS)?;
    let code = text_element(reader, elements::CODE)?;
    let has_reason = reader
        .peek_next_start()
        .is_some_and(|tag| tag.local_name() == elements::REASON);
    let reason = if has_reason {
        Some(text_element(reader, elements::REASON)?)
    } else {
        None
    };
    reader.next_end_named(elements::STATUS)?;
    Ok(Status { code, reason })
}

/// `RequestedTokenCancelled` is a presence marker
pub(crate) fn marker(reader: &mut ElementReader, local_name: &str) -> Result<(), ParseError> {
    reader.next_start_named(local_name)?;
    reader.next_end_named(local_name)
}
