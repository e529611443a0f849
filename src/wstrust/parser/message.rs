//! The RST/RSTR state machine.
//!
//! A single loop walks the children of the message. Known WS-Trust elements
//! are dispatched through [`MessageElement::handler`]; anything else goes to
//! the extension registry. `SecondaryParameters` and `UseKey` are wrappers:
//! their start tags are consumed on their own and their end tags are skipped
//! when met, so their children are handled by the same loop.

use crate::wstrust::constants::{BASE_NAMESPACE, attributes, elements};
use crate::wstrust::model::{
    AppliesTo, Claims, EndpointReference, Entropy, KeyType, Lifetime, OnBehalfOf, RequestType,
    RequestSecurityToken, RequestSecurityTokenResponse, RequestedProofToken, RequestedReference,
    Renewing, Status, TokenTarget, UseKey,
};
use crate::wstrust::parser::elements as parse;
use crate::wstrust::parser::extension::{Extension, ExtensionRegistry};
use crate::xml::{ElementReader, ParseError, QName, XmlElement, XmlEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MessageKind {
    Request,
    Response,
}

impl MessageKind {
    pub(crate) fn element_name(self) -> &'static str {
        match self {
            Self::Request => elements::RST,
            Self::Response => elements::RSTR,
        }
    }
}

/// Fields collected while walking a message, shared by RST and RSTR
#[derive(Debug, Default)]
pub(crate) struct MessageFields {
    context: Option<String>,
    request_type: Option<RequestType>,
    token_type: Option<String>,
    applies_to: Option<AppliesTo>,
    lifetime: Option<Lifetime>,
    on_behalf_of: Option<OnBehalfOf>,
    key_type: Option<KeyType>,
    key_size: Option<u32>,
    entropy: Option<Entropy>,
    use_key: Option<UseKey>,
    target: Option<TokenTarget>,
    issuer: Option<EndpointReference>,
    computed_key_algorithm: Option<String>,
    key_wrap_algorithm: Option<String>,
    signature_algorithm: Option<String>,
    renewing: Option<Renewing>,
    claims: Option<Claims>,
    extensions: Vec<XmlElement>,
    requested_security_token: Option<XmlElement>,
    requested_proof_token: Option<RequestedProofToken>,
    requested_attached_reference: Option<RequestedReference>,
    requested_unattached_reference: Option<RequestedReference>,
    status: Option<Status>,
    requested_token_cancelled: bool,
}

impl MessageFields {
    pub(crate) fn into_request(self) -> RequestSecurityToken {
        RequestSecurityToken {
            context: self.context,
            request_type: self.request_type,
            token_type: self.token_type,
            applies_to: self.applies_to,
            lifetime: self.lifetime,
            on_behalf_of: self.on_behalf_of,
            key_type: self.key_type,
            key_size: self.key_size,
            entropy: self.entropy,
            use_key: self.use_key,
            target: self.target,
            issuer: self.issuer,
            computed_key_algorithm: self.computed_key_algorithm,
            key_wrap_algorithm: self.key_wrap_algorithm,
            signature_algorithm: self.signature_algorithm,
            renewing: self.renewing,
            claims: self.claims,
            extensions: self.extensions,
            binary_token: None,
            source: None,
        }
    }

    pub(crate) fn into_response(self) -> RequestSecurityTokenResponse {
        RequestSecurityTokenResponse {
            context: self.context,
            request_type: self.request_type,
            token_type: self.token_type,
            applies_to: self.applies_to,
            lifetime: self.lifetime,
            on_behalf_of: self.on_behalf_of,
            key_type: self.key_type,
            key_size: self.key_size,
            entropy: self.entropy,
            use_key: self.use_key,
            issuer: self.issuer,
            computed_key_algorithm: self.computed_key_algorithm,
            renewing: self.renewing,
            requested_security_token: self.requested_security_token,
            requested_proof_token: self.requested_proof_token,
            requested_attached_reference: self.requested_attached_reference,
            requested_unattached_reference: self.requested_unattached_reference,
            status: self.status,
            requested_token_cancelled: self.requested_token_cancelled,
            extensions: self.extensions,
        }
    }
}

struct MessageState {
    fields: MessageFields,
    /// Open wrapper elements, innermost last
    wrappers: Vec<MessageElement>,
}

type ElementHandler = fn(&mut ElementReader, &mut MessageState) -> Result<(), ParseError>;

/// WS-Trust vocabulary understood inside RST and RSTR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageElement {
    RequestType,
    TokenType,
    Lifetime,
    CancelTarget,
    ValidateTarget,
    RenewTarget,
    OnBehalfOf,
    KeyType,
    KeySize,
    Entropy,
    Issuer,
    SecondaryParameters,
    UseKey,
    ComputedKeyAlgorithm,
    KeyWrapAlgorithm,
    SignatureAlgorithm,
    Renewing,
    Claims,
    RequestedTokenCancelled,
    RequestedProofToken,
    RequestedSecurityToken,
    RequestedAttachedReference,
    RequestedUnattachedReference,
    Status,
}

impl MessageElement {
    const ALL: [MessageElement; 24] = [
        Self::RequestType,
        Self::TokenType,
        Self::Lifetime,
        Self::CancelTarget,
        Self::ValidateTarget,
        Self::RenewTarget,
        Self::OnBehalfOf,
        Self::KeyType,
        Self::KeySize,
        Self::Entropy,
        Self::Issuer,
        Self::SecondaryParameters,
        Self::UseKey,
        Self::ComputedKeyAlgorithm,
        Self::KeyWrapAlgorithm,
        Self::SignatureAlgorithm,
        Self::Renewing,
        Self::Claims,
        Self::RequestedTokenCancelled,
        Self::RequestedProofToken,
        Self::RequestedSecurityToken,
        Self::RequestedAttachedReference,
        Self::RequestedUnattachedReference,
        Self::Status,
    ];

    fn local_name(self) -> &'static str {
        match self {
            Self::RequestType => elements::REQUEST_TYPE,
            Self::TokenType => elements::TOKEN_TYPE,
            Self::Lifetime => elements::LIFETIME,
            Self::CancelTarget => elements::CANCEL_TARGET,
            Self::ValidateTarget => elements::VALIDATE_TARGET,
            Self::RenewTarget => elements::RENEW_TARGET,
            Self::OnBehalfOf => elements::ON_BEHALF_OF,
            Self::KeyType => elements::KEY_TYPE,
            Self::KeySize => elements::KEY_SIZE,
            Self::Entropy => elements::ENTROPY,
            Self::Issuer => elements::ISSUER,
            Self::SecondaryParameters => elements::SECONDARY_PARAMETERS,
            Self::UseKey => elements::USE_KEY,
            Self::ComputedKeyAlgorithm => elements::COMPUTED_KEY_ALGORITHM,
            Self::KeyWrapAlgorithm => elements::KEY_WRAP_ALGORITHM,
            Self::SignatureAlgorithm => elements::SIGNATURE_ALGORITHM,
            Self::Renewing => elements::RENEWING,
            Self::Claims => elements::CLAIMS,
            Self::RequestedTokenCancelled => elements::REQUESTED_TOKEN_CANCELLED,
            Self::RequestedProofToken => elements::REQUESTED_PROOF_TOKEN,
            Self::RequestedSecurityToken => elements::REQUESTED_TOKEN,
            Self::RequestedAttachedReference => elements::REQUESTED_ATTACHED_REFERENCE,
            Self::RequestedUnattachedReference => elements::REQUESTED_UNATTACHED_REFERENCE,
            Self::Status => elements::STATUS,
        }
    }

    fn allowed_in(self, kind: MessageKind) -> bool {
        match self {
            Self::CancelTarget
            | Self::ValidateTarget
            | Self::RenewTarget
            | Self::KeyWrapAlgorithm
            | Self::SignatureAlgorithm
            | Self::Claims => kind == MessageKind::Request,
            Self::RequestedTokenCancelled
            | Self::RequestedProofToken
            | Self::RequestedSecurityToken
            | Self::RequestedAttachedReference
            | Self::RequestedUnattachedReference
            | Self::Status => kind == MessageKind::Response,
            _ => true,
        }
    }

    fn from_name(name: &QName, kind: MessageKind) -> Option<Self> {
        if name.namespace() != BASE_NAMESPACE {
            return None;
        }
        Self::ALL
            .into_iter()
            .find(|element| element.local_name() == name.local_name())
            .filter(|element| element.allowed_in(kind))
    }

    fn handler(self) -> ElementHandler {
        match self {
            Self::RequestType => |reader, state| {
                let uri = parse::text_element(reader, elements::REQUEST_TYPE)?;
                state.fields.request_type = Some(RequestType::from_uri(&uri));
                Ok(())
            },
            Self::TokenType => |reader, state| {
                state.fields.token_type = Some(parse::text_element(reader, elements::TOKEN_TYPE)?);
                Ok(())
            },
            Self::Lifetime => |reader, state| {
                state.fields.lifetime = Some(parse::lifetime(reader)?);
                Ok(())
            },
            Self::CancelTarget => |reader, state| {
                let token = parse::target(reader, elements::CANCEL_TARGET)?;
                set_target(state, TokenTarget::Cancel(token))
            },
            Self::ValidateTarget => |reader, state| {
                let token = parse::target(reader, elements::VALIDATE_TARGET)?;
                set_target(state, TokenTarget::Validate(token))
            },
            Self::RenewTarget => |reader, state| {
                let token = parse::target(reader, elements::RENEW_TARGET)?;
                set_target(state, TokenTarget::Renew(token))
            },
            Self::OnBehalfOf => |reader, state| {
                state.fields.on_behalf_of = Some(parse::on_behalf_of(reader)?);
                Ok(())
            },
            Self::KeyType => |reader, state| {
                let uri = parse::text_element(reader, elements::KEY_TYPE)?;
                state.fields.key_type = Some(KeyType::from_uri(&uri));
                Ok(())
            },
            Self::KeySize => |reader, state| {
                state.fields.key_size = Some(parse::key_size(reader)?);
                Ok(())
            },
            Self::Entropy => |reader, state| {
                state.fields.entropy = Some(parse::entropy(reader)?);
                Ok(())
            },
            Self::Issuer => |reader, state| {
                state.fields.issuer = Some(parse::endpoint_reference(reader)?);
                Ok(())
            },
            Self::SecondaryParameters => |reader, state| {
                reader.next_start()?;
                state.wrappers.push(Self::SecondaryParameters);
                Ok(())
            },
            Self::UseKey => |reader, state| {
                reader.next_start()?;
                state.wrappers.push(Self::UseKey);
                Ok(())
            },
            Self::ComputedKeyAlgorithm => |reader, state| {
                state.fields.computed_key_algorithm =
                    Some(parse::text_element(reader, elements::COMPUTED_KEY_ALGORITHM)?);
                Ok(())
            },
            Self::KeyWrapAlgorithm => |reader, state| {
                state.fields.key_wrap_algorithm =
                    Some(parse::text_element(reader, elements::KEY_WRAP_ALGORITHM)?);
                Ok(())
            },
            Self::SignatureAlgorithm => |reader, state| {
                state.fields.signature_algorithm =
                    Some(parse::text_element(reader, elements::SIGNATURE_ALGORITHM)?);
                Ok(())
            },
            Self::Renewing => |reader, state| {
                state.fields.renewing = Some(parse::renewing(reader)?);
                Ok(())
            },
            Self::Claims => |reader, state| {
                state.fields.claims = Some(parse::claims(reader)?);
                Ok(())
            },
            Self::RequestedTokenCancelled => |reader, state| {
                parse::marker(reader, elements::REQUESTED_TOKEN_CANCELLED)?;
                state.fields.requested_token_cancelled = true;
                Ok(())
            },
            Self::RequestedProofToken => |reader, state| {
                state.fields.requested_proof_token = Some(parse::requested_proof_token(reader)?);
                Ok(())
            },
            Self::RequestedSecurityToken => |reader, state| {
                state.fields.requested_security_token = parse::requested_security_token(reader)?;
                Ok(())
            },
            Self::RequestedAttachedReference => |reader, state| {
                state.fields.requested_attached_reference = Some(parse::requested_reference(
                    reader,
                    elements::REQUESTED_ATTACHED_REFERENCE,
                )?);
                Ok(())
            },
            Self::RequestedUnattachedReference => |reader, state| {
                state.fields.requested_unattached_reference = Some(parse::requested_reference(
                    reader,
                    elements::REQUESTED_UNATTACHED_REFERENCE,
                )?);
                Ok(())
            },
            Self::Status => |reader, state| {
                state.fields.status = Some(parse::status(reader)?);
                Ok(())
            },
        }
    }
}

fn set_target(state: &mut MessageState, target: TokenTarget) -> Result<(), ParseError> {
    if let Some(existing) = &state.fields.target {
        return Err(ParseError::DuplicateElement(format!(
            "{} after {}",
            target.element_name(),
            existing.element_name()
        )));
    }
    state.fields.target = Some(target);
    Ok(())
}

/// Parses one RST or RSTR, start tag through end tag
pub(crate) fn parse_message(
    reader: &mut ElementReader,
    kind: MessageKind,
    extensions: &ExtensionRegistry,
) -> Result<MessageFields, ParseError> {
    let start = reader.next_start_named(kind.element_name())?;
    let mut state = MessageState {
        fields: MessageFields {
            context: start.attribute(attributes::CONTEXT).map(str::to_string),
            ..Default::default()
        },
        wrappers: Vec::new(),
    };

    loop {
        let name = match reader.peek() {
            Some(XmlEvent::End(name)) => {
                let name = name.clone();
                let closes_wrapper = state
                    .wrappers
                    .last()
                    .is_some_and(|wrapper| name.is(BASE_NAMESPACE, wrapper.local_name()));
                if closes_wrapper {
                    reader.next_end()?;
                    state.wrappers.pop();
                    continue;
                }
                if state.wrappers.is_empty() && name.is(BASE_NAMESPACE, kind.element_name()) {
                    reader.next_end()?;
                    return Ok(state.fields);
                }
                return Err(ParseError::UnknownEndElement(name.to_string()));
            }
            Some(XmlEvent::Start(tag)) => tag.name.clone(),
            _ => return Err(ParseError::UnexpectedEof),
        };

        if state.wrappers.last() == Some(&MessageElement::UseKey) {
            state.fields.use_key = Some(parse::use_key_content(reader)?);
            continue;
        }

        if let Some(element) = MessageElement::from_name(&name, kind) {
            (element.handler())(reader, &mut state)?;
        } else if let Some(parser) = extensions.lookup(&name) {
            match parser.parse(reader)? {
                Extension::AppliesTo(applies_to) => state.fields.applies_to = Some(applies_to),
                Extension::Element(element) => state.fields.extensions.push(element),
            }
        } else {
            return Err(ParseError::UnknownTag(name.to_string()));
        }
    }
}
