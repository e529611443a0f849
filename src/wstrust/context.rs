use std::collections::BTreeMap;
use std::fmt;

use crate::crypto::rsa::RsaPublicKey;
use crate::wstrust::model::{
    KeyInfo, Lifetime, RequestSecurityToken, RequestedReference, SecurityToken, Status,
    TokenTarget,
};
use crate::xml::{QName, XmlElement};

/// Name-to-value map produced by claims processing
pub type ClaimedAttributes = BTreeMap<String, serde_json::Value>;

/// An authenticated identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal {
    name: String,
}

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Per-request state shared between the request handler and the token
/// provider. Created for one request and dropped once the response is built.
#[derive(Debug)]
pub struct WsTrustRequestContext {
    request: RequestSecurityToken,
    caller: Option<Principal>,
    on_behalf_of: Option<Principal>,
    token_issuer: String,
    service_public_key: Option<RsaPublicKey>,
    claimed_attributes: ClaimedAttributes,
    proof_key_info: Option<KeyInfo>,

    security_token: Option<SecurityToken>,
    status: Option<Status>,
    attached_reference: Option<RequestedReference>,
    unattached_reference: Option<RequestedReference>,
}

impl WsTrustRequestContext {
    pub fn new(
        request: RequestSecurityToken,
        caller: Option<Principal>,
        token_issuer: impl Into<String>,
    ) -> Self {
        Self {
            request,
            caller,
            on_behalf_of: None,
            token_issuer: token_issuer.into(),
            service_public_key: None,
            claimed_attributes: ClaimedAttributes::new(),
            proof_key_info: None,
            security_token: None,
            status: None,
            attached_reference: None,
            unattached_reference: None,
        }
    }

    pub fn request(&self) -> &RequestSecurityToken {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut RequestSecurityToken {
        &mut self.request
    }

    pub fn caller(&self) -> Option<&Principal> {
        self.caller.as_ref()
    }

    pub fn on_behalf_of(&self) -> Option<&Principal> {
        self.on_behalf_of.as_ref()
    }

    pub fn set_on_behalf_of(&mut self, principal: Principal) {
        self.on_behalf_of = Some(principal);
    }

    /// Name of the STS, used as the issuer of new tokens
    pub fn token_issuer(&self) -> &str {
        &self.token_issuer
    }

    /// Token type the request resolved to
    pub fn token_type(&self) -> Option<&str> {
        self.request.token_type.as_deref()
    }

    pub fn lifetime(&self) -> Option<&Lifetime> {
        self.request.lifetime.as_ref()
    }

    /// Token carried by the request's Cancel, Validate or Renew target
    pub fn target_token(&self) -> Option<&XmlElement> {
        self.request.target.as_ref().map(TokenTarget::token)
    }

    /// Qualified name of the target token's root element
    pub fn target_qname(&self) -> Option<&QName> {
        self.target_token().map(XmlElement::name)
    }

    pub fn service_public_key(&self) -> Option<&RsaPublicKey> {
        self.service_public_key.as_ref()
    }

    pub fn set_service_public_key(&mut self, key: RsaPublicKey) {
        self.service_public_key = Some(key);
    }

    pub fn claimed_attributes(&self) -> &ClaimedAttributes {
        &self.claimed_attributes
    }

    pub fn set_claimed_attributes(&mut self, attributes: ClaimedAttributes) {
        self.claimed_attributes = attributes;
    }

    /// Key info of the proof-of-possession key, if one was negotiated
    pub fn proof_key_info(&self) -> Option<&KeyInfo> {
        self.proof_key_info.as_ref()
    }

    pub fn set_proof_key_info(&mut self, key_info: KeyInfo) {
        self.proof_key_info = Some(key_info);
    }

    pub fn security_token(&self) -> Option<&SecurityToken> {
        self.security_token.as_ref()
    }

    pub fn set_security_token(&mut self, token: SecurityToken) {
        self.security_token = Some(token);
    }

    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = Some(status);
    }

    pub fn attached_reference(&self) -> Option<&RequestedReference> {
        self.attached_reference.as_ref()
    }

    pub fn set_attached_reference(&mut self, reference: RequestedReference) {
        self.attached_reference = Some(reference);
    }

    pub fn unattached_reference(&self) -> Option<&RequestedReference> {
        self.unattached_reference.as_ref()
    }

    pub fn set_unattached_reference(&mut self, reference: RequestedReference) {
        self.unattached_reference = Some(reference);
    }
}
