//! SAML 1.1 assertion provider.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{debug, info};

use crate::providers::revocation::RevocationRegistry;
use crate::providers::saml2::{
    attribute_values, has_expired, millis, new_assertion_id,
};
use crate::wstrust::constants::{self, ns};
use crate::wstrust::context::{ClaimedAttributes, Principal, WsTrustRequestContext};
use crate::wstrust::error::ProviderError;
use crate::wstrust::model::{
    AppliesTo, Lifetime, RequestedReference, SecurityToken, Status, format_instant,
};
use crate::wstrust::provider::{Properties, SecurityTokenProvider, TokenFamily};
use crate::wstrust::registry::{ASSERTION_VALIDITY, CLOCK_SKEW};
use crate::xml::{QName, XmlElement};

pub const SAML11_ASSERTION_NS: &str = "urn:oasis:names:tc:SAML:1.0:assertion";
pub const SAML11_TOKEN_TYPE: &str =
    "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLV1.1";
pub const SAML11_VALUE_TYPE: &str =
    "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.0#SAMLAssertionID";

pub const BEARER_METHOD: &str = "urn:oasis:names:tc:SAML:1.0:cm:bearer";
pub const HOLDER_OF_KEY_METHOD: &str = "urn:oasis:names:tc:SAML:1.0:cm:holder-of-key";
pub const SENDER_VOUCHES_METHOD: &str = "urn:oasis:names:tc:SAML:1.0:cm:sender-vouches";

const UNSPECIFIED_FORMAT: &str = "urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified";
const UNSPECIFIED_AUTHN_METHOD: &str = "urn:oasis:names:tc:SAML:1.0:am:unspecified";

const SAML1: &str = "saml1";
const ASSERTION: &str = "Assertion";
const ASSERTION_ID: &str = "AssertionID";
const CONDITIONS: &str = "Conditions";
const NOT_BEFORE: &str = "NotBefore";
const NOT_ON_OR_AFTER: &str = "NotOnOrAfter";
const ANONYMOUS: &str = "ANONYMOUS";

const DEFAULT_VALIDITY_MS: i64 = 3_600_000;

fn saml1(local_name: &str) -> XmlElement {
    XmlElement::new(SAML11_ASSERTION_NS, SAML1, local_name)
}

fn saml1_text(local_name: &str, text: &str) -> XmlElement {
    XmlElement::text_element(SAML11_ASSERTION_NS, SAML1, local_name, text)
}

fn is_assertion(token: &XmlElement) -> bool {
    token.name().is(SAML11_ASSERTION_NS, ASSERTION)
}

fn assertion_id(token: &XmlElement) -> Result<&str, ProviderError> {
    token
        .attribute(ASSERTION_ID)
        .ok_or_else(|| ProviderError::Processing("Assertion does not carry an AssertionID".into()))
}

fn conditions(lifetime: &Lifetime, audience: Option<&str>) -> XmlElement {
    saml1(CONDITIONS)
        .with_attribute(NOT_BEFORE, format_instant(&lifetime.created))
        .with_attribute(NOT_ON_OR_AFTER, format_instant(&lifetime.expires))
        .with_optional_child(audience.map(|audience| {
            saml1("AudienceRestrictionCondition").with_child(saml1_text("Audience", audience))
        }))
}

/// Splits a claim URI into the SAML 1.1 `AttributeNamespace` and `AttributeName`
fn attribute_name(claim: &str) -> (&str, &str) {
    match claim.rsplit_once('/') {
        Some((namespace, name)) if !name.is_empty() => (namespace, name),
        _ => (constants::BASE_NAMESPACE, claim),
    }
}

fn attribute_statement(subject: &XmlElement, attributes: &ClaimedAttributes) -> Option<XmlElement> {
    if attributes.is_empty() {
        return None;
    }
    let mut statement = saml1("AttributeStatement").with_child(subject.clone());
    for (claim, value) in attributes {
        let (namespace, name) = attribute_name(claim);
        let mut attribute = saml1("Attribute")
            .with_attribute("AttributeName", name)
            .with_attribute("AttributeNamespace", namespace);
        for text in attribute_values(value) {
            attribute.push_child(saml1_text("AttributeValue", &text));
        }
        statement.push_child(attribute);
    }
    Some(statement)
}

/// Issues SAML 1.1 assertions. Cancellation is tracked in the same
/// [`RevocationRegistry`] as SAML 2.0, under the SAML 1.1 token type.
pub struct Saml11TokenProvider {
    revocation: Arc<dyn RevocationRegistry>,
    validity: Duration,
    clock_skew: Duration,
}

impl Saml11TokenProvider {
    /// Full type path, accepted in configuration next to `saml11`
    pub const CLASS_NAME: &'static str = "wstrust_sts::providers::saml11::Saml11TokenProvider";

    pub fn new(revocation: Arc<dyn RevocationRegistry>) -> Self {
        Self {
            revocation,
            validity: Duration::milliseconds(DEFAULT_VALIDITY_MS),
            clock_skew: Duration::zero(),
        }
    }

    fn lifetime(&self, context: &WsTrustRequestContext) -> Lifetime {
        context
            .lifetime()
            .cloned()
            .unwrap_or_else(|| Lifetime::starting_now(self.validity))
    }

    fn attached_reference(id: &str) -> RequestedReference {
        RequestedReference::key_identifier(SAML11_VALUE_TYPE, id, Some(SAML11_TOKEN_TYPE))
    }

    fn subject(context: &WsTrustRequestContext) -> (XmlElement, &'static str) {
        let (principal, method) = if let Some(delegate) = context.on_behalf_of() {
            (Some(delegate), SENDER_VOUCHES_METHOD)
        } else if context.proof_key_info().is_some() {
            (context.caller(), HOLDER_OF_KEY_METHOD)
        } else {
            (context.caller(), BEARER_METHOD)
        };
        let name = principal.map(Principal::name).unwrap_or(ANONYMOUS);

        let key_info = match method {
            HOLDER_OF_KEY_METHOD => context.proof_key_info().map(|info| info.to_element()),
            _ => None,
        };

        let subject = saml1("Subject")
            .with_child(saml1_text("NameIdentifier", name).with_attribute("Format", UNSPECIFIED_FORMAT))
            .with_child(
                saml1("SubjectConfirmation")
                    .with_child(saml1_text("ConfirmationMethod", method))
                    .with_optional_child(key_info),
            );
        (subject, method)
    }

    fn security_token(
        context: &mut WsTrustRequestContext,
        assertion: XmlElement,
        id: &str,
    ) {
        let token_type = context
            .token_type()
            .unwrap_or(SAML11_TOKEN_TYPE)
            .to_string();
        context.set_security_token(SecurityToken::new(token_type, assertion, id));
        context.set_attached_reference(Self::attached_reference(id));
    }
}

#[async_trait]
impl SecurityTokenProvider for Saml11TokenProvider {
    fn initialize(&mut self, properties: &Properties) -> Result<(), ProviderError> {
        if let Some(validity) = millis(properties, ASSERTION_VALIDITY)? {
            self.validity = validity;
        }
        if let Some(skew) = millis(properties, CLOCK_SKEW)? {
            self.clock_skew = skew;
        }
        Ok(())
    }

    async fn issue_token(&self, context: &mut WsTrustRequestContext) -> Result<(), ProviderError> {
        let id = new_assertion_id();
        let lifetime = self.lifetime(context);
        let audience = context
            .request()
            .applies_to
            .as_ref()
            .and_then(AppliesTo::address)
            .map(str::to_string);
        let (subject, method) = Self::subject(context);

        let authentication = saml1("AuthenticationStatement")
            .with_attribute("AuthenticationMethod", UNSPECIFIED_AUTHN_METHOD)
            .with_attribute("AuthenticationInstant", format_instant(&lifetime.created))
            .with_child(subject.clone());

        let assertion = saml1(ASSERTION)
            .with_attribute(ASSERTION_ID, id.as_str())
            .with_attribute("MajorVersion", "1")
            .with_attribute("MinorVersion", "1")
            .with_attribute("IssueInstant", format_instant(&lifetime.created))
            .with_attribute("Issuer", context.token_issuer())
            .with_child(conditions(&lifetime, audience.as_deref()))
            .with_child(authentication)
            .with_optional_child(attribute_statement(&subject, context.claimed_attributes()));

        info!(id = %id, method, "SAML 1.1 assertion issued");
        Self::security_token(context, assertion, &id);
        Ok(())
    }

    async fn renew_token(&self, context: &mut WsTrustRequestContext) -> Result<(), ProviderError> {
        let old = context
            .target_token()
            .cloned()
            .ok_or_else(|| ProviderError::Processing("Renew request without a target".into()))?;
        if !is_assertion(&old) {
            return Err(ProviderError::UnsupportedToken(old.name().to_string()));
        }
        let old_id = assertion_id(&old)?;
        if self.revocation.is_revoked(SAML11_TOKEN_TYPE, old_id).await? {
            return Err(ProviderError::Processing(format!(
                "SAMLV1.1 Assertion with id {old_id} has been canceled and cannot be renewed"
            )));
        }

        let id = new_assertion_id();
        let lifetime = self.lifetime(context);
        let mut assertion = old.clone();
        assertion.set_attribute(ASSERTION_ID, id.as_str());
        assertion.set_attribute("IssueInstant", format_instant(&lifetime.created));
        assertion.set_attribute("Issuer", context.token_issuer());
        assertion.retain_elements(|child| !child.name().is(ns::DSIG, "Signature"));
        match assertion.child_mut(SAML11_ASSERTION_NS, CONDITIONS) {
            Some(conditions) => {
                conditions.set_attribute(NOT_BEFORE, format_instant(&lifetime.created));
                conditions.set_attribute(NOT_ON_OR_AFTER, format_instant(&lifetime.expires));
            }
            None => assertion.insert_child(0, conditions(&lifetime, None)),
        }
        debug!(old = %old_id, new = %id, "SAML 1.1 assertion renewed");

        Self::security_token(context, assertion, &id);
        Ok(())
    }

    async fn cancel_token(
        &self,
        context: &mut WsTrustRequestContext,
    ) -> Result<(), ProviderError> {
        let token = context
            .target_token()
            .ok_or_else(|| ProviderError::Processing("Cancel request without a target".into()))?;
        if !is_assertion(token) {
            return Err(ProviderError::UnsupportedToken(token.name().to_string()));
        }
        let id = assertion_id(token)?;
        self.revocation.revoke(SAML11_TOKEN_TYPE, id).await?;
        info!(id, "SAML 1.1 assertion canceled");
        Ok(())
    }

    async fn validate_token(
        &self,
        context: &mut WsTrustRequestContext,
    ) -> Result<(), ProviderError> {
        let token = context
            .target_token()
            .cloned()
            .ok_or_else(|| ProviderError::Processing("Validate request without a target".into()))?;

        let status = if !is_assertion(&token) {
            Status::invalid("Validation failure: supplied token is not a SAMLV1.1 Assertion")
        } else {
            let id = assertion_id(&token)?;
            if self.revocation.is_revoked(SAML11_TOKEN_TYPE, id).await? {
                Status::invalid(format!(
                    "Validation failure: assertion with id {id} has been canceled"
                ))
            } else {
                match has_expired(&token, SAML11_ASSERTION_NS, Utc::now(), self.clock_skew) {
                    Ok(true) => Status::invalid(
                        "Validation failure: assertion expired or used before its lifetime period",
                    ),
                    Ok(false) => Status::valid("SAMLV1.1 Assertion successfuly validated"),
                    Err(e) => Status::invalid(format!(
                        "Validation failure: unable to verify assertion lifetime: {e}"
                    )),
                }
            }
        };
        debug!(code = %status.code, "SAML 1.1 assertion validated");
        context.set_status(status);
        Ok(())
    }

    fn supports(&self, namespace: &str) -> bool {
        namespace == constants::BASE_NAMESPACE
    }

    fn token_type(&self) -> &str {
        SAML11_TOKEN_TYPE
    }

    fn family(&self) -> TokenFamily {
        TokenFamily::WsTrust
    }

    fn supported_qname(&self) -> QName {
        QName::new(SAML11_ASSERTION_NS, ASSERTION)
    }
}
