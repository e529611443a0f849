//! SAML 2.0 assertion provider.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::providers::revocation::RevocationRegistry;
use crate::wstrust::constants::{self, ns};
use crate::wstrust::context::{ClaimedAttributes, Principal, WsTrustRequestContext};
use crate::wstrust::error::ProviderError;
use crate::wstrust::model::{
    AppliesTo, KeyIdentifier, Lifetime, RequestedReference, SecurityToken,
    SecurityTokenReference, Status, format_instant,
};
use crate::wstrust::provider::{Properties, SecurityTokenProvider, TokenFamily};
use crate::wstrust::registry::{ASSERTION_VALIDITY, CLOCK_SKEW};
use crate::xml::{QName, XmlElement};

pub const SAML2_ASSERTION_NS: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
pub const SAML2_TOKEN_TYPE: &str =
    "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLV2.0";
pub const SAML2_VALUE_TYPE: &str =
    "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLID";

pub const BEARER_METHOD: &str = "urn:oasis:names:tc:SAML:2.0:cm:bearer";
pub const HOLDER_OF_KEY_METHOD: &str = "urn:oasis:names:tc:SAML:2.0:cm:holder-of-key";
pub const SENDER_VOUCHES_METHOD: &str = "urn:oasis:names:tc:SAML:2.0:cm:sender-vouches";

/// Property switching attached references to the bare assertion id
pub const USE_ABSOLUTE_KEY_IDENTIFIER: &str = "USE_ABSOLUTE_KEYIDENTIFIER";

const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const SAML: &str = "saml";
const ASSERTION: &str = "Assertion";
const CONDITIONS: &str = "Conditions";
const NOT_BEFORE: &str = "NotBefore";
const NOT_ON_OR_AFTER: &str = "NotOnOrAfter";
const ANONYMOUS: &str = "ANONYMOUS";

const DEFAULT_VALIDITY_MS: i64 = 3_600_000;

fn saml(local_name: &str) -> XmlElement {
    XmlElement::new(SAML2_ASSERTION_NS, SAML, local_name)
}

fn is_assertion(token: &XmlElement) -> bool {
    token.name().is(SAML2_ASSERTION_NS, ASSERTION)
}

fn assertion_id(token: &XmlElement) -> Result<&str, ProviderError> {
    token
        .attribute("ID")
        .ok_or_else(|| ProviderError::Processing("Assertion does not carry an ID".into()))
}

pub(crate) fn new_assertion_id() -> String {
    format!("ID_{}", uuid::Uuid::new_v4())
}

pub(crate) fn millis(properties: &Properties, key: &str) -> Result<Option<Duration>, ProviderError> {
    properties
        .get(key)
        .map(|raw| {
            raw.trim()
                .parse::<i64>()
                .ok()
                .and_then(Duration::try_milliseconds)
                .ok_or_else(|| ProviderError::Processing(format!("Invalid {key} property: {raw}")))
        })
        .transpose()
}

pub(crate) fn attribute_values(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().flat_map(attribute_values).collect(),
        Value::String(text) => vec![text.clone()],
        Value::Null => Vec::new(),
        other => vec![other.to_string()],
    }
}

fn attribute_statement(attributes: &ClaimedAttributes) -> Option<XmlElement> {
    if attributes.is_empty() {
        return None;
    }
    let mut statement = saml("AttributeStatement");
    for (name, value) in attributes {
        let mut attribute = saml("Attribute").with_attribute("Name", name.as_str());
        for text in attribute_values(value) {
            attribute.push_child(XmlElement::text_element(
                SAML2_ASSERTION_NS,
                SAML,
                "AttributeValue",
                &text,
            ));
        }
        statement.push_child(attribute);
    }
    Some(statement)
}

fn conditions(lifetime: &Lifetime, audience: Option<&str>) -> XmlElement {
    saml(CONDITIONS)
        .with_attribute(NOT_BEFORE, format_instant(&lifetime.created))
        .with_attribute(NOT_ON_OR_AFTER, format_instant(&lifetime.expires))
        .with_optional_child(audience.map(|audience| {
            saml("AudienceRestriction").with_child(XmlElement::text_element(
                SAML2_ASSERTION_NS,
                SAML,
                "Audience",
                audience,
            ))
        }))
}

pub(crate) fn parse_instant(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|instant| instant.with_timezone(&Utc))
}

/// Whether `now` lies outside the assertion's Conditions window widened by `skew`.
/// An assertion without Conditions never expires.
pub(crate) fn has_expired(
    assertion: &XmlElement,
    namespace: &str,
    now: DateTime<Utc>,
    skew: Duration,
) -> Result<bool, chrono::ParseError> {
    let Some(conditions) = assertion.child(namespace, CONDITIONS) else {
        return Ok(false);
    };
    if let Some(not_before) = conditions.attribute(NOT_BEFORE) {
        let earliest = parse_instant(not_before)?
            .checked_sub_signed(skew)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        if now < earliest {
            return Ok(true);
        }
    }
    if let Some(not_on_or_after) = conditions.attribute(NOT_ON_OR_AFTER) {
        let latest = parse_instant(not_on_or_after)?
            .checked_add_signed(skew)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if now >= latest {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Issues SAML 2.0 assertions and tracks their cancellation in a
/// [`RevocationRegistry`].
pub struct Saml20TokenProvider {
    revocation: Arc<dyn RevocationRegistry>,
    validity: Duration,
    clock_skew: Duration,
    absolute_key_identifier: bool,
}

impl Saml20TokenProvider {
    /// Full type path, accepted in configuration next to `saml20`
    pub const CLASS_NAME: &'static str = "wstrust_sts::providers::saml2::Saml20TokenProvider";

    pub fn new(revocation: Arc<dyn RevocationRegistry>) -> Self {
        Self {
            revocation,
            validity: Duration::milliseconds(DEFAULT_VALIDITY_MS),
            clock_skew: Duration::zero(),
            absolute_key_identifier: false,
        }
    }

    fn lifetime(&self, context: &WsTrustRequestContext) -> Lifetime {
        context
            .lifetime()
            .cloned()
            .unwrap_or_else(|| Lifetime::starting_now(self.validity))
    }

    fn attached_reference(&self, id: &str) -> RequestedReference {
        if !self.absolute_key_identifier {
            return RequestedReference::key_identifier(SAML2_VALUE_TYPE, id, Some(SAML2_TOKEN_TYPE));
        }
        RequestedReference {
            security_token_reference: SecurityTokenReference {
                token_type: Some(SAML2_TOKEN_TYPE.to_string()),
                key_identifier: Some(KeyIdentifier {
                    value_type: Some(SAML2_VALUE_TYPE.to_string()),
                    value: id.to_string(),
                }),
                reference: None,
            },
        }
    }

    fn subject(&self, context: &WsTrustRequestContext) -> (XmlElement, &'static str) {
        let (principal, method) = if let Some(delegate) = context.on_behalf_of() {
            (Some(delegate), SENDER_VOUCHES_METHOD)
        } else if context.proof_key_info().is_some() {
            (context.caller(), HOLDER_OF_KEY_METHOD)
        } else {
            (context.caller(), BEARER_METHOD)
        };
        let name = principal.map(Principal::name).unwrap_or(ANONYMOUS);

        let confirmation_data = match (method, context.proof_key_info()) {
            (HOLDER_OF_KEY_METHOD, Some(key_info)) => Some(
                saml("SubjectConfirmationData")
                    .with_qualified_attribute(
                        XSI_NS,
                        "xsi",
                        "type",
                        "saml:KeyInfoConfirmationDataType",
                    )
                    .with_child(key_info.to_element()),
            ),
            _ => None,
        };

        let subject = saml("Subject")
            .with_child(XmlElement::text_element(SAML2_ASSERTION_NS, SAML, "NameID", name))
            .with_child(
                saml("SubjectConfirmation")
                    .with_attribute("Method", method)
                    .with_optional_child(confirmation_data),
            );
        (subject, method)
    }
}

#[async_trait]
impl SecurityTokenProvider for Saml20TokenProvider {
    fn initialize(&mut self, properties: &Properties) -> Result<(), ProviderError> {
        if let Some(validity) = millis(properties, ASSERTION_VALIDITY)? {
            self.validity = validity;
        }
        if let Some(skew) = millis(properties, CLOCK_SKEW)? {
            self.clock_skew = skew;
        }
        self.absolute_key_identifier = properties
            .get(USE_ABSOLUTE_KEY_IDENTIFIER)
            .is_some_and(|value| value.eq_ignore_ascii_case("true"));
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
        let (subject, method) = self.subject(context);

        let authn_statement = saml("AuthnStatement")
            .with_attribute("AuthnInstant", format_instant(&lifetime.created))
            .with_child(saml("AuthnContext").with_child(XmlElement::text_element(
                SAML2_ASSERTION_NS,
                SAML,
                "AuthnContextClassRef",
                method,
            )));

        let assertion = saml(ASSERTION)
            .with_attribute("ID", id.as_str())
            .with_attribute("Version", "2.0")
            .with_attribute("IssueInstant", format_instant(&lifetime.created))
            .with_child(XmlElement::text_element(
                SAML2_ASSERTION_NS,
                SAML,
                "Issuer",
                context.token_issuer(),
            ))
            .with_child(subject)
            .with_child(conditions(&lifetime, audience.as_deref()))
            .with_optional_child(attribute_statement(context.claimed_attributes()))
            .with_child(authn_statement);

        let token_type = context
            .token_type()
            .unwrap_or(SAML2_TOKEN_TYPE)
            .to_string();
        info!(id = %id, method, "SAML assertion issued");
        context.set_security_token(SecurityToken::new(token_type, assertion, id.as_str()));
        context.set_attached_reference(self.attached_reference(&id));
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
        if self.revocation.is_revoked(SAML2_TOKEN_TYPE, old_id).await? {
            return Err(ProviderError::Processing(format!(
                "Assertion with id {old_id} has been canceled and cannot be renewed"
            )));
        }

        let id = new_assertion_id();
        let lifetime = self.lifetime(context);
        let mut assertion = old.clone();
        assertion.set_attribute("ID", id.as_str());
        assertion.set_attribute("IssueInstant", format_instant(&lifetime.created));
        assertion.retain_elements(|child| !child.name().is(ns::DSIG, "Signature"));
        match assertion.child_mut(SAML2_ASSERTION_NS, CONDITIONS) {
            Some(conditions) => {
                conditions.set_attribute(NOT_BEFORE, format_instant(&lifetime.created));
                conditions.set_attribute(NOT_ON_OR_AFTER, format_instant(&lifetime.expires));
            }
            None => {
                let index = assertion
                    .position_of(SAML2_ASSERTION_NS, "Subject")
                    .map_or(0, |index| index + 1);
                assertion.insert_child(index, conditions(&lifetime, None));
            }
        }
        debug!(old = %old_id, new = %id, "SAML assertion renewed");

        let token_type = context
            .token_type()
            .unwrap_or(SAML2_TOKEN_TYPE)
            .to_string();
        context.set_security_token(SecurityToken::new(token_type, assertion, id.as_str()));
        context.set_attached_reference(self.attached_reference(&id));
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
        self.revocation.revoke(SAML2_TOKEN_TYPE, id).await?;
        info!(id, "SAML assertion canceled");
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
            Status::invalid("Validation failure: supplied token is not a SAMLV2.0 Assertion")
        } else {
            let id = assertion_id(&token)?;
            if self.revocation.is_revoked(SAML2_TOKEN_TYPE, id).await? {
                Status::invalid(format!(
                    "Validation failure: assertion with id {id} has been canceled"
                ))
            } else {
                match has_expired(&token, SAML2_ASSERTION_NS, Utc::now(), self.clock_skew) {
                    Ok(true) => Status::invalid(
                        "Validation failure: assertion expired or used before its lifetime period",
                    ),
                    Ok(false) => Status::valid("SAMLV2.0 Assertion successfuly validated"),
                    Err(e) => Status::invalid(format!(
                        "Validation failure: unable to verify assertion lifetime: {e}"
                    )),
                }
            }
        };
        debug!(code = %status.code, "SAML assertion validated");
        context.set_status(status);
        Ok(())
    }

    fn supports(&self, namespace: &str) -> bool {
        namespace == constants::BASE_NAMESPACE
    }

    fn token_type(&self) -> &str {
        SAML2_TOKEN_TYPE
    }

    fn family(&self) -> TokenFamily {
        TokenFamily::WsTrust
    }

    fn supported_qname(&self) -> QName {
        QName::new(SAML2_ASSERTION_NS, ASSERTION)
    }
}
