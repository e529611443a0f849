use std::fmt;
use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Duration, SecondsFormat, Utc};

use crate::wstrust::constants::{self, attributes, elements, ns, prefix};
use crate::xml::XmlElement;

/// Operation requested by an RST
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestType {
    Issue,
    Renew,
    Cancel,
    Validate,
    BatchIssue,
    /// Any URI outside the WS-Trust 1.3 bindings, kept verbatim
    Other(String),
}

impl RequestType {
    pub fn from_uri(uri: &str) -> Self {
        match uri {
            constants::ISSUE_REQUEST => Self::Issue,
            constants::RENEW_REQUEST => Self::Renew,
            constants::CANCEL_REQUEST => Self::Cancel,
            constants::VALIDATE_REQUEST => Self::Validate,
            constants::BATCH_ISSUE_REQUEST => Self::BatchIssue,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_uri(&self) -> &str {
        match self {
            Self::Issue => constants::ISSUE_REQUEST,
            Self::Renew => constants::RENEW_REQUEST,
            Self::Cancel => constants::CANCEL_REQUEST,
            Self::Validate => constants::VALIDATE_REQUEST,
            Self::BatchIssue => constants::BATCH_ISSUE_REQUEST,
            Self::Other(uri) => uri,
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_uri())
    }
}

/// Kind of proof-of-possession key requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyType {
    Bearer,
    Symmetric,
    Public,
    Other(String),
}

impl KeyType {
    /// Key type URIs are compared case-insensitively
    pub fn from_uri(uri: &str) -> Self {
        if uri.eq_ignore_ascii_case(constants::KEY_TYPE_BEARER) {
            Self::Bearer
        } else if uri.eq_ignore_ascii_case(constants::KEY_TYPE_SYMMETRIC) {
            Self::Symmetric
        } else if uri.eq_ignore_ascii_case(constants::KEY_TYPE_PUBLIC) {
            Self::Public
        } else {
            Self::Other(uri.to_string())
        }
    }

    pub fn as_uri(&self) -> &str {
        match self {
            Self::Bearer => constants::KEY_TYPE_BEARER,
            Self::Symmetric => constants::KEY_TYPE_SYMMETRIC,
            Self::Public => constants::KEY_TYPE_PUBLIC,
            Self::Other(uri) => uri,
        }
    }
}

/// Formats an instant the way WS-Security utility timestamps are written
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Validity window of a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lifetime {
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl Lifetime {
    pub fn new(created: DateTime<Utc>, expires: DateTime<Utc>) -> Self {
        Self { created, expires }
    }

    /// Window starting now and lasting `validity`, capped at the latest
    /// representable instant
    pub fn starting_now(validity: Duration) -> Self {
        let created = Utc::now();
        let expires = created
            .checked_add_signed(validity)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self::new(created, expires)
    }

    /// Whether `instant` falls inside the window widened by `skew` on both ends
    pub fn contains(&self, instant: DateTime<Utc>, skew: Duration) -> bool {
        let start = self
            .created
            .checked_sub_signed(skew)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let end = self
            .expires
            .checked_add_signed(skew)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        instant >= start && instant < end
    }
}

/// WS-Addressing endpoint reference, reduced to its address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointReference {
    pub address: String,
}

impl EndpointReference {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

/// WS-Policy `AppliesTo`: the relying party the token is meant for
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppliesTo {
    pub endpoint_reference: Option<EndpointReference>,
}

impl AppliesTo {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            endpoint_reference: Some(EndpointReference::new(address)),
        }
    }

    /// Service name the request targets
    pub fn address(&self) -> Option<&str> {
        self.endpoint_reference
            .as_ref()
            .map(|epr| epr.address.as_str())
    }
}

/// Base64 keying material with an optional type URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinarySecret {
    pub secret_type: Option<String>,
    /// Raw element text, base64 encoded
    pub value: String,
}

impl BinarySecret {
    pub fn new(secret_type: Option<&str>, secret: &[u8]) -> Self {
        Self {
            secret_type: secret_type.map(str::to_string),
            value: BASE64.encode(secret),
        }
    }

    /// Secret typed as a nonce, used for entropy
    pub fn nonce(secret: &[u8]) -> Self {
        Self::new(Some(constants::BINARY_SECRET_NONCE), secret)
    }

    /// Decodes the base64 value, ignoring embedded whitespace
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        let compact: String = self.value.split_whitespace().collect();
        BASE64.decode(compact)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entropy {
    pub binary_secret: BinarySecret,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsernameToken {
    pub id: Option<String>,
    pub username: String,
}

/// Identity the token is requested for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnBehalfOf {
    pub username_token: UsernameToken,
}

impl OnBehalfOf {
    pub fn username(username: impl Into<String>, id: Option<&str>) -> Self {
        Self {
            username_token: UsernameToken {
                id: id.map(str::to_string),
                username: username.into(),
            },
        }
    }
}

/// Key material supplied by the client in `UseKey`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UseKey {
    /// Base64 DER certificate from `ds:X509Certificate`
    Certificate(String),
    /// `ds:KeyValue` element
    KeyValue(XmlElement),
    /// Complete `ds:KeyInfo` element
    KeyInfo(XmlElement),
    /// Anything else, kept as is
    Opaque(XmlElement),
}

/// Existing token a Cancel, Validate or Renew request operates on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenTarget {
    Cancel(XmlElement),
    Validate(XmlElement),
    Renew(XmlElement),
}

impl TokenTarget {
    pub fn token(&self) -> &XmlElement {
        match self {
            Self::Cancel(token) | Self::Validate(token) | Self::Renew(token) => token,
        }
    }

    pub fn element_name(&self) -> &'static str {
        match self {
            Self::Cancel(_) => elements::CANCEL_TARGET,
            Self::Validate(_) => elements::VALIDATE_TARGET,
            Self::Renew(_) => elements::RENEW_TARGET,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Renewing {
    pub allow: Option<bool>,
    pub ok: Option<bool>,
}

/// Requested claims, kept as the original element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub dialect: Option<String>,
    pub element: XmlElement,
}

/// Outcome of a Validate request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: String,
    pub reason: Option<String>,
}

impl Status {
    pub fn valid(reason: impl Into<String>) -> Self {
        Self {
            code: constants::STATUS_CODE_VALID.to_string(),
            reason: Some(reason.into()),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            code: constants::STATUS_CODE_INVALID.to_string(),
            reason: Some(reason.into()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.code == constants::STATUS_CODE_VALID
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestedProofToken {
    BinarySecret(BinarySecret),
    /// Algorithm URI used to compute the key from both entropies
    ComputedKey(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyIdentifier {
    pub value_type: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub uri: String,
    pub value_type: Option<String>,
}

/// `wsse:SecurityTokenReference`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecurityTokenReference {
    pub token_type: Option<String>,
    pub key_identifier: Option<KeyIdentifier>,
    pub reference: Option<Reference>,
}

/// Locates an issued token inside or outside the response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedReference {
    pub security_token_reference: SecurityTokenReference,
}

impl RequestedReference {
    /// Reference by key identifier with a local `#id` value
    pub fn key_identifier(value_type: &str, id: &str, token_type: Option<&str>) -> Self {
        Self {
            security_token_reference: SecurityTokenReference {
                token_type: token_type.map(str::to_string),
                key_identifier: Some(KeyIdentifier {
                    value_type: Some(value_type.to_string()),
                    value: format!("#{id}"),
                }),
                reference: None,
            },
        }
    }
}

/// `wsse:BinarySecurityToken` carried in the SOAP header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinarySecurityToken {
    pub value_type: Option<String>,
    pub encoding_type: Option<String>,
    pub value: String,
}

/// Encrypted symmetric key for the relying party
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedKey {
    pub algorithm: String,
    pub cipher_value: String,
}

/// Proof-of-possession key information placed in issued tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyInfo {
    EncryptedKey(EncryptedKey),
    /// Base64 DER certificate
    X509Certificate(String),
    KeyValue(XmlElement),
    /// Client supplied `ds:KeyInfo`, echoed untouched
    Element(XmlElement),
}

impl KeyInfo {
    /// Renders the `ds:KeyInfo` element
    pub fn to_element(&self) -> XmlElement {
        let key_info = XmlElement::new(ns::DSIG, prefix::DSIG, elements::KEY_INFO);
        match self {
            Self::EncryptedKey(key) => key_info.with_child(
                XmlElement::new(ns::XENC, prefix::XENC, "EncryptedKey")
                    .with_child(
                        XmlElement::new(ns::XENC, prefix::XENC, "EncryptionMethod")
                            .with_attribute(attributes::ALGORITHM, key.algorithm.clone()),
                    )
                    .with_child(XmlElement::new(ns::XENC, prefix::XENC, "CipherData").with_child(
                        XmlElement::text_element(
                            ns::XENC,
                            prefix::XENC,
                            "CipherValue",
                            &key.cipher_value,
                        ),
                    )),
            ),
            Self::X509Certificate(cert) => key_info.with_child(
                XmlElement::new(ns::DSIG, prefix::DSIG, elements::X509_DATA).with_child(
                    XmlElement::text_element(
                        ns::DSIG,
                        prefix::DSIG,
                        elements::X509_CERTIFICATE,
                        cert,
                    ),
                ),
            ),
            Self::KeyValue(value) => key_info.with_child(value.clone()),
            Self::Element(element) => element.clone(),
        }
    }
}

/// Token produced by a provider. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityToken {
    token_type: String,
    token: XmlElement,
    id: String,
}

impl SecurityToken {
    pub fn new(token_type: impl Into<String>, token: XmlElement, id: impl Into<String>) -> Self {
        Self {
            token_type: token_type.into(),
            token,
            id: id.into(),
        }
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    pub fn token(&self) -> &XmlElement {
        &self.token
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// WS-Trust request
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequestSecurityToken {
    pub context: Option<String>,
    pub request_type: Option<RequestType>,
    pub token_type: Option<String>,
    pub applies_to: Option<AppliesTo>,
    pub lifetime: Option<Lifetime>,
    pub on_behalf_of: Option<OnBehalfOf>,
    pub key_type: Option<KeyType>,
    pub key_size: Option<u32>,
    pub entropy: Option<Entropy>,
    pub use_key: Option<UseKey>,
    pub target: Option<TokenTarget>,
    pub issuer: Option<EndpointReference>,
    pub computed_key_algorithm: Option<String>,
    pub key_wrap_algorithm: Option<String>,
    pub signature_algorithm: Option<String>,
    pub renewing: Option<Renewing>,
    pub claims: Option<Claims>,
    /// Extension elements resolved by the parser registry without a typed slot
    pub extensions: Vec<XmlElement>,
    /// Binary token found in the SOAP header of the carrying message
    pub binary_token: Option<BinarySecurityToken>,
    /// Document the request was parsed from
    pub source: Option<Arc<XmlElement>>,
}

impl RequestSecurityToken {
    pub fn new(request_type: RequestType) -> Self {
        Self {
            request_type: Some(request_type),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = Some(token_type.into());
        self
    }

    pub fn with_applies_to(mut self, address: impl Into<String>) -> Self {
        self.applies_to = Some(AppliesTo::new(address));
        self
    }

    pub fn with_target(mut self, target: TokenTarget) -> Self {
        self.target = Some(target);
        self
    }
}

/// WS-Trust response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequestSecurityTokenResponse {
    pub context: Option<String>,
    pub request_type: Option<RequestType>,
    pub token_type: Option<String>,
    pub applies_to: Option<AppliesTo>,
    pub lifetime: Option<Lifetime>,
    pub on_behalf_of: Option<OnBehalfOf>,
    pub key_type: Option<KeyType>,
    pub key_size: Option<u32>,
    pub entropy: Option<Entropy>,
    pub use_key: Option<UseKey>,
    pub issuer: Option<EndpointReference>,
    pub computed_key_algorithm: Option<String>,
    pub renewing: Option<Renewing>,
    pub requested_security_token: Option<XmlElement>,
    pub requested_proof_token: Option<RequestedProofToken>,
    pub requested_attached_reference: Option<RequestedReference>,
    pub requested_unattached_reference: Option<RequestedReference>,
    pub status: Option<Status>,
    pub requested_token_cancelled: bool,
    pub extensions: Vec<XmlElement>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequestSecurityTokenCollection {
    pub requests: Vec<RequestSecurityToken>,
}

/// Outer envelope of every response, even a single one
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequestSecurityTokenResponseCollection {
    pub responses: Vec<RequestSecurityTokenResponse>,
}

/// Any top-level WS-Trust message
#[derive(Debug, Clone, PartialEq)]
pub enum WsTrustMessage {
    Request(RequestSecurityToken),
    RequestCollection(RequestSecurityTokenCollection),
    Response(RequestSecurityTokenResponse),
    ResponseCollection(RequestSecurityTokenResponseCollection),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_type_round_trip() {
        assert_eq!(
            RequestType::from_uri(constants::ISSUE_REQUEST),
            RequestType::Issue
        );
        let other = RequestType::from_uri("urn:custom");
        assert_eq!(other, RequestType::Other("urn:custom".to_string()));
        assert_eq!(other.as_uri(), "urn:custom");
    }

    #[test]
    fn test_key_type_is_case_insensitive() {
        let upper = constants::KEY_TYPE_SYMMETRIC.to_uppercase();
        assert_eq!(KeyType::from_uri(&upper), KeyType::Symmetric);
        assert_eq!(
            KeyType::from_uri(constants::KEY_TYPE_PUBLIC),
            KeyType::Public
        );
    }

    #[test]
    fn test_binary_secret_decoding() {
        let secret = BinarySecret::nonce(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(
            secret.secret_type.as_deref(),
            Some(constants::BINARY_SECRET_NONCE)
        );
        assert_eq!(secret.decode().unwrap(), vec![1, 2, 3, 4, 5, 6, 7, 8]);

        let wrapped = BinarySecret {
            secret_type: None,
            value: "AQID\n BAUG".to_string(),
        };
        assert_eq!(wrapped.decode().unwrap(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_lifetime_contains_with_skew() {
        let lifetime = Lifetime::starting_now(Duration::seconds(60));
        let now = Utc::now();
        assert!(lifetime.contains(now, Duration::zero()));
        assert!(!lifetime.contains(now + Duration::seconds(120), Duration::zero()));
        assert!(lifetime.contains(now + Duration::seconds(61), Duration::seconds(5)));
    }

    #[test]
    fn test_lifetime_saturates_at_latest_instant() {
        let lifetime = Lifetime::starting_now(Duration::MAX);
        assert_eq!(lifetime.expires, DateTime::<Utc>::MAX_UTC);
        assert!(lifetime.contains(Utc::now(), Duration::seconds(5)));
        assert!(lifetime.contains(Utc::now(), Duration::MAX));
    }

    #[test]
    fn test_encrypted_key_info_element() {
        let info = KeyInfo::EncryptedKey(EncryptedKey {
            algorithm: constants::algorithms::RSA_OAEP.to_string(),
            cipher_value: "AAAA".to_string(),
        });
        let element = info.to_element();
        assert!(element.name().is(ns::DSIG, elements::KEY_INFO));
        assert_eq!(
            element
                .find(ns::XENC, "CipherValue")
                .map(XmlElement::text)
                .as_deref(),
            Some("AAAA")
        );
    }
}
