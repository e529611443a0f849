//! Namespaces, URIs and element names of WS-Trust 1.3 and its companions.

/// WS-Trust 1.3 base URI
pub const BASE_NAMESPACE: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512";
pub const PREFIX: &str = "wst";

pub const ISSUE_REQUEST: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Issue";
pub const RENEW_REQUEST: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Renew";
pub const CANCEL_REQUEST: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Cancel";
pub const VALIDATE_REQUEST: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Validate";
pub const BATCH_ISSUE_REQUEST: &str =
    "http://docs.oasis-open.org/ws-sx/ws-trust/200512/BatchIssue";

pub const KEY_TYPE_BEARER: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Bearer";
pub const KEY_TYPE_SYMMETRIC: &str =
    "http://docs.oasis-open.org/ws-sx/ws-trust/200512/SymmetricKey";
pub const KEY_TYPE_PUBLIC: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/PublicKey";

pub const BINARY_SECRET_NONCE: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Nonce";
pub const BINARY_SECRET_SYMMETRIC: &str =
    "http://docs.oasis-open.org/ws-sx/ws-trust/200512/SymmetricKey";
pub const CK_PSHA1: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/CK/PSHA1";

/// Token type requested by Validate when the caller only wants a status
pub const STATUS_TYPE: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/RSTR/Status";
pub const STATUS_CODE_VALID: &str =
    "http://docs.oasis-open.org/ws-sx/ws-trust/200512/status/valid";
pub const STATUS_CODE_INVALID: &str =
    "http://docs.oasis-open.org/ws-sx/ws-trust/200512/status/invalid";

/// Key size used when the request does not ask for one
pub const DEFAULT_KEY_SIZE: u32 = 128;
/// Largest proof key, in bits, the service generates
pub const MAX_KEY_SIZE: u32 = 4096;

pub mod ns {
    pub const WSP: &str = "http://schemas.xmlsoap.org/ws/2004/09/policy";
    pub const WSP_15: &str = "http://www.w3.org/ns/ws-policy";
    pub const WSA: &str = "http://www.w3.org/2005/08/addressing";
    pub const WSSE: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
    pub const WSSE11: &str = "http://docs.oasis-open.org/wss/oasis-wss-wssecurity-secext-1.1.xsd";
    pub const WSU: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";
    pub const DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";
    pub const XENC: &str = "http://www.w3.org/2001/04/xmlenc#";
}

pub mod prefix {
    pub const WSP: &str = "wsp";
    pub const WSA: &str = "wsa";
    pub const WSSE: &str = "wsse";
    pub const WSSE11: &str = "wsse11";
    pub const WSU: &str = "wsu";
    pub const DSIG: &str = "ds";
    pub const XENC: &str = "xenc";
}

/// Local names of the WS-Trust vocabulary
pub mod elements {
    pub const RST: &str = "RequestSecurityToken";
    pub const RST_COLLECTION: &str = "RequestSecurityTokenCollection";
    pub const RSTR: &str = "RequestSecurityTokenResponse";
    pub const RSTR_COLLECTION: &str = "RequestSecurityTokenResponseCollection";
    pub const REQUEST_TYPE: &str = "RequestType";
    pub const TOKEN_TYPE: &str = "TokenType";
    pub const LIFETIME: &str = "Lifetime";
    pub const CREATED: &str = "Created";
    pub const EXPIRES: &str = "Expires";
    pub const CANCEL_TARGET: &str = "CancelTarget";
    pub const VALIDATE_TARGET: &str = "ValidateTarget";
    pub const RENEW_TARGET: &str = "RenewTarget";
    pub const ON_BEHALF_OF: &str = "OnBehalfOf";
    pub const KEY_TYPE: &str = "KeyType";
    pub const KEY_SIZE: &str = "KeySize";
    pub const ENTROPY: &str = "Entropy";
    pub const BINARY_SECRET: &str = "BinarySecret";
    pub const ISSUER: &str = "Issuer";
    pub const SECONDARY_PARAMETERS: &str = "SecondaryParameters";
    pub const USE_KEY: &str = "UseKey";
    pub const COMPUTED_KEY_ALGORITHM: &str = "ComputedKeyAlgorithm";
    pub const COMPUTED_KEY: &str = "ComputedKey";
    pub const KEY_WRAP_ALGORITHM: &str = "KeyWrapAlgorithm";
    pub const SIGNATURE_ALGORITHM: &str = "SignatureAlgorithm";
    pub const RENEWING: &str = "Renewing";
    pub const CLAIMS: &str = "Claims";
    pub const REQUESTED_TOKEN_CANCELLED: &str = "RequestedTokenCancelled";
    pub const REQUESTED_PROOF_TOKEN: &str = "RequestedProofToken";
    pub const REQUESTED_TOKEN: &str = "RequestedSecurityToken";
    pub const REQUESTED_ATTACHED_REFERENCE: &str = "RequestedAttachedReference";
    pub const REQUESTED_UNATTACHED_REFERENCE: &str = "RequestedUnattachedReference";
    pub const STATUS: &str = "Status";
    pub const CODE: &str = "Code";
    pub const REASON: &str = "Reason";
    pub const APPLIES_TO: &str = "AppliesTo";
    pub const ENDPOINT_REFERENCE: &str = "EndpointReference";
    pub const ADDRESS: &str = "Address";
    pub const USERNAME_TOKEN: &str = "UsernameToken";
    pub const USERNAME: &str = "Username";
    pub const SECURITY_TOKEN_REFERENCE: &str = "SecurityTokenReference";
    pub const KEY_IDENTIFIER: &str = "KeyIdentifier";
    pub const REFERENCE: &str = "Reference";
    pub const BINARY_SECURITY_TOKEN: &str = "BinarySecurityToken";
    pub const X509_CERTIFICATE: &str = "X509Certificate";
    pub const X509_DATA: &str = "X509Data";
    pub const KEY_VALUE: &str = "KeyValue";
    pub const RSA_KEY_VALUE: &str = "RSAKeyValue";
    pub const MODULUS: &str = "Modulus";
    pub const EXPONENT: &str = "Exponent";
    pub const KEY_INFO: &str = "KeyInfo";
}

/// Attribute names
pub mod attributes {
    pub const CONTEXT: &str = "Context";
    pub const TYPE: &str = "Type";
    pub const DIALECT: &str = "Dialect";
    pub const ALLOW: &str = "Allow";
    pub const OK: &str = "OK";
    pub const ID: &str = "Id";
    pub const VALUE_TYPE: &str = "ValueType";
    pub const ENCODING_TYPE: &str = "EncodingType";
    pub const TOKEN_TYPE: &str = "TokenType";
    pub const URI: &str = "URI";
    pub const ALGORITHM: &str = "Algorithm";
}

/// XML encryption and key-wrap algorithms
pub mod algorithms {
    pub const RSA_OAEP: &str = "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p";
    pub const RSA_V15: &str = "http://www.w3.org/2001/04/xmlenc#rsa-1_5";
    pub const AES128_CBC: &str = "http://www.w3.org/2001/04/xmlenc#aes128-cbc";
    pub const ELEMENT_TYPE: &str = "http://www.w3.org/2001/04/xmlenc#Element";
    pub const EXCLUSIVE_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
    pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
    pub const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
    pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
}
