//! XML signature and encryption of issued tokens.
//!
//! Tokens are signed with an enveloped signature over their exclusive
//! canonical form and may be replaced by `xenc:EncryptedData` for the
//! relying party.

mod c14n;
mod encrypt;
mod error;
mod signer;
mod verifier;

pub use c14n::canonicalize;
pub use encrypt::{decrypt_element, encrypt_element};
pub use error::Error;
pub use signer::{SignConfig, sign_element};
pub use verifier::verify_element;

use serde::Deserialize;

use crate::crypto::HashAlg;
use crate::xml::XmlElement;

pub type Result<T> = std::result::Result<T, Error>;

pub mod algorithms {
    pub const SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
    pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

    pub const RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
    pub const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";

    pub const EXCLUSIVE_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
    pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

    pub const ELEMENT_TYPE: &str = "http://www.w3.org/2001/04/xmlenc#Element";
}

/// Digest behind an RSA signature method URI
pub fn signature_hash(uri: &str) -> Option<HashAlg> {
    match uri {
        algorithms::RSA_SHA1 => Some(HashAlg::Sha1),
        algorithms::RSA_SHA256 => Some(HashAlg::Sha256),
        _ => None,
    }
}

/// Value of the identifier attribute a signature reference points to
pub(crate) fn element_id(element: &XmlElement) -> Option<&str> {
    ["ID", "Id", "AssertionID"]
        .into_iter()
        .find_map(|name| element.attribute(name))
}

#[derive(Debug, Clone, Deserialize)]
pub struct Signature {
    #[serde(rename = "SignedInfo", alias = "ds:SignedInfo")]
    pub signed_info: SignedInfo,

    #[serde(rename = "SignatureValue", alias = "ds:SignatureValue")]
    pub signature_value: String,

    #[serde(rename = "KeyInfo", alias = "ds:KeyInfo", default)]
    pub key_info: Option<KeyInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignedInfo {
    #[serde(rename = "CanonicalizationMethod", alias = "ds:CanonicalizationMethod")]
    pub canon_method: AlgorithmRef,

    #[serde(rename = "SignatureMethod", alias = "ds:SignatureMethod")]
    pub signature_method: AlgorithmRef,

    #[serde(rename = "Reference", alias = "ds:Reference", default)]
    pub references: Vec<Reference>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlgorithmRef {
    #[serde(rename = "@Algorithm")]
    pub algorithm: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reference {
    #[serde(rename = "@URI", default)]
    pub uri: String,

    #[serde(rename = "Transforms", alias = "ds:Transforms", default)]
    pub transforms: Option<Transforms>,

    #[serde(rename = "DigestMethod", alias = "ds:DigestMethod")]
    pub digest_method: AlgorithmRef,

    #[serde(rename = "DigestValue", alias = "ds:DigestValue")]
    pub digest_value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Transforms {
    #[serde(rename = "Transform", alias = "ds:Transform", default)]
    pub transform: Vec<Transform>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Transform {
    #[serde(rename = "@Algorithm")]
    pub algorithm: String,

    #[serde(rename = "InclusiveNamespaces", alias = "ec:InclusiveNamespaces", default)]
    pub inclusive_ns: Option<InclusiveNamespaces>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InclusiveNamespaces {
    #[serde(rename = "@PrefixList", default)]
    pub prefix_list: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyInfo {
    #[serde(rename = "X509Data", alias = "ds:X509Data", default)]
    pub x509_data: Option<X509Data>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct X509Data {
    #[serde(rename = "X509Certificate", alias = "ds:X509Certificate", default)]
    pub certificate: Option<String>,
}
