use base64::{Engine, engine::general_purpose::STANDARD as BASE64};

use crate::crypto::{Certificate, HashAlg, rsa::RsaPrivateKey};
use crate::wstrust::constants::{ns, prefix};
use crate::xml::XmlElement;
use crate::xmlsec::{Result, algorithms, c14n, element_id};

/// Key material and algorithms for signing tokens
pub struct SignConfig<'a> {
    pub private_key: &'a RsaPrivateKey,

    /// Certificate published in the signature's `KeyInfo`
    pub certificate: Option<&'a Certificate>,

    /// Digest of the RSA signature over `SignedInfo`
    pub signature_hash: HashAlg,
}

impl<'a> SignConfig<'a> {
    pub fn new(private_key: &'a RsaPrivateKey) -> Self {
        Self {
            private_key,
            certificate: None,
            signature_hash: HashAlg::Sha256,
        }
    }

    pub fn with_certificate(mut self, certificate: Option<&'a Certificate>) -> Self {
        self.certificate = certificate;
        self
    }

    pub fn with_signature_hash(mut self, hash: HashAlg) -> Self {
        self.signature_hash = hash;
        self
    }
}

fn ds(local_name: &str) -> XmlElement {
    XmlElement::new(ns::DSIG, prefix::DSIG, local_name)
}

fn algorithm(local_name: &str, uri: &str) -> XmlElement {
    ds(local_name).with_attribute("Algorithm", uri)
}

/// Returns a copy of `element` carrying an enveloped signature.
///
/// The signature is placed after the element's `Issuer` child when it has
/// one (as SAML 2.0 requires), last in a SAML 1.1 assertion and first
/// otherwise.
pub fn sign_element(element: &XmlElement, config: &SignConfig<'_>) -> Result<XmlElement> {
    let uri = element_id(element)
        .map(|id| format!("#{id}"))
        .unwrap_or_default();

    let canonical = c14n::canonicalize(element.to_xml()?, None)?;
    let digest = HashAlg::Sha256.hash(canonical.as_bytes())?;

    let signature_method = match config.signature_hash {
        HashAlg::Sha1 => algorithms::RSA_SHA1,
        HashAlg::Sha256 => algorithms::RSA_SHA256,
    };

    let signed_info = ds("SignedInfo")
        .with_child(algorithm("CanonicalizationMethod", algorithms::EXCLUSIVE_C14N))
        .with_child(algorithm("SignatureMethod", signature_method))
        .with_child(
            ds("Reference")
                .with_attribute("URI", uri)
                .with_child(
                    ds("Transforms")
                        .with_child(algorithm("Transform", algorithms::ENVELOPED_SIGNATURE))
                        .with_child(algorithm("Transform", algorithms::EXCLUSIVE_C14N)),
                )
                .with_child(algorithm("DigestMethod", algorithms::SHA256))
                .with_child(ds("DigestValue").with_text(BASE64.encode(&digest))),
        );

    let signed_info_c14n = c14n::canonicalize(signed_info.to_xml()?, None)?;
    let signature_value = config
        .private_key
        .sign(signed_info_c14n.as_bytes(), config.signature_hash)?;

    let key_info = config.certificate.map(|cert| {
        ds("KeyInfo").with_child(
            ds("X509Data").with_child(ds("X509Certificate").with_text(cert.to_base64())),
        )
    });

    let signature = ds("Signature")
        .with_child(signed_info)
        .with_child(ds("SignatureValue").with_text(BASE64.encode(&signature_value)))
        .with_optional_child(key_info);

    let mut signed = element.clone();
    let position = if signed.attribute("AssertionID").is_some() {
        signed.elements().count()
    } else {
        signed
            .elements()
            .position(|child| child.local_name() == "Issuer")
            .map_or(0, |idx| idx + 1)
    };
    insert_element(&mut signed, position, signature);
    Ok(signed)
}

/// Inserts `child` before the element child at `element_index`
fn insert_element(parent: &mut XmlElement, element_index: usize, child: XmlElement) {
    let node_index = parent
        .nodes()
        .iter()
        .enumerate()
        .filter(|(_, node)| matches!(node, crate::xml::Node::Element(_)))
        .nth(element_index)
        .map_or(parent.nodes().len(), |(idx, _)| idx);
    parent.insert_child(node_index, child);
}
