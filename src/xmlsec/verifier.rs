use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use quick_xml::de::from_str as xml_from_str;

use crate::crypto::{HashAlg, rsa::RsaPublicKey};
use crate::wstrust::constants::ns;
use crate::xml::XmlElement;
use crate::xmlsec::*;

/// Verifies the enveloped signature of `element` against `public_key`
pub fn verify_element(element: &XmlElement, public_key: &RsaPublicKey) -> Result<()> {
    let signature_element = element
        .child(ns::DSIG, "Signature")
        .ok_or_else(|| Error::MissingSignature(element.name().to_string()))?;
    let signature: Signature = xml_from_str(&signature_element.to_xml()?)?;

    let [reference] = signature.signed_info.references.as_slice() else {
        return Err(Error::InvalidSignature(format!(
            "expected exactly one reference, found {}",
            signature.signed_info.references.len()
        )));
    };
    verify_reference(element, reference)?;

    if signature.signed_info.canon_method.algorithm != algorithms::EXCLUSIVE_C14N {
        return Err(Error::UnsupportedAlgorithm(
            signature.signed_info.canon_method.algorithm.clone(),
        ));
    }
    let signed_info = signature_element
        .child(ns::DSIG, "SignedInfo")
        .ok_or_else(|| Error::InvalidSignature("missing SignedInfo".into()))?;
    let signed_info_c14n = c14n::canonicalize(signed_info.to_xml()?, None)?;

    let hash_alg = signature_hash(&signature.signed_info.signature_method.algorithm).ok_or_else(
        || Error::UnsupportedAlgorithm(signature.signed_info.signature_method.algorithm.clone()),
    )?;
    let compact: String = signature.signature_value.split_whitespace().collect();
    let signature_bytes = BASE64.decode(compact)?;

    if !public_key.verify(signed_info_c14n.as_bytes(), &signature_bytes, hash_alg)? {
        return Err(Error::InvalidSignature("signature value does not match".into()));
    }
    Ok(())
}

/// Checks that the reference covers `element` and that its digest matches
fn verify_reference(element: &XmlElement, reference: &Reference) -> Result<()> {
    match (reference.uri.strip_prefix('#'), element_id(element)) {
        (None, _) if reference.uri.is_empty() => {}
        (Some(id), Some(own)) if id == own => {}
        _ => {
            return Err(Error::InvalidSignature(format!(
                "reference {} does not point at the signed element",
                reference.uri
            )));
        }
    }

    let mut unsigned = element.clone();
    unsigned.retain_elements(|child| !child.name().is(ns::DSIG, "Signature"));
    let transformed = apply_transforms(&unsigned.to_xml()?, &reference.transforms)?;

    let hash_alg = HashAlg::from_uri(&reference.digest_method.algorithm)
        .map_err(|_| Error::UnsupportedAlgorithm(reference.digest_method.algorithm.clone()))?;
    let computed_digest = hash_alg.hash(transformed.as_bytes())?;
    let compact: String = reference.digest_value.split_whitespace().collect();
    let expected_digest = BASE64.decode(compact)?;

    if computed_digest != expected_digest {
        return Err(Error::InvalidSignature(format!(
            "digest mismatch for reference '{}'",
            reference.uri
        )));
    }
    Ok(())
}

/// The enveloped transform is applied by the caller; the signature element
/// is already gone.
fn apply_transforms(data: &str, transforms: &Option<Transforms>) -> Result<String> {
    let mut prefixes: Option<Vec<&str>> = None;
    if let Some(transforms) = transforms {
        for transform in &transforms.transform {
            match transform.algorithm.as_str() {
                algorithms::ENVELOPED_SIGNATURE => {}
                algorithms::EXCLUSIVE_C14N => {
                    prefixes = transform
                        .inclusive_ns
                        .as_ref()
                        .map(|inclusive| inclusive.prefix_list.split_whitespace().collect());
                }
                alg => return Err(Error::UnsupportedAlgorithm(alg.to_string())),
            }
        }
    }
    c14n::canonicalize(data, prefixes.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Certificate;
    use crate::crypto::rsa::RsaPrivateKey;
    use crate::xml::ElementReader;

    const STS_KEY: &[u8] = include_bytes!("../../test_data/sts/sts.key");
    const STS_CERT: &[u8] = include_bytes!("../../test_data/sts/sts.crt");
    const SP_KEY: &[u8] = include_bytes!("../../test_data/sts/sp.key");

    const ASSERTION: &str = r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="ID_1" Version="2.0"><saml:Issuer>sts</saml:Issuer><saml:Subject><saml:NameID>alice &amp; bob</saml:NameID></saml:Subject></saml:Assertion>"#;

    fn assertion() -> XmlElement {
        ElementReader::new(ASSERTION).unwrap().raw_subtree().unwrap()
    }

    fn sign(element: &XmlElement) -> XmlElement {
        let key = RsaPrivateKey::from_pem(STS_KEY).unwrap();
        let cert = Certificate::from_pem(STS_CERT).unwrap();
        sign_element(element, &SignConfig::new(&key).with_certificate(Some(&cert))).unwrap()
    }

    fn sts_public_key() -> RsaPublicKey {
        RsaPrivateKey::from_pem(STS_KEY).unwrap().public_key().unwrap()
    }

    #[test]
    fn test_sign_and_verify() {
        let signed = sign(&assertion());

        // Signature follows the issuer
        let names: Vec<_> = signed.elements().map(|el| el.local_name().to_string()).collect();
        assert_eq!(names, ["Issuer", "Signature", "Subject"]);
        let reference = signed.find(ns::DSIG, "Reference").unwrap();
        assert_eq!(reference.attribute("URI"), Some("#ID_1"));
        assert!(signed.find(ns::DSIG, "X509Certificate").is_some());

        verify_element(&signed, &sts_public_key()).unwrap();
    }

    #[test]
    fn test_saml11_signature_is_last() {
        let xml = r#"<saml1:Assertion xmlns:saml1="urn:oasis:names:tc:SAML:1.0:assertion" AssertionID="ID_11" MajorVersion="1" MinorVersion="1" Issuer="sts"><saml1:Conditions/><saml1:AuthenticationStatement/></saml1:Assertion>"#;
        let signed = sign(&ElementReader::new(xml).unwrap().raw_subtree().unwrap());

        let names: Vec<_> = signed.elements().map(|el| el.local_name().to_string()).collect();
        assert_eq!(names, ["Conditions", "AuthenticationStatement", "Signature"]);
        let reference = signed.find(ns::DSIG, "Reference").unwrap();
        assert_eq!(reference.attribute("URI"), Some("#ID_11"));

        verify_element(&signed, &sts_public_key()).unwrap();
    }

    #[test]
    fn test_signature_survives_reparsing() {
        let signed = sign(&assertion());
        let wrapped = format!(
            r#"<wst:RequestedSecurityToken xmlns:wst="urn:wst">{}</wst:RequestedSecurityToken>"#,
            signed.to_xml().unwrap()
        );
        let mut reader = ElementReader::new(&wrapped).unwrap();
        reader.next_start().unwrap();
        let reparsed = reader.raw_subtree().unwrap();
        verify_element(&reparsed, &sts_public_key()).unwrap();
    }

    #[test]
    fn test_tampered_element_fails() {
        let signed = sign(&assertion());
        let tampered_xml = signed.to_xml().unwrap().replace("alice &amp; bob", "mallory");
        let tampered = ElementReader::new(&tampered_xml).unwrap().raw_subtree().unwrap();

        let err = verify_element(&tampered, &sts_public_key()).unwrap_err();
        assert!(matches!(err, Error::InvalidSignature(msg) if msg.contains("digest mismatch")));
    }

    #[test]
    fn test_wrong_key_fails() {
        let signed = sign(&assertion());
        let other = RsaPrivateKey::from_pem(SP_KEY).unwrap().public_key().unwrap();
        assert!(matches!(
            verify_element(&signed, &other),
            Err(Error::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_unsigned_element() {
        assert!(matches!(
            verify_element(&assertion(), &sts_public_key()),
            Err(Error::MissingSignature(_))
        ));
    }
}
