//! Proof-of-possession key negotiation for Issue requests.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use tracing::{debug, warn};

use crate::crypto::rsa::{KeyWrap, RsaPublicKey};
use crate::crypto::{Certificate, SecureBytes, generate_random_bytes, psha1};
use crate::wstrust::constants::{self, algorithms, elements, ns};
use crate::wstrust::context::Principal;
use crate::wstrust::error::WsTrustError;
use crate::wstrust::model::{
    BinarySecret, EncryptedKey, Entropy, KeyInfo, KeyType, RequestSecurityToken,
    RequestedProofToken, UseKey,
};
use crate::wstrust::registry::KeyManager;
use crate::xml::XmlElement;

/// Proof material for one Issue request
#[derive(Debug, Clone)]
pub struct KeyNegotiation {
    pub key_type: KeyType,
    /// Key size in bits, echoed in the response
    pub key_size: u32,
    pub proof_token: Option<RequestedProofToken>,
    pub server_entropy: Option<Entropy>,
    /// Key information embedded in the issued token
    pub key_info: Option<KeyInfo>,
}

/// Requested key size, falling back to the default for absent or zero sizes
pub fn effective_key_size(request: &RequestSecurityToken) -> u32 {
    request
        .key_size
        .filter(|size| *size != 0)
        .unwrap_or(constants::DEFAULT_KEY_SIZE)
}

/// Key transport algorithm asked for by the request, RSA-OAEP otherwise
pub fn key_wrap(request: &RequestSecurityToken) -> KeyWrap {
    match request.key_wrap_algorithm.as_deref() {
        Some(algorithms::RSA_V15) => KeyWrap::RsaV15,
        _ => KeyWrap::RsaOaep,
    }
}

/// Works out the proof key of an Issue request.
///
/// `service_key` protects symmetric keys for the relying party; the key
/// manager supplies certificates registered for the caller.
pub fn negotiate(
    request: &RequestSecurityToken,
    caller: Option<&Principal>,
    service_key: Option<&RsaPublicKey>,
    key_manager: &KeyManager,
) -> Result<KeyNegotiation, WsTrustError> {
    let key_size = effective_key_size(request);
    if key_size > constants::MAX_KEY_SIZE {
        return Err(WsTrustError::InvalidKeySize(key_size));
    }
    let key_type = request.key_type.clone().unwrap_or_else(|| {
        debug!("No key type in request, using Bearer");
        KeyType::Bearer
    });

    let mut negotiation = KeyNegotiation {
        key_type: key_type.clone(),
        key_size,
        proof_token: None,
        server_entropy: None,
        key_info: None,
    };

    match key_type {
        KeyType::Bearer => {}
        KeyType::Symmetric => symmetric(request, service_key, &mut negotiation)?,
        KeyType::Public => {
            negotiation.key_info = Some(public_key_info(request, caller, key_manager)?);
        }
        KeyType::Other(uri) => return Err(WsTrustError::UnsupportedKeyType(uri)),
    }
    Ok(negotiation)
}

fn symmetric(
    request: &RequestSecurityToken,
    service_key: Option<&RsaPublicKey>,
    negotiation: &mut KeyNegotiation,
) -> Result<(), WsTrustError> {
    let length = negotiation.key_size.div_ceil(8) as usize;
    let server_secret = generate_random_bytes(length)?;

    let client_secret = match &request.entropy {
        Some(entropy) => {
            negotiation.server_entropy = Some(Entropy {
                binary_secret: BinarySecret::nonce(&server_secret),
            });
            entropy
                .binary_secret
                .decode()
                .map_err(crate::crypto::Error::from)?
        }
        None => Vec::new(),
    };

    let proof_key = if client_secret.is_empty() {
        negotiation.proof_token = Some(RequestedProofToken::BinarySecret(BinarySecret::new(
            Some(constants::BINARY_SECRET_SYMMETRIC),
            &server_secret,
        )));
        SecureBytes::new(server_secret)
    } else {
        debug!(length, "Combining client and server entropy");
        negotiation.proof_token = Some(RequestedProofToken::ComputedKey(
            constants::CK_PSHA1.to_string(),
        ));
        psha1::p_sha1(&client_secret, &server_secret, length)?
    };

    negotiation.key_info = match service_key {
        Some(key) => {
            let key_wrap = key_wrap(request);
            let wrapped = key.wrap_key(proof_key.expose_secret(), key_wrap)?;
            Some(KeyInfo::EncryptedKey(EncryptedKey {
                algorithm: key_wrap.uri().to_string(),
                cipher_value: BASE64.encode(wrapped),
            }))
        }
        None => {
            warn!("No service provider key available, proof key is not embedded in the token");
            None
        }
    };
    Ok(())
}

fn public_key_info(
    request: &RequestSecurityToken,
    caller: Option<&Principal>,
    key_manager: &KeyManager,
) -> Result<KeyInfo, WsTrustError> {
    if let Some(cert) = caller.and_then(|principal| key_manager.certificate(principal.name())) {
        debug!("Using the caller certificate from the key store");
        return Ok(KeyInfo::X509Certificate(cert.to_base64()));
    }

    match &request.use_key {
        Some(UseKey::Certificate(encoded)) => {
            let cert = Certificate::from_base64(encoded)
                .map_err(|e| WsTrustError::UnsupportedUseKey(format!("invalid certificate: {e}")))?;
            Ok(KeyInfo::X509Certificate(cert.to_base64()))
        }
        Some(UseKey::KeyValue(key_value)) => {
            rsa_key_value(key_value)?;
            Ok(KeyInfo::KeyValue(key_value.clone()))
        }
        Some(UseKey::KeyInfo(key_info)) => Ok(KeyInfo::Element(key_info.clone())),
        Some(UseKey::Opaque(element)) => {
            Err(WsTrustError::UnsupportedUseKey(element.name().to_string()))
        }
        None => Err(WsTrustError::UnableToLocateClientPublicKey),
    }
}

/// Checks that a `ds:KeyValue` holds a usable RSA key
fn rsa_key_value(key_value: &XmlElement) -> Result<RsaPublicKey, WsTrustError> {
    let invalid = |reason: &str| WsTrustError::UnsupportedUseKey(format!("KeyValue: {reason}"));
    let rsa = key_value
        .child(ns::DSIG, elements::RSA_KEY_VALUE)
        .ok_or_else(|| invalid("only RSAKeyValue is supported"))?;
    let component = |name: &str| -> Result<Vec<u8>, WsTrustError> {
        let text = rsa
            .child_text(ns::DSIG, name)
            .ok_or_else(|| invalid(&format!("missing {name}")))?;
        let compact: String = text.split_whitespace().collect();
        BASE64
            .decode(compact)
            .map_err(|e| invalid(&format!("{name}: {e}")))
    };
    let modulus = component(elements::MODULUS)?;
    let exponent = component(elements::EXPONENT)?;
    RsaPublicKey::from_components(&modulus, &exponent).map_err(|e| invalid(&e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::rsa::RsaPrivateKey;
    use crate::wstrust::constants::prefix;
    use crate::wstrust::model::RequestType;

    const SP_KEY: &[u8] = include_bytes!("../../test_data/sts/sp.key");
    const CLIENT_CERT: &[u8] = include_bytes!("../../test_data/sts/client.crt");

    fn sp_key() -> RsaPrivateKey {
        RsaPrivateKey::from_pem(SP_KEY).unwrap()
    }

    fn request(key_type: KeyType) -> RequestSecurityToken {
        let mut request = RequestSecurityToken::new(RequestType::Issue);
        request.key_type = Some(key_type);
        request
    }

    fn unwrap_proof_key(key_info: &KeyInfo, key: &RsaPrivateKey) -> Vec<u8> {
        let KeyInfo::EncryptedKey(encrypted) = key_info else {
            panic!("expected an encrypted key, got {key_info:?}");
        };
        let wrap = KeyWrap::from_uri(&encrypted.algorithm).unwrap();
        key.unwrap_key(&BASE64.decode(&encrypted.cipher_value).unwrap(), wrap)
            .unwrap()
    }

    #[test]
    fn test_symmetric_without_entropy() {
        let sp = sp_key();
        let negotiation = negotiate(
            &request(KeyType::Symmetric),
            None,
            Some(&sp.public_key().unwrap()),
            &KeyManager::default(),
        )
        .unwrap();

        assert_eq!(negotiation.key_size, 128);
        assert!(negotiation.server_entropy.is_none());
        let Some(RequestedProofToken::BinarySecret(secret)) = &negotiation.proof_token else {
            panic!("expected a binary secret");
        };
        assert_eq!(secret.secret_type.as_deref(), Some(constants::BINARY_SECRET_SYMMETRIC));
        let secret = secret.decode().unwrap();
        assert_eq!(secret.len(), 16);

        let key_info = negotiation.key_info.unwrap();
        assert_eq!(unwrap_proof_key(&key_info, &sp), secret);
    }

    #[test]
    fn test_symmetric_with_client_entropy() {
        let sp = sp_key();
        let client_secret = [7u8; 8];
        let mut request = request(KeyType::Symmetric);
        request.key_size = Some(64);
        request.entropy = Some(Entropy {
            binary_secret: BinarySecret::nonce(&client_secret),
        });

        let negotiation =
            negotiate(&request, None, Some(&sp.public_key().unwrap()), &KeyManager::default())
                .unwrap();

        assert_eq!(
            negotiation.proof_token,
            Some(RequestedProofToken::ComputedKey(constants::CK_PSHA1.to_string()))
        );
        let server_entropy = negotiation.server_entropy.unwrap();
        assert_eq!(
            server_entropy.binary_secret.secret_type.as_deref(),
            Some(constants::BINARY_SECRET_NONCE)
        );
        let server_secret = server_entropy.binary_secret.decode().unwrap();
        assert_eq!(server_secret.len(), 8);

        let expected = psha1::p_sha1(&client_secret, &server_secret, 8).unwrap();
        let key_info = negotiation.key_info.unwrap();
        assert_eq!(unwrap_proof_key(&key_info, &sp), expected.expose_secret());
    }

    #[test]
    fn test_zero_key_size_uses_default() {
        let mut request = request(KeyType::Symmetric);
        request.key_size = Some(0);
        let negotiation = negotiate(&request, None, None, &KeyManager::default()).unwrap();
        assert_eq!(negotiation.key_size, 128);
        // Nothing to wrap the key with
        assert!(negotiation.key_info.is_none());
    }

    #[test]
    fn test_oversized_key_is_rejected() {
        let mut request = request(KeyType::Symmetric);
        request.key_size = Some(80_000_000);
        let err = negotiate(&request, None, None, &KeyManager::default()).unwrap_err();
        assert!(matches!(err, WsTrustError::InvalidKeySize(80_000_000)));
        assert!(err.is_client_fault());

        request.key_size = Some(u32::MAX);
        assert!(negotiate(&request, None, None, &KeyManager::default()).is_err());

        request.key_size = Some(constants::MAX_KEY_SIZE);
        let negotiation = negotiate(&request, None, None, &KeyManager::default()).unwrap();
        let Some(RequestedProofToken::BinarySecret(secret)) = &negotiation.proof_token else {
            panic!("expected a binary secret");
        };
        assert_eq!(secret.decode().unwrap().len(), 512);
    }

    #[test]
    fn test_requested_key_wrap_algorithm() {
        let sp = sp_key();
        let mut request = request(KeyType::Symmetric);
        request.key_wrap_algorithm = Some(algorithms::RSA_V15.to_string());
        let negotiation =
            negotiate(&request, None, Some(&sp.public_key().unwrap()), &KeyManager::default())
                .unwrap();
        let Some(KeyInfo::EncryptedKey(encrypted)) = &negotiation.key_info else {
            panic!("expected an encrypted key");
        };
        assert_eq!(encrypted.algorithm, algorithms::RSA_V15);
    }

    #[test]
    fn test_bearer_and_absent_key_type() {
        let negotiation = negotiate(
            &RequestSecurityToken::new(RequestType::Issue),
            None,
            None,
            &KeyManager::default(),
        )
        .unwrap();
        assert_eq!(negotiation.key_type, KeyType::Bearer);
        assert!(negotiation.proof_token.is_none());
        assert!(negotiation.key_info.is_none());
    }

    #[test]
    fn test_unsupported_key_type() {
        let err = negotiate(
            &request(KeyType::Other("urn:custom".into())),
            None,
            None,
            &KeyManager::default(),
        )
        .unwrap_err();
        assert!(matches!(err, WsTrustError::UnsupportedKeyType(uri) if uri == "urn:custom"));
    }

    #[test]
    fn test_public_key_from_key_manager() {
        let cert = Certificate::from_pem(CLIENT_CERT).unwrap();
        let manager = KeyManager::default().with_certificate("alice", cert.clone());
        let negotiation = negotiate(
            &request(KeyType::Public),
            Some(&Principal::new("alice")),
            None,
            &manager,
        )
        .unwrap();
        assert_eq!(negotiation.key_info, Some(KeyInfo::X509Certificate(cert.to_base64())));
        assert!(negotiation.proof_token.is_none());
    }

    #[test]
    fn test_public_key_from_use_key() {
        let cert = Certificate::from_pem(CLIENT_CERT).unwrap();
        let mut request = request(KeyType::Public);
        request.use_key = Some(UseKey::Certificate(cert.to_base64()));
        let negotiation =
            negotiate(&request, Some(&Principal::new("bob")), None, &KeyManager::default())
                .unwrap();
        assert_eq!(negotiation.key_info, Some(KeyInfo::X509Certificate(cert.to_base64())));

        request.use_key = Some(UseKey::Certificate("bm90IGEgY2VydA==".into()));
        let err = negotiate(&request, None, None, &KeyManager::default()).unwrap_err();
        assert!(matches!(err, WsTrustError::UnsupportedUseKey(_)));
    }

    #[test]
    fn test_public_key_value() {
        let (modulus, exponent) = sp_key().public_key().unwrap().components().unwrap();
        let key_value = XmlElement::new(ns::DSIG, prefix::DSIG, elements::KEY_VALUE).with_child(
            XmlElement::new(ns::DSIG, prefix::DSIG, elements::RSA_KEY_VALUE)
                .with_child(XmlElement::text_element(
                    ns::DSIG,
                    prefix::DSIG,
                    elements::MODULUS,
                    &BASE64.encode(modulus),
                ))
                .with_child(XmlElement::text_element(
                    ns::DSIG,
                    prefix::DSIG,
                    elements::EXPONENT,
                    &BASE64.encode(exponent),
                )),
        );
        let mut request = request(KeyType::Public);
        request.use_key = Some(UseKey::KeyValue(key_value.clone()));
        let negotiation = negotiate(&request, None, None, &KeyManager::default()).unwrap();
        assert_eq!(negotiation.key_info, Some(KeyInfo::KeyValue(key_value)));

        let broken = XmlElement::new(ns::DSIG, prefix::DSIG, elements::KEY_VALUE);
        request.use_key = Some(UseKey::KeyValue(broken));
        assert!(negotiate(&request, None, None, &KeyManager::default()).is_err());
    }

    #[test]
    fn test_public_key_errors() {
        let mut request = request(KeyType::Public);
        let err = negotiate(&request, None, None, &KeyManager::default()).unwrap_err();
        assert!(matches!(err, WsTrustError::UnableToLocateClientPublicKey));

        request.use_key = Some(UseKey::Opaque(XmlElement::new("urn:x", "x", "Thing")));
        let err = negotiate(&request, None, None, &KeyManager::default()).unwrap_err();
        assert!(matches!(err, WsTrustError::UnsupportedUseKey(name) if name == "{urn:x}Thing"));
    }
}
