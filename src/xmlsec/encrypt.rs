use base64::{Engine, engine::general_purpose::STANDARD as BASE64};

use crate::crypto::SecureBytes;
use crate::crypto::rsa::{KeyWrap, RsaPrivateKey, RsaPublicKey};
use crate::crypto::sym::{AesEncryptor, Cipher};
use crate::wstrust::constants::{ns, prefix};
use crate::wstrust::model::{EncryptedKey, KeyInfo};
use crate::xml::{ElementReader, XmlElement};
use crate::xmlsec::{Error, Result, algorithms};

fn xenc(local_name: &str) -> XmlElement {
    XmlElement::new(ns::XENC, prefix::XENC, local_name)
}

fn cipher_data(value: String) -> XmlElement {
    xenc("CipherData").with_child(xenc("CipherValue").with_text(value))
}

fn cipher_from_uri(uri: &str) -> Result<Cipher> {
    [Cipher::Aes128Cbc, Cipher::Aes256Cbc]
        .into_iter()
        .find(|cipher| cipher.uri() == uri)
        .ok_or_else(|| Error::UnsupportedAlgorithm(uri.to_string()))
}

/// Replaces `element` by `xenc:EncryptedData`.
///
/// A fresh content key encrypts the serialized element and is itself
/// wrapped under the recipient's RSA key.
pub fn encrypt_element(
    element: &XmlElement,
    recipient: &RsaPublicKey,
    key_wrap: KeyWrap,
    cipher: Cipher,
) -> Result<XmlElement> {
    let encryptor = AesEncryptor::new().with_cipher(cipher);
    let content_key = encryptor.generate_key()?;
    let ciphertext = encryptor.encrypt(&content_key, element.to_xml()?)?;
    let wrapped = recipient.wrap_key(content_key.expose_secret(), key_wrap)?;

    let key_info = KeyInfo::EncryptedKey(EncryptedKey {
        algorithm: key_wrap.uri().to_string(),
        cipher_value: BASE64.encode(wrapped),
    });

    Ok(xenc("EncryptedData")
        .with_attribute("Type", algorithms::ELEMENT_TYPE)
        .with_child(xenc("EncryptionMethod").with_attribute("Algorithm", cipher.uri()))
        .with_child(key_info.to_element())
        .with_child(cipher_data(BASE64.encode(ciphertext))))
}

fn algorithm_of(element: &XmlElement) -> Result<&str> {
    element
        .child(ns::XENC, "EncryptionMethod")
        .and_then(|method| method.attribute("Algorithm"))
        .ok_or_else(|| Error::Invalid(format!("{} has no EncryptionMethod", element.name())))
}

fn cipher_value(element: &XmlElement) -> Result<Vec<u8>> {
    let value = element
        .child(ns::XENC, "CipherData")
        .and_then(|data| data.child(ns::XENC, "CipherValue"))
        .map(XmlElement::text)
        .ok_or_else(|| Error::Invalid(format!("{} has no CipherValue", element.name())))?;
    let compact: String = value.split_whitespace().collect();
    Ok(BASE64.decode(compact)?)
}

/// Recovers the element hidden in `xenc:EncryptedData`
pub fn decrypt_element(encrypted: &XmlElement, private_key: &RsaPrivateKey) -> Result<XmlElement> {
    if !encrypted.name().is(ns::XENC, "EncryptedData") {
        return Err(Error::Invalid(format!(
            "expected EncryptedData, found {}",
            encrypted.name()
        )));
    }
    let cipher = cipher_from_uri(algorithm_of(encrypted)?)?;

    let encrypted_key = encrypted
        .child(ns::DSIG, "KeyInfo")
        .and_then(|key_info| key_info.child(ns::XENC, "EncryptedKey"))
        .ok_or_else(|| Error::Invalid("EncryptedData carries no EncryptedKey".into()))?;
    let key_wrap = KeyWrap::from_uri(algorithm_of(encrypted_key)?)?;
    let content_key = SecureBytes::new(private_key.unwrap_key(&cipher_value(encrypted_key)?, key_wrap)?);

    let plaintext = AesEncryptor::new()
        .with_cipher(cipher)
        .decrypt(&content_key, cipher_value(encrypted)?)?;
    let xml = std::str::from_utf8(&plaintext)?;
    Ok(ElementReader::new(xml)?.raw_subtree()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SP_KEY: &[u8] = include_bytes!("../../test_data/sts/sp.key");
    const STS_KEY: &[u8] = include_bytes!("../../test_data/sts/sts.key");

    fn token() -> XmlElement {
        XmlElement::new("urn:oasis:names:tc:SAML:2.0:assertion", "saml", "Assertion")
            .with_attribute("ID", "ID_42")
            .with_child(XmlElement::text_element(
                "urn:oasis:names:tc:SAML:2.0:assertion",
                "saml",
                "Issuer",
                "sts",
            ))
    }

    #[test]
    fn test_encrypt_and_decrypt() {
        let sp = RsaPrivateKey::from_pem(SP_KEY).unwrap();
        let encrypted =
            encrypt_element(&token(), &sp.public_key().unwrap(), KeyWrap::default(), Cipher::Aes128Cbc)
                .unwrap();

        assert!(encrypted.name().is(ns::XENC, "EncryptedData"));
        assert_eq!(encrypted.attribute("Type"), Some(algorithms::ELEMENT_TYPE));
        assert!(!encrypted.to_xml().unwrap().contains("ID_42"));

        let decrypted = decrypt_element(&encrypted, &sp).unwrap();
        assert_eq!(decrypted.attribute("ID"), Some("ID_42"));
        assert_eq!(
            decrypted.child_text("urn:oasis:names:tc:SAML:2.0:assertion", "Issuer").as_deref(),
            Some("sts")
        );
    }

    #[test]
    fn test_aes256_with_rsa15() {
        let sp = RsaPrivateKey::from_pem(SP_KEY).unwrap();
        let encrypted =
            encrypt_element(&token(), &sp.public_key().unwrap(), KeyWrap::RsaV15, Cipher::Aes256Cbc)
                .unwrap();
        let method = encrypted.child(ns::XENC, "EncryptionMethod").unwrap();
        assert_eq!(method.attribute("Algorithm"), Some(Cipher::Aes256Cbc.uri()));
        assert!(decrypt_element(&encrypted, &sp).is_ok());
    }

    #[test]
    fn test_wrong_recipient_cannot_decrypt() {
        let sp = RsaPrivateKey::from_pem(SP_KEY).unwrap();
        let sts = RsaPrivateKey::from_pem(STS_KEY).unwrap();
        let encrypted =
            encrypt_element(&token(), &sp.public_key().unwrap(), KeyWrap::default(), Cipher::Aes128Cbc)
                .unwrap();
        assert!(decrypt_element(&encrypted, &sts).is_err());
    }
}
