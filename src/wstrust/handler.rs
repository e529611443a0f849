//! Request handler: turns validated RSTs into RSTRs by driving the token
//! providers.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::crypto::HashAlg;
use crate::crypto::sym::Cipher;
use crate::wstrust::constants;
use crate::wstrust::context::{ClaimedAttributes, Principal, WsTrustRequestContext};
use crate::wstrust::error::{ProviderError, WsTrustError};
use crate::wstrust::model::{
    AppliesTo, Lifetime, RequestSecurityToken, RequestSecurityTokenResponse, RequestType, Status,
    TokenTarget,
};
use crate::wstrust::proof;
use crate::wstrust::provider::{SecurityTokenProvider, TokenFamily};
use crate::wstrust::registry::StsConfiguration;
use crate::xml::XmlElement;
use crate::xmlsec::{self, SignConfig};

type Result<T> = std::result::Result<T, WsTrustError>;

/// Processes the four WS-Trust bindings for one request
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn issue(
        &self,
        request: RequestSecurityToken,
        caller: Option<&Principal>,
    ) -> Result<RequestSecurityTokenResponse>;

    async fn renew(
        &self,
        request: RequestSecurityToken,
        caller: Option<&Principal>,
    ) -> Result<RequestSecurityTokenResponse>;

    async fn validate(
        &self,
        request: RequestSecurityToken,
        caller: Option<&Principal>,
    ) -> Result<RequestSecurityTokenResponse>;

    async fn cancel(
        &self,
        request: RequestSecurityToken,
        caller: Option<&Principal>,
    ) -> Result<RequestSecurityTokenResponse>;

    /// Protects the token of an Issue or Renew response before it is sent
    fn post_process(
        &self,
        request: &RequestSecurityToken,
        response: &mut RequestSecurityTokenResponse,
    ) -> Result<()>;
}

/// Default handler backed by the configured token providers
pub struct StandardRequestHandler {
    configuration: Arc<StsConfiguration>,
}

impl StandardRequestHandler {
    pub fn new(configuration: Arc<StsConfiguration>) -> Self {
        Self { configuration }
    }

    fn default_lifetime(&self, request: &mut RequestSecurityToken) {
        let timeout = self.configuration.token_timeout();
        if request.lifetime.is_none() && !timeout.is_zero() {
            debug!("Lifetime has not been specified, using the configured timeout");
            request.lifetime = Some(Lifetime::starting_now(timeout));
        }
    }

    fn context(
        &self,
        request: RequestSecurityToken,
        caller: Option<&Principal>,
    ) -> WsTrustRequestContext {
        let on_behalf_of = request
            .on_behalf_of
            .as_ref()
            .map(|obo| Principal::new(obo.username_token.username.clone()));
        let mut context =
            WsTrustRequestContext::new(request, caller.cloned(), self.configuration.name());
        if let Some(principal) = on_behalf_of {
            context.set_on_behalf_of(principal);
        }
        context
    }

    /// Provider owning tokens with the root element of `token`
    fn provider_for_target(&self, token: &XmlElement) -> Result<Arc<dyn SecurityTokenProvider>> {
        self.configuration
            .provider_for_token_element_ns(TokenFamily::WsTrust, token.name())
            .ok_or_else(|| WsTrustError::NoTokenProviderForType(token.name().to_string()))
    }

    fn claimed_attributes(
        &self,
        request: &RequestSecurityToken,
        caller: Option<&Principal>,
    ) -> Result<Option<ClaimedAttributes>> {
        let Some(claims) = &request.claims else {
            return Ok(None);
        };
        let dialect = claims.dialect.as_deref().unwrap_or_default();
        match self.configuration.claims_processor(dialect) {
            Some(processor) => Ok(Some(processor.process_claims(claims, caller)?)),
            None => {
                debug!(dialect, "Claims requested but no processor handles the dialect");
                Ok(None)
            }
        }
    }

    /// Checks that a token presented for renewal or validation was signed by this STS.
    /// `None` when signing is disabled.
    fn check_signature(&self, token: &XmlElement) -> Option<xmlsec::Result<()>> {
        if !self.configuration.sign_token() {
            return None;
        }
        let key = self.configuration.key_manager().signing_key()?;
        let result = key
            .public_key()
            .map_err(xmlsec::Error::from)
            .and_then(|public_key| xmlsec::verify_element(token, &public_key));
        Some(result)
    }
}

fn security_token(context: &WsTrustRequestContext) -> Result<XmlElement> {
    context
        .security_token()
        .map(|token| token.token().clone())
        .ok_or_else(|| {
            WsTrustError::Provider(ProviderError::Processing(
                "Token provider did not produce a security token".into(),
            ))
        })
}

#[async_trait]
impl RequestHandler for StandardRequestHandler {
    async fn issue(
        &self,
        mut request: RequestSecurityToken,
        caller: Option<&Principal>,
    ) -> Result<RequestSecurityTokenResponse> {
        debug!(caller = ?caller.map(Principal::name), "Issuing token");
        let configuration = &self.configuration;

        let applies_to = request.applies_to.clone();
        let service = applies_to
            .as_ref()
            .and_then(AppliesTo::address)
            .map(str::to_string);

        let mut service_key = None;
        if let Some(service) = &service {
            if request.token_type.is_none() {
                request.token_type = configuration.token_type_for_service(service);
            }
            service_key = configuration.service_provider_public_key(service);
        }
        let token_type = request
            .token_type
            .clone()
            .ok_or(WsTrustError::MissingTokenTypeOrAppliesTo)?;

        let provider = service
            .as_deref()
            .and_then(|service| configuration.provider_for_service(service))
            .or_else(|| configuration.provider_for_token_type(&token_type))
            .ok_or_else(|| WsTrustError::NoTokenProviderForType(token_type.clone()))?;

        self.default_lifetime(&mut request);
        let attributes = self.claimed_attributes(&request, caller)?;
        let negotiation =
            proof::negotiate(&request, caller, service_key.as_ref(), configuration.key_manager())?;

        let mut context = self.context(request, caller);
        if let Some(key) = service_key {
            context.set_service_public_key(key);
        }
        if let Some(attributes) = attributes {
            context.set_claimed_attributes(attributes);
        }
        if let Some(key_info) = negotiation.key_info {
            context.set_proof_key_info(key_info);
        }

        provider.issue_token(&mut context).await?;
        let token = security_token(&context)?;
        info!(token_type = %token_type, "Security token issued");

        Ok(RequestSecurityTokenResponse {
            context: context.request().context.clone(),
            token_type: Some(token_type),
            lifetime: context.lifetime().cloned(),
            applies_to,
            key_size: Some(negotiation.key_size),
            key_type: Some(negotiation.key_type),
            requested_security_token: Some(token),
            requested_proof_token: negotiation.proof_token,
            entropy: negotiation.server_entropy,
            requested_attached_reference: context.attached_reference().cloned(),
            requested_unattached_reference: context.unattached_reference().cloned(),
            ..Default::default()
        })
    }

    async fn renew(
        &self,
        mut request: RequestSecurityToken,
        caller: Option<&Principal>,
    ) -> Result<RequestSecurityTokenResponse> {
        debug!(context = ?request.context, "Renewing token");
        let Some(TokenTarget::Renew(token)) = &request.target else {
            return Err(WsTrustError::MissingTarget(constants::elements::RENEW_TARGET));
        };

        match self.check_signature(token) {
            Some(Err(e)) => return Err(WsTrustError::InvalidTokenSignature(e)),
            Some(Ok(())) => {}
            None => debug!("Token signature not verified, signing is disabled"),
        }
        let provider = self.provider_for_target(token)?;

        self.default_lifetime(&mut request);
        let mut context = self.context(request, caller);
        provider.renew_token(&mut context).await?;
        let token = security_token(&context)?;

        Ok(RequestSecurityTokenResponse {
            context: context.request().context.clone(),
            token_type: context.token_type().map(str::to_string),
            lifetime: context.lifetime().cloned(),
            requested_security_token: Some(token),
            requested_attached_reference: context.attached_reference().cloned(),
            requested_unattached_reference: context.unattached_reference().cloned(),
            ..Default::default()
        })
    }

    async fn validate(
        &self,
        mut request: RequestSecurityToken,
        caller: Option<&Principal>,
    ) -> Result<RequestSecurityTokenResponse> {
        debug!(context = ?request.context, "Validating token");
        let Some(TokenTarget::Validate(token)) = &request.target else {
            return Err(WsTrustError::MissingTarget(constants::elements::VALIDATE_TARGET));
        };

        let mut status = match self.check_signature(token) {
            Some(Err(xmlsec::Error::InvalidSignature(_))) => Some(Status::invalid(
                "Validation failure: digital signature is invalid",
            )),
            Some(Err(e)) => Some(Status::invalid(format!(
                "Validation failure: unable to verify digital signature: {e}"
            ))),
            Some(Ok(())) | None => None,
        };
        let provider = self.provider_for_target(token)?;

        if request.token_type.is_none() {
            request.token_type = Some(constants::STATUS_TYPE.to_string());
        }
        let mut context = self.context(request, caller);

        if status.is_none() {
            status = match provider.validate_token(&mut context).await {
                Ok(()) => context.status().cloned(),
                Err(e) => {
                    warn!(error = %e, "Token provider failed to validate the token");
                    Some(Status::invalid(format!("Validation failure: {e}")))
                }
            };
        }

        Ok(RequestSecurityTokenResponse {
            context: context.request().context.clone(),
            token_type: context.token_type().map(str::to_string),
            status: Some(status.unwrap_or_else(|| {
                Status::invalid("Validation failure: token provider did not report a status")
            })),
            ..Default::default()
        })
    }

    async fn cancel(
        &self,
        request: RequestSecurityToken,
        caller: Option<&Principal>,
    ) -> Result<RequestSecurityTokenResponse> {
        let Some(TokenTarget::Cancel(token)) = &request.target else {
            return Err(WsTrustError::MissingTarget(constants::elements::CANCEL_TARGET));
        };
        let provider = self.provider_for_target(token)?;

        let mut context = self.context(request, caller);
        provider.cancel_token(&mut context).await?;
        info!(token = ?context.target_qname(), "Security token canceled");

        Ok(RequestSecurityTokenResponse {
            context: context.request().context.clone(),
            requested_token_cancelled: true,
            ..Default::default()
        })
    }

    fn post_process(
        &self,
        request: &RequestSecurityToken,
        response: &mut RequestSecurityTokenResponse,
    ) -> Result<()> {
        if !matches!(
            request.request_type,
            Some(RequestType::Issue | RequestType::BatchIssue | RequestType::Renew)
        ) {
            return Ok(());
        }
        let Some(token) = response.requested_security_token.as_mut() else {
            return Ok(());
        };
        let configuration = &self.configuration;

        if configuration.sign_token() {
            match configuration.key_manager().signing_key() {
                Some(key) => {
                    let hash = request
                        .signature_algorithm
                        .as_deref()
                        .and_then(xmlsec::signature_hash)
                        .unwrap_or(HashAlg::Sha256);
                    let config = SignConfig::new(key)
                        .with_certificate(configuration.key_manager().signing_certificate())
                        .with_signature_hash(hash);
                    *token = xmlsec::sign_element(token, &config)?;
                    debug!("Security token signed");
                }
                None => warn!("Token signing is enabled but no signing key is configured"),
            }
        }

        if configuration.encrypt_token() {
            let key = request
                .applies_to
                .as_ref()
                .and_then(AppliesTo::address)
                .and_then(|service| configuration.service_provider_public_key(service));
            match key {
                Some(key) => {
                    let cipher = if proof::effective_key_size(request) >= 256 {
                        Cipher::Aes256Cbc
                    } else {
                        Cipher::Aes128Cbc
                    };
                    *token =
                        xmlsec::encrypt_element(token, &key, proof::key_wrap(request), cipher)?;
                    debug!("Security token encrypted");
                }
                None => warn!("Security token should be encrypted but no encrypting key could be found"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServiceProviderConfig, StsConfig, TokenProviderConfig};
    use crate::crypto::Certificate;
    use crate::crypto::rsa::RsaPrivateKey;
    use crate::providers::saml2::{SAML2_ASSERTION_NS, SAML2_TOKEN_TYPE};
    use crate::providers::special::{SPECIAL_TOKEN_NS, SPECIAL_TOKEN_TYPE};
    use crate::wstrust::constants::ns;
    use crate::wstrust::model::KeyType;
    use crate::wstrust::provider::{PluginRegistry, SAML20_PROVIDER, SPECIAL_PROVIDER};
    use crate::wstrust::registry::KeyManager;

    const STS_KEY: &[u8] = include_bytes!("../../test_data/sts/sts.key");
    const STS_CERT: &[u8] = include_bytes!("../../test_data/sts/sts.crt");
    const SP_KEY: &[u8] = include_bytes!("../../test_data/sts/sp.key");
    const SP_CERT: &[u8] = include_bytes!("../../test_data/sts/sp.crt");
    const SP_ENDPOINT: &str = "http://services.example.org/provider";

    fn provider(id: &str, token_type: &str, element: &str, element_ns: &str) -> TokenProviderConfig {
        TokenProviderConfig {
            provider: id.to_string(),
            token_type: token_type.to_string(),
            token_element: element.to_string(),
            token_element_ns: element_ns.to_string(),
            properties: Vec::new(),
        }
    }

    fn handler(sign_token: bool, encrypt_token: bool) -> StandardRequestHandler {
        let config = StsConfig {
            name: "Test STS".to_string(),
            sign_token,
            encrypt_token,
            token_providers: vec![
                provider(SAML20_PROVIDER, SAML2_TOKEN_TYPE, "Assertion", SAML2_ASSERTION_NS),
                provider(SPECIAL_PROVIDER, SPECIAL_TOKEN_TYPE, "SpecialToken", SPECIAL_TOKEN_NS),
            ],
            service_providers: vec![ServiceProviderConfig {
                endpoint: Some(SP_ENDPOINT.to_string()),
                endpoint_regex: None,
                token_type: SAML2_TOKEN_TYPE.to_string(),
                truststore_alias: Some("sp".to_string()),
            }],
            ..Default::default()
        };
        let key_manager = KeyManager::default()
            .with_signing_key(
                RsaPrivateKey::from_pem(STS_KEY).unwrap(),
                Some(Certificate::from_pem(STS_CERT).unwrap()),
            )
            .with_certificate("sp", Certificate::from_pem(SP_CERT).unwrap());
        let configuration =
            StsConfiguration::with_key_manager(&config, &PluginRegistry::default(), key_manager)
                .unwrap();
        StandardRequestHandler::new(Arc::new(configuration))
    }

    async fn issue_signed_assertion(handler: &StandardRequestHandler) -> XmlElement {
        let request = RequestSecurityToken::new(RequestType::Issue).with_applies_to(SP_ENDPOINT);
        let mut response = handler
            .issue(request.clone(), Some(&Principal::new("alice")))
            .await
            .unwrap();
        handler.post_process(&request, &mut response).unwrap();
        response.requested_security_token.unwrap()
    }

    #[tokio::test]
    async fn test_issue_special_token() {
        let handler = handler(false, false);
        let request = RequestSecurityToken::new(RequestType::Issue)
            .with_context("ctx-1")
            .with_token_type(SPECIAL_TOKEN_TYPE);
        let response = handler
            .issue(request, Some(&Principal::new("alice")))
            .await
            .unwrap();

        assert_eq!(response.context.as_deref(), Some("ctx-1"));
        assert_eq!(response.token_type.as_deref(), Some(SPECIAL_TOKEN_TYPE));
        assert_eq!(response.key_type, Some(KeyType::Bearer));
        assert_eq!(response.key_size, Some(constants::DEFAULT_KEY_SIZE));
        assert!(response.lifetime.is_some());
        assert_eq!(
            response.requested_security_token.unwrap().text(),
            "Principal:alice"
        );
    }

    #[tokio::test]
    async fn test_issue_resolves_token_type_from_applies_to() {
        let handler = handler(false, false);
        let request = RequestSecurityToken::new(RequestType::Issue).with_applies_to(SP_ENDPOINT);
        let response = handler.issue(request, None).await.unwrap();

        assert_eq!(response.token_type.as_deref(), Some(SAML2_TOKEN_TYPE));
        assert_eq!(
            response.applies_to.as_ref().and_then(AppliesTo::address),
            Some(SP_ENDPOINT)
        );
        assert!(response.requested_attached_reference.is_some());
    }

    #[tokio::test]
    async fn test_issue_without_type_or_applies_to() {
        let handler = handler(false, false);
        let err = handler
            .issue(RequestSecurityToken::new(RequestType::Issue), None)
            .await
            .unwrap_err();
        assert!(matches!(err, WsTrustError::MissingTokenTypeOrAppliesTo));

        let request = RequestSecurityToken::new(RequestType::Issue).with_token_type("urn:unknown");
        let err = handler.issue(request, None).await.unwrap_err();
        assert!(matches!(err, WsTrustError::NoTokenProviderForType(t) if t == "urn:unknown"));
    }

    #[tokio::test]
    async fn test_symmetric_key_is_embedded_for_service() {
        let handler = handler(false, false);
        let mut request = RequestSecurityToken::new(RequestType::Issue).with_applies_to(SP_ENDPOINT);
        request.key_type = Some(KeyType::Symmetric);
        let response = handler.issue(request, None).await.unwrap();

        assert!(matches!(
            response.requested_proof_token,
            Some(crate::wstrust::model::RequestedProofToken::BinarySecret(_))
        ));
        let token = response.requested_security_token.unwrap();
        assert!(token.find(ns::XENC, "EncryptedKey").is_some());
    }

    #[tokio::test]
    async fn test_post_process_signs_token() {
        let handler = handler(true, false);
        let token = issue_signed_assertion(&handler).await;

        assert!(token.child(ns::DSIG, "Signature").is_some());
        let public_key = RsaPrivateKey::from_pem(STS_KEY).unwrap().public_key().unwrap();
        xmlsec::verify_element(&token, &public_key).unwrap();
    }

    #[tokio::test]
    async fn test_post_process_encrypts_token() {
        let handler = handler(true, true);
        let token = issue_signed_assertion(&handler).await;

        assert!(token.name().is(ns::XENC, "EncryptedData"));
        let decrypted =
            xmlsec::decrypt_element(&token, &RsaPrivateKey::from_pem(SP_KEY).unwrap()).unwrap();
        assert!(decrypted.name().is(SAML2_ASSERTION_NS, "Assertion"));
    }

    #[tokio::test]
    async fn test_validate_and_renew_signed_assertion() {
        let handler = handler(true, false);
        let token = issue_signed_assertion(&handler).await;

        let request = RequestSecurityToken::new(RequestType::Validate)
            .with_target(TokenTarget::Validate(token.clone()));
        let response = handler.validate(request, None).await.unwrap();
        assert_eq!(response.token_type.as_deref(), Some(constants::STATUS_TYPE));
        assert!(response.status.unwrap().is_valid());

        let request = RequestSecurityToken::new(RequestType::Renew)
            .with_target(TokenTarget::Renew(token.clone()));
        let response = handler.renew(request, None).await.unwrap();
        let renewed = response.requested_security_token.unwrap();
        assert_ne!(renewed.attribute("ID"), token.attribute("ID"));
        assert!(renewed.child(ns::DSIG, "Signature").is_none());
    }

    #[tokio::test]
    async fn test_tampered_token_fails_validation_and_renewal() {
        let handler = handler(true, false);
        let mut token = issue_signed_assertion(&handler).await;
        token.set_attribute("Version", "3.0");

        let request = RequestSecurityToken::new(RequestType::Validate)
            .with_target(TokenTarget::Validate(token.clone()));
        let status = handler.validate(request, None).await.unwrap().status.unwrap();
        assert!(!status.is_valid());
        assert!(status.reason.unwrap().contains("digital signature"));

        let request = RequestSecurityToken::new(RequestType::Renew)
            .with_target(TokenTarget::Renew(token));
        let err = handler.renew(request, None).await.unwrap_err();
        assert!(matches!(err, WsTrustError::InvalidTokenSignature(_)));
    }

    #[tokio::test]
    async fn test_cancel_then_validate() {
        let handler = handler(false, false);
        let request = RequestSecurityToken::new(RequestType::Issue).with_applies_to(SP_ENDPOINT);
        let token = handler
            .issue(request, None)
            .await
            .unwrap()
            .requested_security_token
            .unwrap();

        let request = RequestSecurityToken::new(RequestType::Cancel)
            .with_target(TokenTarget::Cancel(token.clone()));
        assert!(handler.cancel(request, None).await.unwrap().requested_token_cancelled);

        let request = RequestSecurityToken::new(RequestType::Validate)
            .with_target(TokenTarget::Validate(token));
        let status = handler.validate(request, None).await.unwrap().status.unwrap();
        assert!(status.reason.unwrap().contains("has been canceled"));
    }

    #[tokio::test]
    async fn test_missing_targets() {
        let handler = handler(false, false);
        let err = handler
            .cancel(RequestSecurityToken::new(RequestType::Cancel), None)
            .await
            .unwrap_err();
        assert!(matches!(err, WsTrustError::MissingTarget(_)));

        let unknown = XmlElement::new("urn:unknown", "u", "Token");
        let request = RequestSecurityToken::new(RequestType::Validate)
            .with_target(TokenTarget::Validate(unknown));
        let err = handler.validate(request, None).await.unwrap_err();
        assert!(matches!(err, WsTrustError::NoTokenProviderForType(_)));
    }
}
