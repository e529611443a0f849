use async_trait::async_trait;
use tracing::debug;

use crate::wstrust::context::{Principal, WsTrustRequestContext};
use crate::wstrust::error::ProviderError;
use crate::wstrust::model::{SecurityToken, Status};
use crate::wstrust::provider::{Properties, SecurityTokenProvider, TokenFamily};
use crate::xml::{QName, XmlElement};

pub const SPECIAL_TOKEN_NS: &str = "http://www.tokens.org";
pub const SPECIAL_TOKEN_TYPE: &str = "http://www.tokens.org/SpecialToken";
const SPECIAL_TOKEN: &str = "SpecialToken";

/// Issues a minimal opaque token naming the caller. Used to exercise the
/// provider plumbing with a token type other than SAML.
#[derive(Debug, Default)]
pub struct SpecialTokenProvider {
    properties: Properties,
}

impl SpecialTokenProvider {
    pub fn properties(&self) -> &Properties {
        &self.properties
    }
}

#[async_trait]
impl SecurityTokenProvider for SpecialTokenProvider {
    fn initialize(&mut self, properties: &Properties) -> Result<(), ProviderError> {
        self.properties = properties.clone();
        Ok(())
    }

    async fn issue_token(&self, context: &mut WsTrustRequestContext) -> Result<(), ProviderError> {
        let caller = context
            .caller()
            .map(Principal::name)
            .unwrap_or("ANONYMOUS")
            .to_string();
        let token = XmlElement::new(SPECIAL_TOKEN_NS, "token", SPECIAL_TOKEN)
            .with_attribute("TokenType", SPECIAL_TOKEN_TYPE)
            .with_text(format!("Principal:{caller}"));
        debug!(caller = %caller, "Special token issued");
        context.set_security_token(SecurityToken::new(SPECIAL_TOKEN_TYPE, token, ""));
        Ok(())
    }

    async fn renew_token(&self, context: &mut WsTrustRequestContext) -> Result<(), ProviderError> {
        let token = context
            .target_token()
            .cloned()
            .ok_or_else(|| ProviderError::Processing("No token to renew".into()))?;
        context.set_security_token(SecurityToken::new(SPECIAL_TOKEN_TYPE, token, ""));
        Ok(())
    }

    async fn cancel_token(
        &self,
        _context: &mut WsTrustRequestContext,
    ) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn validate_token(
        &self,
        context: &mut WsTrustRequestContext,
    ) -> Result<(), ProviderError> {
        context.set_status(Status::valid("Validation succeeded"));
        Ok(())
    }

    fn supports(&self, namespace: &str) -> bool {
        namespace == SPECIAL_TOKEN_NS
    }

    fn token_type(&self) -> &str {
        SPECIAL_TOKEN_TYPE
    }

    fn family(&self) -> TokenFamily {
        TokenFamily::WsTrust
    }

    fn supported_qname(&self) -> QName {
        QName::new(SPECIAL_TOKEN_NS, SPECIAL_TOKEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wstrust::model::{RequestSecurityToken, RequestType, TokenTarget};

    #[tokio::test]
    async fn test_issue_names_the_caller() {
        let provider = SpecialTokenProvider::default();
        let request =
            RequestSecurityToken::new(RequestType::Issue).with_token_type(SPECIAL_TOKEN_TYPE);
        let mut context =
            WsTrustRequestContext::new(request, Some(Principal::new("alice")), "sts");

        provider.issue_token(&mut context).await.unwrap();
        let token = context.security_token().unwrap();
        assert_eq!(token.token_type(), SPECIAL_TOKEN_TYPE);
        assert_eq!(token.token().text(), "Principal:alice");
        assert_eq!(token.token().attribute("TokenType"), Some(SPECIAL_TOKEN_TYPE));
        assert!(token.token().name().is(SPECIAL_TOKEN_NS, SPECIAL_TOKEN));
    }

    #[tokio::test]
    async fn test_validate_reports_valid() {
        let provider = SpecialTokenProvider::default();
        let token = XmlElement::new(SPECIAL_TOKEN_NS, "token", SPECIAL_TOKEN);
        let request = RequestSecurityToken::new(RequestType::Validate)
            .with_target(TokenTarget::Validate(token));
        let mut context = WsTrustRequestContext::new(request, None, "sts");

        provider.validate_token(&mut context).await.unwrap();
        assert!(context.status().unwrap().is_valid());
        assert!(provider.supports(SPECIAL_TOKEN_NS));
        assert!(!provider.supports("urn:oasis:names:tc:SAML:2.0:assertion"));
    }
}
