//! Plugin interfaces and the factory table that replaces class-name based
//! instantiation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::providers::claims::AttributeClaimsProcessor;
use crate::providers::revocation::{MemoryRevocationRegistry, RevocationRegistry};
use crate::providers::saml11::Saml11TokenProvider;
use crate::providers::saml2::Saml20TokenProvider;
use crate::providers::special::SpecialTokenProvider;
use crate::wstrust::context::{ClaimedAttributes, Principal, WsTrustRequestContext};
use crate::wstrust::error::ProviderError;
use crate::wstrust::handler::{RequestHandler, StandardRequestHandler};
use crate::wstrust::model::Claims;
use crate::wstrust::registry::{RegistryError, StsConfiguration};
use crate::xml::QName;

/// Provider properties, as configured
pub type Properties = HashMap<String, String>;

/// Family a token provider belongs to, part of its element lookup key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenFamily {
    WsTrust,
    Saml2,
}

impl TokenFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenFamily::WsTrust => "WS_TRUST",
            TokenFamily::Saml2 => "SAML2",
        }
    }

    /// Lookup key of a token element: `family$localName$namespace`
    pub fn element_key(self, local_name: &str, namespace: &str) -> String {
        format!("{}${local_name}${namespace}", self.as_str())
    }
}

impl fmt::Display for TokenFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issues, renews, cancels and validates one kind of token.
///
/// Operations read the request from the context and store their results
/// (token, references, status) back into it.
#[async_trait]
pub trait SecurityTokenProvider: Send + Sync {
    /// Called once with the configured properties before the provider is shared
    fn initialize(&mut self, properties: &Properties) -> Result<(), ProviderError>;

    async fn issue_token(&self, context: &mut WsTrustRequestContext) -> Result<(), ProviderError>;

    async fn renew_token(&self, context: &mut WsTrustRequestContext) -> Result<(), ProviderError>;

    async fn cancel_token(&self, context: &mut WsTrustRequestContext)
    -> Result<(), ProviderError>;

    async fn validate_token(
        &self,
        context: &mut WsTrustRequestContext,
    ) -> Result<(), ProviderError>;

    /// Whether tokens in the given namespace are handled by this provider
    fn supports(&self, namespace: &str) -> bool;

    fn token_type(&self) -> &str;

    fn family(&self) -> TokenFamily;

    /// Root element of the tokens this provider produces
    fn supported_qname(&self) -> QName;
}

/// Resolves the claims of a request into attributes for the issued token
pub trait ClaimsProcessor: Send + Sync {
    fn initialize(&mut self, properties: &Properties) -> Result<(), ProviderError>;

    fn process_claims(
        &self,
        claims: &Claims,
        principal: Option<&Principal>,
    ) -> Result<ClaimedAttributes, ProviderError>;
}

/// Shared services handed to provider factories
#[derive(Clone)]
pub struct PluginContext {
    pub revocation: Arc<dyn RevocationRegistry>,
}

impl Default for PluginContext {
    fn default() -> Self {
        Self {
            revocation: Arc::new(MemoryRevocationRegistry::default()),
        }
    }
}

type ProviderFactory =
    Arc<dyn Fn(&PluginContext) -> Box<dyn SecurityTokenProvider> + Send + Sync>;
type ClaimsFactory = Arc<dyn Fn() -> Box<dyn ClaimsProcessor> + Send + Sync>;
type HandlerFactory = Arc<dyn Fn(Arc<StsConfiguration>) -> Box<dyn RequestHandler> + Send + Sync>;

/// Factory table keyed by the identifiers used in configuration
#[derive(Clone)]
pub struct PluginRegistry {
    context: PluginContext,
    providers: HashMap<String, ProviderFactory>,
    claims: HashMap<String, ClaimsFactory>,
    handlers: HashMap<String, HandlerFactory>,
}

pub const SAML20_PROVIDER: &str = "saml20";
pub const SAML11_PROVIDER: &str = "saml11";
pub const SPECIAL_PROVIDER: &str = "special";
pub const ATTRIBUTES_PROCESSOR: &str = "attributes";
pub const STANDARD_HANDLER: &str = "standard";

impl PluginRegistry {
    /// Registry with the built-in plugins
    pub fn new(context: PluginContext) -> Self {
        let mut registry = Self {
            context,
            providers: HashMap::new(),
            claims: HashMap::new(),
            handlers: HashMap::new(),
        };

        let saml: ProviderFactory = Arc::new(|ctx: &PluginContext| {
            Box::new(Saml20TokenProvider::new(Arc::clone(&ctx.revocation)))
                as Box<dyn SecurityTokenProvider>
        });
        registry.providers.insert(SAML20_PROVIDER.to_string(), Arc::clone(&saml));
        registry
            .providers
            .insert(Saml20TokenProvider::CLASS_NAME.to_string(), saml);
        let saml11: ProviderFactory = Arc::new(|ctx: &PluginContext| {
            Box::new(Saml11TokenProvider::new(Arc::clone(&ctx.revocation)))
                as Box<dyn SecurityTokenProvider>
        });
        registry.providers.insert(SAML11_PROVIDER.to_string(), Arc::clone(&saml11));
        registry
            .providers
            .insert(Saml11TokenProvider::CLASS_NAME.to_string(), saml11);
        registry.register_provider(SPECIAL_PROVIDER, |_| {
            Box::new(SpecialTokenProvider::default())
        });
        registry.register_claims_processor(ATTRIBUTES_PROCESSOR, || {
            Box::new(AttributeClaimsProcessor::default())
        });
        registry.register_handler(STANDARD_HANDLER, |configuration| {
            Box::new(StandardRequestHandler::new(configuration))
        });
        registry
    }

    pub fn context(&self) -> &PluginContext {
        &self.context
    }

    pub fn register_provider<F>(&mut self, id: &str, factory: F)
    where
        F: Fn(&PluginContext) -> Box<dyn SecurityTokenProvider> + Send + Sync + 'static,
    {
        self.providers.insert(id.to_string(), Arc::new(factory));
    }

    pub fn register_claims_processor<F>(&mut self, id: &str, factory: F)
    where
        F: Fn() -> Box<dyn ClaimsProcessor> + Send + Sync + 'static,
    {
        self.claims.insert(id.to_string(), Arc::new(factory));
    }

    pub fn register_handler<F>(&mut self, id: &str, factory: F)
    where
        F: Fn(Arc<StsConfiguration>) -> Box<dyn RequestHandler> + Send + Sync + 'static,
    {
        self.handlers.insert(id.to_string(), Arc::new(factory));
    }

    /// Instantiates and initializes a token provider
    pub fn create_provider(
        &self,
        id: &str,
        properties: &Properties,
    ) -> Result<Arc<dyn SecurityTokenProvider>, RegistryError> {
        let factory = self
            .providers
            .get(id)
            .ok_or_else(|| RegistryError::UnknownPlugin(id.to_string()))?;
        let mut provider = factory(&self.context);
        provider.initialize(properties)?;
        Ok(Arc::from(provider))
    }

    pub fn create_claims_processor(
        &self,
        id: &str,
        properties: &Properties,
    ) -> Result<Arc<dyn ClaimsProcessor>, RegistryError> {
        let factory = self
            .claims
            .get(id)
            .ok_or_else(|| RegistryError::UnknownPlugin(id.to_string()))?;
        let mut processor = factory();
        processor.initialize(properties)?;
        Ok(Arc::from(processor))
    }

    pub fn create_handler(
        &self,
        id: &str,
        configuration: Arc<StsConfiguration>,
    ) -> Result<Box<dyn RequestHandler>, RegistryError> {
        let factory = self
            .handlers
            .get(id)
            .ok_or_else(|| RegistryError::UnknownPlugin(id.to_string()))?;
        Ok(factory(configuration))
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new(PluginContext::default())
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("claims", &self.claims.keys().collect::<Vec<_>>())
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
