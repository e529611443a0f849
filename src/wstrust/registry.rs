//! Process-wide STS configuration: token providers, claims processors,
//! service-provider metadata and key material.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{Duration, Utc};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{KeyProviderConfig, StsConfig, properties_map};
use crate::crypto::rsa::{RsaPrivateKey, RsaPublicKey};
use crate::crypto::{self, Certificate};
use crate::wstrust::context::Principal;
use crate::wstrust::error::ProviderError;
use crate::wstrust::provider::{
    ClaimsProcessor, PluginRegistry, Properties, SecurityTokenProvider, TokenFamily,
};
use crate::xml::QName;

/// Property carrying the token validity in milliseconds
pub const ASSERTION_VALIDITY: &str = "AssertionValidity";
/// Property carrying the tolerated clock skew in milliseconds
pub const CLOCK_SKEW: &str = "ClockSkew";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Principal {0} is not allowed to modify the token provider registry")]
    PermissionDenied(String),

    #[error("Unknown plugin: {0}")]
    UnknownPlugin(String),

    #[error("Invalid service provider pattern {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Service provider for token type {0} has neither endpoint nor endpoint_regex")]
    InvalidServiceProvider(String),

    #[error("Unable to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid key material in {path}: {source}")]
    Key {
        path: String,
        #[source]
        source: crypto::Error,
    },

    #[error("Plugin initialization failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("{name} of {seconds} seconds is out of range")]
    InvalidDuration { name: &'static str, seconds: u64 },
}

/// Converts a configured number of seconds, rejecting spans that cannot be
/// added to the current time
fn configured_duration(name: &'static str, seconds: u64) -> Result<Duration, RegistryError> {
    i64::try_from(seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .filter(|span| Utc::now().checked_add_signed(*span).is_some())
        .ok_or(RegistryError::InvalidDuration { name, seconds })
}

fn read_pem(path: &str) -> Result<Vec<u8>, RegistryError> {
    std::fs::read(path).map_err(|source| RegistryError::Io {
        path: path.to_string(),
        source,
    })
}

/// Signing key of the STS and certificates of the parties it trusts
#[derive(Debug, Clone, Default)]
pub struct KeyManager {
    signing_key: Option<RsaPrivateKey>,
    signing_certificate: Option<Certificate>,
    certificates: HashMap<String, Certificate>,
    validating_aliases: HashMap<String, String>,
}

impl KeyManager {
    /// Loads every configured PEM file
    pub fn load(config: &KeyProviderConfig) -> Result<Self, RegistryError> {
        let key_error = |path: &str| {
            let path = path.to_string();
            move |source| RegistryError::Key { path, source }
        };

        let mut manager = Self::default();
        if let Some(path) = &config.signing_key {
            let key = RsaPrivateKey::from_pem(read_pem(path)?).map_err(key_error(path))?;
            manager.signing_key = Some(key);
        }
        if let Some(path) = &config.signing_certificate {
            let cert = Certificate::from_pem(read_pem(path)?).map_err(key_error(path))?;
            manager.signing_certificate = Some(cert);
        }
        for entry in &config.certificates {
            let cert = Certificate::from_pem(read_pem(&entry.path)?).map_err(key_error(&entry.path))?;
            debug!(alias = %entry.alias, "Loaded trusted certificate");
            manager.certificates.insert(entry.alias.clone(), cert);
        }
        for entry in &config.validating_aliases {
            manager
                .validating_aliases
                .insert(entry.service.clone(), entry.alias.clone());
        }
        Ok(manager)
    }

    pub fn with_signing_key(mut self, key: RsaPrivateKey, certificate: Option<Certificate>) -> Self {
        self.signing_key = Some(key);
        self.signing_certificate = certificate;
        self
    }

    pub fn with_certificate(mut self, alias: impl Into<String>, certificate: Certificate) -> Self {
        self.certificates.insert(alias.into(), certificate);
        self
    }

    pub fn with_validating_alias(
        mut self,
        service: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        self.validating_aliases.insert(service.into(), alias.into());
        self
    }

    pub fn signing_key(&self) -> Option<&RsaPrivateKey> {
        self.signing_key.as_ref()
    }

    pub fn signing_certificate(&self) -> Option<&Certificate> {
        self.signing_certificate.as_ref()
    }

    pub fn certificate(&self, alias: &str) -> Option<&Certificate> {
        self.certificates.get(alias)
    }

    pub fn public_key(&self, alias: &str) -> Option<RsaPublicKey> {
        let cert = self.certificate(alias)?;
        match cert.public_key() {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(alias, error = %e, "Certificate does not carry a usable RSA key");
                None
            }
        }
    }

    /// Key registered for a service endpoint through the validating alias map
    pub fn validating_key(&self, service: &str) -> Option<RsaPublicKey> {
        let alias = self.validating_aliases.get(service)?;
        self.public_key(alias)
    }
}

/// Service-provider metadata from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceProviderEntry {
    pub token_type: String,
    pub truststore_alias: Option<String>,
}

type ProviderMap = HashMap<String, Arc<dyn SecurityTokenProvider>>;

/// STS configuration, built once and shared by every request.
///
/// Token providers are kept in an immutable snapshot. Administrative
/// changes build a new snapshot and swap it in under the write lock, so
/// readers never observe a half-updated map.
pub struct StsConfiguration {
    name: String,
    token_timeout: Duration,
    clock_skew: Duration,
    sign_token: bool,
    encrypt_token: bool,
    request_handler: String,
    admins: HashSet<String>,
    providers: RwLock<Arc<ProviderMap>>,
    claims_processors: HashMap<String, Arc<dyn ClaimsProcessor>>,
    exact_services: HashMap<String, ServiceProviderEntry>,
    regex_services: Vec<(Regex, ServiceProviderEntry)>,
    key_manager: KeyManager,
}

impl StsConfiguration {
    /// Builds the configuration, instantiating every plugin through `plugins`
    pub fn from_config(config: &StsConfig, plugins: &PluginRegistry) -> Result<Self, RegistryError> {
        let key_manager = match &config.key_provider {
            Some(key_provider) => KeyManager::load(key_provider)?,
            None => KeyManager::default(),
        };
        Self::with_key_manager(config, plugins, key_manager)
    }

    /// Same as [`from_config`](Self::from_config) with key material supplied directly
    pub fn with_key_manager(
        config: &StsConfig,
        plugins: &PluginRegistry,
        key_manager: KeyManager,
    ) -> Result<Self, RegistryError> {
        let token_timeout = configured_duration("token_timeout_secs", config.token_timeout_secs)?;
        let clock_skew = configured_duration("clock_skew_secs", config.clock_skew_secs)?;
        let token_timeout_ms = token_timeout.num_milliseconds();
        let clock_skew_ms = clock_skew.num_milliseconds();

        let mut providers = ProviderMap::new();
        for entry in &config.token_providers {
            let mut properties: Properties = properties_map(&entry.properties);
            properties
                .entry(ASSERTION_VALIDITY.to_string())
                .or_insert_with(|| token_timeout_ms.to_string());
            properties
                .entry(CLOCK_SKEW.to_string())
                .or_insert_with(|| clock_skew_ms.to_string());

            let provider = plugins.create_provider(&entry.provider, &properties)?;
            let element_key = provider
                .family()
                .element_key(&entry.token_element, &entry.token_element_ns);
            info!(
                provider = %entry.provider,
                token_type = %entry.token_type,
                "Registered token provider"
            );
            providers.insert(entry.token_type.clone(), Arc::clone(&provider));
            providers.insert(element_key, provider);
        }

        let mut claims_processors = HashMap::new();
        for entry in &config.claims_processors {
            let processor = plugins
                .create_claims_processor(&entry.processor, &properties_map(&entry.properties))?;
            claims_processors.insert(entry.dialect.clone(), processor);
        }

        let mut exact_services = HashMap::new();
        let mut regex_services = Vec::new();
        for entry in &config.service_providers {
            let metadata = ServiceProviderEntry {
                token_type: entry.token_type.clone(),
                truststore_alias: entry.truststore_alias.clone(),
            };
            if entry.endpoint.is_none() && entry.endpoint_regex.is_none() {
                return Err(RegistryError::InvalidServiceProvider(entry.token_type.clone()));
            }
            if let Some(endpoint) = &entry.endpoint {
                exact_services.insert(endpoint.clone(), metadata.clone());
            }
            if let Some(pattern) = &entry.endpoint_regex {
                let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|source| {
                    RegistryError::InvalidPattern {
                        pattern: pattern.clone(),
                        source,
                    }
                })?;
                regex_services.push((regex, metadata));
            }
        }

        Ok(Self {
            name: config.name.clone(),
            token_timeout,
            clock_skew,
            sign_token: config.sign_token,
            encrypt_token: config.encrypt_token,
            request_handler: config.request_handler.clone(),
            admins: config.admins.iter().cloned().collect(),
            providers: RwLock::new(Arc::new(providers)),
            claims_processors,
            exact_services,
            regex_services,
            key_manager,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token_timeout(&self) -> Duration {
        self.token_timeout
    }

    pub fn clock_skew(&self) -> Duration {
        self.clock_skew
    }

    pub fn sign_token(&self) -> bool {
        self.sign_token
    }

    pub fn encrypt_token(&self) -> bool {
        self.encrypt_token
    }

    pub fn request_handler(&self) -> &str {
        &self.request_handler
    }

    pub fn key_manager(&self) -> &KeyManager {
        &self.key_manager
    }

    fn snapshot(&self) -> Arc<ProviderMap> {
        Arc::clone(&self.providers.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn provider_for_token_type(&self, token_type: &str) -> Option<Arc<dyn SecurityTokenProvider>> {
        self.snapshot().get(token_type).cloned()
    }

    /// Provider of tokens whose root element is `name`
    pub fn provider_for_token_element_ns(
        &self,
        family: TokenFamily,
        name: &QName,
    ) -> Option<Arc<dyn SecurityTokenProvider>> {
        let key = family.element_key(name.local_name(), name.namespace());
        self.snapshot().get(&key).cloned()
    }

    fn service_entry(&self, service: &str) -> Option<&ServiceProviderEntry> {
        self.exact_services.get(service).or_else(|| {
            self.regex_services
                .iter()
                .find(|(regex, _)| regex.is_match(service))
                .map(|(_, entry)| entry)
        })
    }

    /// Token type configured for a relying party, exact endpoints first
    pub fn token_type_for_service(&self, service: &str) -> Option<String> {
        self.service_entry(service)
            .map(|entry| entry.token_type.clone())
    }

    pub fn provider_for_service(&self, service: &str) -> Option<Arc<dyn SecurityTokenProvider>> {
        let token_type = self.token_type_for_service(service)?;
        self.provider_for_token_type(&token_type)
    }

    /// Key used to protect proof keys and tokens for a relying party
    pub fn service_provider_public_key(&self, service: &str) -> Option<RsaPublicKey> {
        let exact = self
            .exact_services
            .get(service)
            .and_then(|entry| entry.truststore_alias.as_deref());
        let pattern = || {
            self.regex_services
                .iter()
                .filter(|(regex, _)| regex.is_match(service))
                .find_map(|(_, entry)| entry.truststore_alias.as_deref())
        };
        match exact.or_else(pattern) {
            Some(alias) => self.key_manager.public_key(alias),
            None => self.key_manager.validating_key(service),
        }
    }

    pub fn claims_processor(&self, dialect: &str) -> Option<Arc<dyn ClaimsProcessor>> {
        self.claims_processors.get(dialect).cloned()
    }

    fn authorize(&self, caller: Option<&Principal>) -> Result<(), RegistryError> {
        match caller {
            Some(principal) if self.admins.contains(principal.name()) => Ok(()),
            Some(principal) => Err(RegistryError::PermissionDenied(principal.name().to_string())),
            None => Err(RegistryError::PermissionDenied("anonymous".to_string())),
        }
    }

    /// Registers a provider under `key` (a token type or element key)
    pub fn add_token_provider(
        &self,
        caller: Option<&Principal>,
        key: impl Into<String>,
        provider: Arc<dyn SecurityTokenProvider>,
    ) -> Result<(), RegistryError> {
        self.authorize(caller)?;
        let key = key.into();
        let mut guard = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = ProviderMap::clone(&guard);
        next.insert(key.clone(), provider);
        *guard = Arc::new(next);
        info!(key = %key, "Token provider added");
        Ok(())
    }

    pub fn remove_token_provider(
        &self,
        caller: Option<&Principal>,
        key: &str,
    ) -> Result<Option<Arc<dyn SecurityTokenProvider>>, RegistryError> {
        self.authorize(caller)?;
        let mut guard = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = ProviderMap::clone(&guard);
        let removed = next.remove(key);
        *guard = Arc::new(next);
        info!(key, removed = removed.is_some(), "Token provider removed");
        Ok(removed)
    }
}

impl fmt::Debug for StsConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut providers: Vec<_> = self.snapshot().keys().cloned().collect();
        providers.sort();
        f.debug_struct("StsConfiguration")
            .field("name", &self.name)
            .field("token_timeout", &self.token_timeout)
            .field("sign_token", &self.sign_token)
            .field("encrypt_token", &self.encrypt_token)
            .field("providers", &providers)
            .field("claims_processors", &self.claims_processors.keys().collect::<Vec<_>>())
            .field("exact_services", &self.exact_services)
            .field("regex_services", &self.regex_services.len())
            .finish()
    }
}
