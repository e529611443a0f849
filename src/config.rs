use std::{collections::HashMap, time::Duration};

use config::{Config as ConfigLib, ConfigError, Environment, File};
use redis::{
    Client as RedisClient, RedisResult,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub sts: StsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Header carrying the principal authenticated by the fronting proxy
    #[serde(default = "default_caller_header")]
    pub caller_header: String,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

fn default_caller_header() -> String {
    "x-authenticated-user".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub uri: SecretString,
}

impl RedisConfig {
    /// Establishes a new Redis connection based on the provided URI.
    ///
    /// - To enable TLS, the URI must use the `rediss://` scheme.
    /// - To enable insecure TLS, the URI must use the `rediss://` scheme and end with `/#insecure`.
    ///
    /// # Errors
    /// Returns an error if the connection cannot be established.
    pub async fn start(&self) -> RedisResult<ConnectionManager> {
        let client = RedisClient::open(self.uri.expose_secret())?;
        let config = ConnectionManagerConfig::new().set_connection_timeout(Duration::from_secs(60));
        client.get_connection_manager_with_config(config).await
    }
}

/// Security token service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StsConfig {
    /// Issuer name written into tokens
    pub name: String,
    pub token_timeout_secs: u64,
    pub clock_skew_secs: u64,
    pub sign_token: bool,
    pub encrypt_token: bool,
    /// Plugin id of the request handler
    pub request_handler: String,
    /// Principals allowed to change the token provider registry at runtime
    pub admins: Vec<String>,
    pub key_provider: Option<KeyProviderConfig>,
    pub token_providers: Vec<TokenProviderConfig>,
    pub claims_processors: Vec<ClaimsProcessorConfig>,
    pub service_providers: Vec<ServiceProviderConfig>,
}

impl Default for StsConfig {
    fn default() -> Self {
        Self {
            name: "WSTrustSTS".to_string(),
            token_timeout_secs: 3600,
            clock_skew_secs: 0,
            sign_token: false,
            encrypt_token: false,
            request_handler: "standard".to_string(),
            admins: Vec::new(),
            key_provider: None,
            token_providers: Vec::new(),
            claims_processors: Vec::new(),
            service_providers: Vec::new(),
        }
    }
}

/// PEM files of the STS key pair and of the trusted service certificates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyProviderConfig {
    pub signing_key: Option<String>,
    pub signing_certificate: Option<String>,
    #[serde(default)]
    pub certificates: Vec<CertificateEntry>,
    /// Fallback mapping from service endpoint to certificate alias
    #[serde(default)]
    pub validating_aliases: Vec<ValidatingAlias>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateEntry {
    pub alias: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatingAlias {
    pub service: String,
    pub alias: String,
}

/// A single provider property. Kept as a list so keys retain their case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenProviderConfig {
    /// Plugin id of the provider
    pub provider: String,
    pub token_type: String,
    pub token_element: String,
    pub token_element_ns: String,
    #[serde(default)]
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimsProcessorConfig {
    pub processor: String,
    pub dialect: String,
    #[serde(default)]
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceProviderConfig {
    pub endpoint: Option<String>,
    /// Full-match pattern, tried in configuration order after exact endpoints
    pub endpoint_regex: Option<String>,
    pub token_type: String,
    pub truststore_alias: Option<String>,
}

/// Flattens a property list into a map, later entries winning
pub fn properties_map(properties: &[Property]) -> HashMap<String, String> {
    properties
        .iter()
        .map(|p| (p.key.clone(), p.value.clone()))
        .collect()
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    pub fn load_with_sources(
        env_vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigLib::builder()
            .set_default("server.host", "localhost")?
            .set_default("server.port", 3000)?
            .add_source(File::with_name("config/settings").required(false));

        // If env_vars is provided, we use it instead of system environment
        // This is to avoid systems variables pollution across tests
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // Use system environment variables
            // Should be in the format APP_SERVER__HOST or APP_STS__TOKEN_TIMEOUT_SECS
            builder = builder.add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        builder.build()?.try_deserialize()
    }
}
