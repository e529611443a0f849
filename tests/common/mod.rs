#![allow(dead_code)]

use std::collections::HashMap;

use wstrust_sts::{
    config::{Config, TlsConfig},
    server::Server,
    wstrust::{SecurityTokenService, provider::PluginRegistry},
};

pub const SAML2_TOKEN_TYPE: &str =
    "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLV2.0";
pub const SAML11_TOKEN_TYPE: &str =
    "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLV1.1";
pub const SPECIAL_TOKEN_TYPE: &str = "http://www.tokens.org/SpecialToken";
pub const SP_ENDPOINT: &str = "http://services.example.org/provider";
pub const LEGACY_ENDPOINT: &str = "http://services.example.org/legacy";
pub const WST: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512";
pub const SOAP11: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP12: &str = "http://www.w3.org/2003/05/soap-envelope";

// Helper function to spawn a test server on a random port
pub async fn spawn_server() -> String {
    spawn(None).await
}

/// Spawns the server behind TLS with the STS test certificate
pub async fn spawn_tls_server() -> String {
    spawn(Some(TlsConfig {
        cert_path: "test_data/sts/sts.crt".to_string(),
        key_path: "test_data/sts/sts.key".to_string(),
    }))
    .await
}

async fn spawn(tls: Option<TlsConfig>) -> String {
    let scheme = if tls.is_some() { "https" } else { "http" };
    let config = {
        // Ignore the process environment so tests see config/settings.toml only
        let mut config = Config::load_with_sources(Some(HashMap::new())).unwrap();
        config.server.host = "127.0.0.1".to_string();
        // Use a random OS port
        config.server.port = 0;
        config.server.tls = tls;
        config
    };

    let sts = SecurityTokenService::new(config.sts.clone(), PluginRegistry::default());
    let server = Server::new(sts, &config.server).unwrap();

    let port = server.port().unwrap();
    tokio::spawn(async move {
        server.run().await.expect("failed to run server");
    });

    format!("{scheme}://{}:{}", config.server.host, port)
}

/// Wraps `body` in a SOAP 1.1 envelope
pub fn soap11(body: &str) -> String {
    format!(r#"<soapenv:Envelope xmlns:soapenv="{SOAP11}"><soapenv:Body>{body}</soapenv:Body></soapenv:Envelope>"#)
}

pub fn soap12(body: &str) -> String {
    format!(r#"<env:Envelope xmlns:env="{SOAP12}"><env:Body>{body}</env:Body></env:Envelope>"#)
}

/// A minimal RST with the given request type suffix and inner elements
pub fn rst(request_type: &str, inner: &str) -> String {
    format!(
        r#"<wst:RequestSecurityToken xmlns:wst="{WST}" Context="test-context"><wst:RequestType>{WST}/{request_type}</wst:RequestType>{inner}</wst:RequestSecurityToken>"#
    )
}
