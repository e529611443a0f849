pub mod errors;
pub mod handlers;
pub mod responses;

use std::net::TcpListener;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use axum_server::tls_openssl::{OpenSSLAcceptor, OpenSSLConfig};
use color_eyre::eyre::{Context, Result, eyre};
use handlers::health::health_check;
use handlers::sts::sts_handler;
use tower_http::trace::TraceLayer;

use crate::config::{ServerConfig, TlsConfig};
use crate::wstrust::SecurityTokenService;

#[derive(Clone)]
pub struct AppState {
    pub sts: Arc<SecurityTokenService>,
    /// Header carrying the authenticated caller name
    pub caller_header: Arc<str>,
}

pub struct Server {
    router: Router,
    listener: TcpListener,
    tls: Option<TlsConfig>,
}

impl Server {
    /// Binds the listener and builds the router. Port 0 picks a free port.
    pub fn new(sts: SecurityTokenService, config: &ServerConfig) -> Result<Self> {
        let trace_layer =
            TraceLayer::new_for_http().make_span_with(|request: &'_ axum::extract::Request<_>| {
                let uri = request.uri().to_string();
                tracing::info_span!("request", method = %request.method(), uri)
            });

        let state = AppState {
            sts: Arc::new(sts),
            caller_header: Arc::from(config.caller_header.to_ascii_lowercase()),
        };

        let router = Router::new()
            .route("/health", get(health_check))
            .route("/sts", post(sts_handler))
            .layer(trace_layer)
            .with_state(state);

        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr).context("Binding TCP listener")?;
        listener
            .set_nonblocking(true)
            .context("Setting non-blocking mode")?;

        Ok(Self {
            router,
            listener,
            tls: config.tls.clone(),
        })
    }

    pub fn port(&self) -> Result<u16> {
        Ok(self
            .listener
            .local_addr()
            .context("Getting local address")?
            .port())
    }

    /// Serves until the task is dropped, over TLS when a certificate is configured
    pub async fn run(self) -> Result<()> {
        let port = self.port()?;
        let service = self.router.into_make_service();

        match self.tls {
            Some(tls) => {
                tracing::info!("Using certificate: {}", tls.cert_path);
                let tls_config = OpenSSLConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                    .map_err(|e| eyre!("Failed to load TLS certificate: {}", e))
                    .context("Loading TLS configuration")?;
                tracing::info!("Server listening on https port {}", port);
                axum_server::from_tcp(self.listener)
                    .acceptor(OpenSSLAcceptor::new(tls_config))
                    .serve(service)
                    .await
                    .context("Running server")?;
            }
            None => {
                tracing::info!("Server listening on http port {}", port);
                axum_server::from_tcp(self.listener)
                    .serve(service)
                    .await
                    .context("Running server")?;
            }
        }
        Ok(())
    }

    /// Spawns the server and returns the bound port
    pub async fn run_with_port(self) -> Result<(u16, tokio::task::JoinHandle<()>)> {
        let port = self.port()?;
        let handle = tokio::spawn(async move {
            if let Err(e) = self.run().await {
                tracing::error!("Server error: {:?}", e);
            }
        });
        Ok((port, handle))
    }
}
