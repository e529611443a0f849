use std::sync::Arc;

use wstrust_sts::{
    config::Config,
    providers::RedisRevocationRegistry,
    server::Server,
    telemetry,
    wstrust::{
        SecurityTokenService,
        provider::{PluginContext, PluginRegistry},
    },
};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    let _ = dotenvy::dotenv();
    color_eyre::install()?;
    telemetry::init_tracing();

    // Load configuration
    let config = Config::load()?;
    tracing::info!("Loaded configuration: {:?}", config);

    let context = match &config.redis {
        Some(redis) => {
            let conn = redis.start().await?;
            tracing::info!("Using Redis revocation registry");
            PluginContext {
                revocation: Arc::new(RedisRevocationRegistry::new(conn)),
            }
        }
        None => PluginContext::default(),
    };

    let sts = SecurityTokenService::new(config.sts.clone(), PluginRegistry::new(context));
    // Fail at startup rather than on the first request
    sts.configuration().await?;

    let server = Server::new(sts, &config.server)?;
    server.run().await
}
