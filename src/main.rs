use anyhow::Result;
use lingo_relay::cache::{EventDeduper, TranslationCache};
use lingo_relay::config::Config;
use lingo_relay::dispatch::DispatchEngine;
use lingo_relay::provider;
use lingo_relay::server::{router, AppState};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lingo_relay=info".parse()?),
        )
        .init();

    info!("Starting translation relay");

    // Load configuration from environment (fails fast on missing credentials)
    let config = Arc::new(Config::from_env()?);

    let client = reqwest::Client::new();
    let provider = provider::build(&config, client.clone());
    let engine = Arc::new(DispatchEngine::new(
        provider,
        Arc::new(TranslationCache::new()),
        Arc::new(EventDeduper::new()),
        &config.probe_target,
        config.reuse_probe,
    ));

    let state = AppState {
        config: config.clone(),
        engine,
        client,
    };

    let app = router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {} (backend: {:?})", addr, config.backend);

    axum::serve(listener, app).await?;

    Ok(())
}
