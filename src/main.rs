use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use backend::{
    analysis::{chat::GroqChatModel, extract::PdfiumExtractor},
    auth::jwt::JwtService,
    config::AppConfig,
    db,
    routes,
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().context("failed to load configuration")?;
    info!(
        database = %config.redacted_database_url(),
        host = %config.server_host,
        port = config.server_port,
        "starting api server"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)
        .context("failed to initialize database pool")?;

    let chat = Arc::new(GroqChatModel::from_config(&config));
    let extractor = Arc::new(PdfiumExtractor);
    let jwt = JwtService::from_config(&config)?;

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let state = AppState::new(pool, config, chat, extractor, jwt);
    let router = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "listening");

    axum::serve(listener, router)
        .await
        .context("server terminated")?;

    Ok(())
}
