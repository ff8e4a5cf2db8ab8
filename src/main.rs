use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use access_ledger::api;
use access_ledger::clock::SystemClock;
use access_ledger::config::AppConfig;
use access_ledger::database::Database;
use access_ledger::service::AccessService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "access_ledger=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting access ledger");

    let config = AppConfig::load()?;
    info!("Configuration loaded");

    let database = Database::new(&config.database.url, config.database.max_connections).await?;
    database.run_migrations().await?;
    info!("Database migrations completed");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let service = Arc::new(AccessService::new(
        config,
        Arc::new(database),
        Arc::new(SystemClock),
    )?);

    if !service.health().await {
        warn!("Durable store not reachable at startup; serving from fallback store");
    }

    let app = api::router(service);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
