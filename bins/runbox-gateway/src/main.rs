mod handlers;
mod routes;
mod upstream;

use std::sync::Arc;

use axum::Router;
use runbox_common::GatewayConfig;
use tokio::net::TcpListener;
use tracing::info;

pub struct AppState {
    pub config: GatewayConfig,
    pub worker: upstream::WorkerClient,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("runbox gateway booting...");

    let config = GatewayConfig::from_env();
    info!("worker endpoint: {}", config.worker_url);
    info!("upstream timeout: {}s", config.upstream_timeout_secs);

    let worker = upstream::WorkerClient::new(&config)?;
    let port = config.port;
    let state = Arc::new(AppState { config, worker });

    // Build router
    let app = Router::new().merge(routes::routes()).with_state(state);

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("HTTP server listening on {}", addr);
    info!("Ready to accept submissions");

    axum::serve(listener, app).await?;
    Ok(())
}
