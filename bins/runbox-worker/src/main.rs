mod handlers;
mod routes;
mod sandbox;

use std::sync::Arc;

use axum::Router;
use runbox_common::WorkerConfig;
use tokio::net::TcpListener;
use tracing::info;

pub struct AppState {
    pub config: WorkerConfig,
    pub sandbox: Arc<dyn sandbox::Sandbox>,
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

    info!("runbox worker booting...");

    let config = WorkerConfig::from_env();
    // Refuse to boot with an outer timeout that races the inner limit
    config.validate()?;

    info!(
        "timeouts: inner {}s / outer {}s",
        config.time_limit_secs, config.outer_timeout_secs
    );
    info!("runner binary: {}", config.runner_bin);

    let sandbox = sandbox::from_config(&config);
    let port = config.port;
    let state = Arc::new(AppState { config, sandbox });

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
