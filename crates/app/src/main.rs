mod problem;
mod projects;
mod router;
mod telemetry;

use std::{net::SocketAddr, sync::Arc};

use tracing::{info, warn};

use projdesk_core::ProjectService;
use projdesk_storage::Database;
use projdesk_util::{load_env_file, AppConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_file = load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    if let Some(path) = env_file {
        info!(stage = "config", path = %path.display(), "loaded environment file");
    }
    let metrics = telemetry::init_metrics()?;

    let database = Database::connect(&config.database.url, config.database.max_connections).await?;
    database.run_migrations().await?;
    info!(stage = "storage", url = %config.database.url, max_connections = config.database.max_connections, "database ready");

    let service = ProjectService::new(Arc::new(database.projects()));
    let state = router::AppState::new(metrics, service);

    let mut app = router::app_router(state);
    if let Some(cors) = router::cors_layer(&config)? {
        app = app.layer(cors);
    }

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    database.close().await;
    info!(stage = "app", "server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(stage = "app", error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(stage = "app", "shutdown requested");
}
