/**
 * HAMP KERNEL - Point d'entrée du serveur de statut des laveries
 *
 * RÔLE : Orchestration des modules : config, registre des laveries, pollers,
 * health, HTTP. Bootstrap du système complet avec gestion d'erreurs et logging.
 *
 * ARCHITECTURE : un poller par laverie -> snapshot en mémoire -> diffusion live
 * (WebSocket) + API REST de lecture.
 */

mod config;
mod health;
mod http;
mod laundry;
mod models;

use crate::config::load_config;
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::laundry::fetcher::HttpMachineSource;
use crate::laundry::LaundryRegistry;

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = load_config().await;
    let health_tracker = HealthTracker::new();

    let source = HttpMachineSource::new(cfg.upstream.clone()).context("failed to build upstream HTTP client")?;
    let registry = Arc::new(LaundryRegistry::new(&cfg, Arc::new(source), health_tracker.clone()));
    info!("tracking {} laundry rooms", registry.rooms().len());

    // un poller par laverie, premier fetch immédiat
    registry.start_pollers();

    health_tracker.spawn_health_reporter(
        registry.clone(),
        Duration::from_secs(cfg.health.report_interval_secs),
    );

    let app_state = AppState {
        registry: registry.clone(),
        health_tracker,
    };
    let app = http::build_router(app_state);

    let listener = TcpListener::bind(cfg.bind)
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind))?;
    info!("listening on http://{}", cfg.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    registry.stop_pollers().await;
    info!("kernel stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
