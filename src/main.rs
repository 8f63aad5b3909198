//! Polymarket copy-trading engine entry point.

use anyhow::{Context, Result};
use polycopy_engine::api;
use polycopy_engine::supervisor::Supervisor;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    info!("starting polymarket copy-trading engine");

    let supervisor = Supervisor::start().await.context("supervisor failed to start")?;
    info!(mode = ?supervisor.mode.current(), "supervisor running");

    let app = api::router(supervisor.clone());
    let addr = std::env::var("POLYCOPY_LISTEN").unwrap_or_else(|_| "0.0.0.0:8787".to_string());
    let listener = TcpListener::bind(&addr).await.with_context(|| format!("binding {addr}"))?;
    info!(%addr, "ops surface listening");

    let shutdown_supervisor = supervisor.clone();
    let shutdown = async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        shutdown_supervisor.stop().await;
    };

    if let Err(err) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        error!(%err, "ops server error");
    }

    if supervisor.is_running() {
        supervisor.stop().await;
    }

    Ok(())
}

/// Standard dotenv search, plus a check at `CARGO_MANIFEST_DIR` so running
/// from a different working directory doesn't silently skip `.env`.
fn load_env() {
    let _ = dotenv::dotenv();

    let manifest_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidate = manifest_dir.join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "polycopy_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn supervisor_starts_in_paper_mode_without_credentials() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("POLYCOPY_DATA_DIR", dir.path());
        std::env::remove_var("POLY_PRIVATE_KEY");

        let supervisor = Supervisor::start().await.expect("paper mode always starts");
        assert!(supervisor.is_running());
        supervisor.stop().await;
    }
}
