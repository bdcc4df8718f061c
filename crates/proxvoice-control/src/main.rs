//! proxvoice control plane binary.
//!
//! - Ingestion: POST /sessions, POST /policy/poses
//! - Policy socket: GET /policy-socket?token=...
//! - Ops: /health, /ready, /metrics
//! - Background scheduler: stale sweep + recompute/enforce per room

use std::net::SocketAddr;
use std::process::ExitCode;

use tracing_subscriber::{fmt, EnvFilter};

use proxvoice_control::{app_state::AppState, config, router};
use proxvoice_core::error::{ProxVoiceError, Result};

#[tokio::main]
async fn main() -> ExitCode {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, code = e.client_code().as_str(), "proxvoice-control failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let path = config::config_path();
    let cfg = config::load_from_file(&path)?;
    let listen = cfg.listen_addr()?;

    let state = AppState::new(cfg)?;
    let scheduler = state.scheduler().spawn();
    let app = router::build_router(state);

    tracing::info!(%listen, config = %path, "proxvoice-control starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| ProxVoiceError::Internal(format!("bind {listen} failed: {e}")))?;

    let served = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    scheduler.shutdown().await;
    served.map_err(|e| ProxVoiceError::Internal(format!("server failed: {e}")))?;

    tracing::info!("proxvoice-control stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
