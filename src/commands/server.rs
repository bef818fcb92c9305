//! `connector server`: keep the durable record in sync with the agent

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};

use connector_agent::watch::serve;
use connector_agent::Reconciler;
use connector_common::StateConfig;
use connector_state::FileSystemPersistence;

use super::secret_persistence;

/// Run until Ctrl-C or SIGTERM.
pub async fn run(state: StateConfig) -> anyhow::Result<()> {
    let secret = secret_persistence(&state)
        .await
        .context("failed to set up durable state store")?;
    let fs = FileSystemPersistence::from_config(&state);
    let reconciler = Arc::new(Reconciler::new(Arc::new(fs), Arc::new(secret)));

    info!(base_dir = %state.base_dir.display(), "Connector server starting");
    serve(reconciler, state.base_dir.clone(), shutdown_signal())
        .await
        .context("failed to watch agent state")?;
    info!("Connector server stopped");
    Ok(())
}

/// Wait for a shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, shutting down");
}
