//! Subcommands

use std::sync::Arc;

use connector_common::kube_utils::{create_client, state_secret_name, OsPodEnv};
use connector_common::StateConfig;
use connector_state::{KubeSecretStore, SecretPersistence};
use tracing::info;

pub mod init;
pub mod server;

/// Durable state store for the running pod's Secret
pub async fn secret_persistence(
    state: &StateConfig,
) -> connector_common::Result<SecretPersistence> {
    let name = state_secret_name(state, &OsPodEnv)?;
    let client = create_client().await?;
    info!(secret = %name, namespace = %state.secret_namespace, "Using state Secret");
    Ok(SecretPersistence::new(Arc::new(KubeSecretStore::new(
        client,
        name,
        state.secret_namespace.clone(),
    ))))
}
