//! `connector init`: bootstrap the connector identity

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use connector_agent::{Initializer, SsmClient, SsmRegistration};
use connector_common::ConnectorConfig;
use connector_state::FileSystemPersistence;

use super::secret_persistence;

/// Run the bootstrap. Any error aborts the init container.
pub async fn run(config: ConnectorConfig) -> anyhow::Result<()> {
    config
        .activation
        .validate()
        .context("invalid activation configuration")?;

    let secret = secret_persistence(&config.state)
        .await
        .context("failed to set up durable state store")?;
    let fs = FileSystemPersistence::from_config(&config.state);
    let client = SsmClient::new(&config.agent).context("failed to set up activation client")?;
    let registration = SsmRegistration::new(Arc::new(client), config.activation.clone());

    let initializer = Initializer::new(
        config.activation,
        Arc::new(secret),
        Arc::new(fs),
        Arc::new(registration),
    );
    let outcome = initializer
        .initialize()
        .await
        .context("connector initialization failed")?;

    info!(?outcome, "Connector identity ready");
    Ok(())
}
