//! Managed instance registration
//!
//! A registration generates fresh key material, registers it with the
//! activation service and assembles the resulting [`ConnectorState`].
//! Nothing is persisted here and no retry is attempted: any failure leaves
//! no partial state behind.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use tracing::info;

#[cfg(test)]
use mockall::automock;

use connector_common::{ActivationConfig, Error, Result};
use connector_state::ConnectorState;

use crate::keys::{generate_fingerprint, KeyPair, KEY_TYPE};
use crate::ssm::RegistrationClient;

/// Render a key creation timestamp the way the companion agent parses it,
/// e.g. `2021-10-05 05:27:47.693369915 +0000 UTC`.
///
/// Fractional seconds carry at most nine digits with trailing zeros
/// trimmed; a whole second has no fractional part at all.
pub fn format_created_date(at: DateTime<Utc>) -> String {
    let mut fraction = format!("{:09}", at.nanosecond() % 1_000_000_000);
    while fraction.ends_with('0') {
        fraction.pop();
    }
    let fraction = if fraction.is_empty() {
        String::new()
    } else {
        format!(".{}", fraction)
    };
    format!(
        "{}{} {}",
        at.format("%Y-%m-%d %H:%M:%S"),
        fraction,
        at.format("%z %Z")
    )
}

/// Register a new managed instance with `client`.
pub async fn register(
    activation: &ActivationConfig,
    client: &dyn RegistrationClient,
) -> Result<ConnectorState> {
    info!(key_type = KEY_TYPE, "Creating key pair");
    let (key_pair, fingerprint) = tokio::task::spawn_blocking(|| {
        let key_pair = KeyPair::generate()?;
        let fingerprint = generate_fingerprint()?;
        Ok::<_, Error>((key_pair, fingerprint))
    })
    .await
    .map_err(|e| {
        Error::internal_with_context("register", format!("key generation task failed: {}", e))
    })??;

    let private_key = key_pair.encode_private_key()?;
    let public_key = key_pair.encode_public_key()?;
    info!(fingerprint = %fingerprint, "Generated fingerprint");

    info!(activation_id = %activation.id, "Registering managed instance");
    let instance_id = client
        .register_managed_instance(
            &activation.id,
            &activation.code,
            &public_key,
            KEY_TYPE,
            &fingerprint,
        )
        .await?;
    info!(instance_id = %instance_id, "Registered managed instance");

    Ok(ConnectorState {
        activation_id: activation.id.clone(),
        fingerprint,
        instance_id,
        private_key,
        private_key_type: KEY_TYPE.to_string(),
        private_key_created_date: format_created_date(Utc::now()),
        region: client.region(),
    })
}

/// Source of fresh registrations for the initializer.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Registration: Send + Sync {
    /// Perform one registration
    async fn register(&self) -> Result<ConnectorState>;
}

/// [`Registration`] against the activation service with fixed credentials.
pub struct SsmRegistration {
    client: Arc<dyn RegistrationClient>,
    activation: ActivationConfig,
}

impl SsmRegistration {
    /// Register through `client` with the credentials in `activation`
    pub fn new(client: Arc<dyn RegistrationClient>, activation: ActivationConfig) -> Self {
        Self { client, activation }
    }
}

#[async_trait]
impl Registration for SsmRegistration {
    async fn register(&self) -> Result<ConnectorState> {
        register(&self.activation, self.client.as_ref()).await
    }
}
