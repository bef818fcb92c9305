//! One-shot bootstrap of the connector identity
//!
//! Runs in the init container, before the companion agent starts. The
//! durable record is the source of truth: an existing identity is inherited
//! when it belongs to the configured activation, otherwise a new instance is
//! registered and recorded. Either way the local store is rewritten so the
//! agent sees exactly what the durable record holds.

use std::sync::Arc;

use tracing::{error, info, warn};

use connector_common::{ActivationConfig, Result};
use connector_state::{ConnectorState, Persistence, SerializedState};

use crate::registration::Registration;

/// How the identity was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// The durable record already held an identity for this activation
    Inherited,
    /// A new instance was registered and recorded
    Registered,
}

enum Phase {
    LoadExisting,
    Register,
    Persist(SerializedState, InitOutcome),
    Done(InitOutcome),
}

/// Bootstraps the connector identity into both stores.
pub struct Initializer {
    activation: ActivationConfig,
    secret_persistence: Arc<dyn Persistence>,
    fs_persistence: Arc<dyn Persistence>,
    registration: Arc<dyn Registration>,
}

impl Initializer {
    /// Bootstrap for `activation`, registering through `registration` when
    /// the Secret holds no identity for it
    pub fn new(
        activation: ActivationConfig,
        secret_persistence: Arc<dyn Persistence>,
        fs_persistence: Arc<dyn Persistence>,
        registration: Arc<dyn Registration>,
    ) -> Self {
        Self {
            activation,
            secret_persistence,
            fs_persistence,
            registration,
        }
    }

    /// Run the bootstrap to completion.
    ///
    /// Any error leaves the instance uninitialized. A registration that
    /// succeeded remotely is not rolled back when a later write fails.
    pub async fn initialize(&self) -> Result<InitOutcome> {
        info!("Connector initializer starting");

        let mut phase = Phase::LoadExisting;
        loop {
            phase = match phase {
                Phase::LoadExisting => match self.load_previous_state().await? {
                    Some(state) => Phase::Persist(state, InitOutcome::Inherited),
                    None => Phase::Register,
                },
                Phase::Register => {
                    info!(activation_id = %self.activation.id, "Registering as new instance");
                    let state = self.registration.register().await?.serialize()?;
                    info!("Persisting state to Secret");
                    self.secret_persistence.save(&state).await?;
                    Phase::Persist(state, InitOutcome::Registered)
                }
                Phase::Persist(state, outcome) => {
                    info!("Persisting state to filesystem");
                    self.fs_persistence.save(&state).await?;
                    Phase::Done(outcome)
                }
                Phase::Done(outcome) => {
                    info!(?outcome, "Connector initializer finished");
                    return Ok(outcome);
                }
            };
        }
    }

    /// Durable state to inherit, or `None` when a new registration is
    /// required.
    async fn load_previous_state(&self) -> Result<Option<SerializedState>> {
        info!("Loading persisted state from Secret");
        let Some(serialized) = self.secret_persistence.load().await? else {
            info!("Connector state not found in Secret, performing new activation");
            return Ok(None);
        };

        let state = ConnectorState::deserialize(&serialized).map_err(|e| {
            error!(error = %e, "Persisted connector state cannot be deserialized");
            e
        })?;

        if state.activation_id.is_empty() {
            warn!("Activation id not recorded, state was likely written by an earlier version");
        } else if state.activation_id != self.activation.id {
            warn!(
                state_activation_id = %state.activation_id,
                config_activation_id = %self.activation.id,
                "Activation id mismatch, discarding previous state"
            );
            return Ok(None);
        }

        info!(instance_id = %state.instance_id, "Inheriting previous state");
        Ok(Some(serialized))
    }
}
