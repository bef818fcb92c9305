//! Connector configuration
//!
//! The configuration is assembled once by the binary from command-line
//! flags and environment variables, then handed to each component through
//! its constructor. Nothing in the library reads configuration globally.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Full configuration of the connector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Remote activation service settings
    pub agent: AgentConfig,
    /// One-time activation credentials
    pub activation: ActivationConfig,
    /// Local and durable state locations
    pub state: StateConfig,
}

/// Settings for reaching the remote activation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// AWS region code the companion agent connects to
    pub region: String,
    /// Endpoint override; the regional default is used when unset
    pub endpoint: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            region: crate::DEFAULT_REGION.to_string(),
            endpoint: None,
        }
    }
}

/// Activation credentials issued out-of-band for a one-time registration.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivationConfig {
    /// Activation id
    pub id: String,
    /// Activation code (secret)
    pub code: String,
}

// Keep the activation code out of logs.
impl std::fmt::Debug for ActivationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationConfig")
            .field("id", &self.id)
            .field("code", &"<redacted>")
            .finish()
    }
}

impl ActivationConfig {
    /// Reject empty activation credentials before any side effect happens.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::validation_for_field(
                "activation.id",
                "activation id is required",
            ));
        }
        if self.code.trim().is_empty() {
            return Err(Error::validation_for_field(
                "activation.code",
                "activation code is required",
            ));
        }
        Ok(())
    }
}

/// Locations of the connector state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateConfig {
    /// Vault directory of the companion agent holding the local state files
    pub base_dir: PathBuf,
    /// Prefix of the Secret name; the pod ordinal index is appended
    pub secret_name_prefix: String,
    /// Namespace of the Secret
    pub secret_namespace: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(crate::DEFAULT_STATE_BASE_DIR),
            secret_name_prefix: crate::DEFAULT_SECRET_NAME_PREFIX.to_string(),
            secret_namespace: crate::DEFAULT_SECRET_NAMESPACE.to_string(),
        }
    }
}

impl StateConfig {
    /// Base directory of the local state files.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Name of the durable Secret for the given pod ordinal index.
    pub fn secret_name(&self, pod_index: &str) -> String {
        format!("{}-{}", self.secret_name_prefix, pod_index)
    }
}
