//! Persistence backends for serialized connector state
//!
//! Two stores hold the same identity:
//!
//! - [`FileSystemPersistence`]: the companion agent's vault directory. Only
//!   meaningful once the agent (or the init container) has written it, and
//!   it has no slot for the connector config entry.
//! - [`SecretPersistence`]: a Kubernetes Secret that survives pod
//!   recreation and carries every entry.

mod fs;
mod secret;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use connector_common::Result;

use crate::state::SerializedState;

pub use fs::{registration_key_path, FileSystemPersistence};
pub use secret::{build_state_secret, KubeSecretStore, SecretPersistence, SecretStore};

/// A place serialized state can be loaded from and saved to.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Load the stored state.
    ///
    /// `Ok(None)` means nothing has been stored yet, which is distinct from
    /// a failure to read.
    async fn load(&self) -> Result<Option<SerializedState>>;

    /// Replace the stored state.
    async fn save(&self, state: &SerializedState) -> Result<()>;
}
