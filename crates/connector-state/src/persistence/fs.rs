//! Companion agent vault on the local filesystem

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use connector_common::{Error, Result, StateConfig};

use super::Persistence;
use crate::state::{SerializedState, StateKey};

const FILE_MANIFEST: &str = "Manifest";
const FILE_REGISTRATION_KEY: &str = "Store/RegistrationKey";
const FILE_INSTANCE_FINGERPRINT: &str = "Store/InstanceFingerprint";

const DIR_MODE: u32 = 0o700;
const FILE_MODE: u32 = 0o600;

/// Entries physically present in the vault, in load/save order.
const VAULT_FILES: [(StateKey, &str); 3] = [
    (StateKey::Manifest, FILE_MANIFEST),
    (StateKey::InstanceFingerprint, FILE_INSTANCE_FINGERPRINT),
    (StateKey::RegistrationKey, FILE_REGISTRATION_KEY),
];

/// Path of the registration key file under a vault directory.
///
/// This is the file the agent rewrites when it rotates its key pair.
pub fn registration_key_path(base_dir: &Path) -> PathBuf {
    base_dir.join(FILE_REGISTRATION_KEY)
}

/// Vault-backed state store.
///
/// Holds the manifest, registration key and instance fingerprint. The
/// connector config entry has no file and is dropped on save.
#[derive(Debug, Clone)]
pub struct FileSystemPersistence {
    base_dir: PathBuf,
}

impl FileSystemPersistence {
    /// Create a store rooted at an explicit vault directory
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Create a store for the configured vault directory
    pub fn from_config(config: &StateConfig) -> Self {
        Self::new(config.base_dir())
    }

    async fn read_file(&self, file: &str) -> Result<String> {
        let path = self.base_dir.join(file);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::io(path, e))
    }

    async fn write_file(&self, file: &str, content: &str) -> Result<()> {
        let path = self.base_dir.join(file);
        if let Some(parent) = path.parent() {
            create_private_dir(parent).await?;
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(FILE_MODE);

        let mut handle = options.open(&path).await.map_err(|e| Error::io(&path, e))?;
        handle
            .write_all(content.as_bytes())
            .await
            .map_err(|e| Error::io(&path, e))?;
        handle.flush().await.map_err(|e| Error::io(&path, e))?;
        debug!(path = %path.display(), bytes = content.len(), "Wrote vault file");
        Ok(())
    }
}

async fn create_private_dir(dir: &Path) -> Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(DIR_MODE);
    builder.create(dir).await.map_err(|e| Error::io(dir, e))
}

#[async_trait]
impl Persistence for FileSystemPersistence {
    /// Every vault file must exist; a missing one fails the whole load.
    async fn load(&self) -> Result<Option<SerializedState>> {
        let mut state = SerializedState::new();
        for (key, file) in VAULT_FILES {
            state.insert(key, self.read_file(file).await?);
        }
        Ok(Some(state))
    }

    async fn save(&self, state: &SerializedState) -> Result<()> {
        for (key, file) in VAULT_FILES {
            self.write_file(file, state.get(key).unwrap_or_default())
                .await?;
        }
        Ok(())
    }
}
