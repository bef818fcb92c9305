//! Durable state in a Kubernetes Secret

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::{Api, ObjectMeta, PostParams};
use kube::Client;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use connector_common::{Error, Result};

use super::Persistence;
use crate::state::{SerializedState, StateKey};

const SECRET_KEY_MANIFEST: &str = "manifest";
const SECRET_KEY_REGISTRATION_KEY: &str = "regkey";
const SECRET_KEY_FINGERPRINT: &str = "fingerprint";
const SECRET_KEY_CONNECTOR_CONFIG: &str = "connector-config";

fn secret_key(key: StateKey) -> &'static str {
    match key {
        StateKey::Manifest => SECRET_KEY_MANIFEST,
        StateKey::RegistrationKey => SECRET_KEY_REGISTRATION_KEY,
        StateKey::InstanceFingerprint => SECRET_KEY_FINGERPRINT,
        StateKey::ConnectorConfig => SECRET_KEY_CONNECTOR_CONFIG,
    }
}

/// Raw access to a single Secret's data.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Read the Secret's data; `None` when the Secret does not exist
    async fn get(&self) -> Result<Option<BTreeMap<String, Vec<u8>>>>;

    /// Create the Secret, or replace the data of the existing one
    async fn put(&self, data: BTreeMap<String, Vec<u8>>) -> Result<()>;
}

/// [`SecretStore`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeSecretStore {
    api: Api<Secret>,
    name: String,
    namespace: String,
}

impl KubeSecretStore {
    /// Address the Secret `name` in `namespace`
    pub fn new(client: Client, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            api: Api::namespaced(client, &namespace),
            name: name.into(),
            namespace,
        }
    }
}

/// Build a new Opaque state Secret carrying `data`.
pub fn build_state_secret(
    name: &str,
    namespace: &str,
    data: BTreeMap<String, Vec<u8>>,
) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some([("name".to_string(), name.to_string())].into()),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(to_byte_strings(data)),
        ..Default::default()
    }
}

fn to_byte_strings(data: BTreeMap<String, Vec<u8>>) -> BTreeMap<String, ByteString> {
    data.into_iter().map(|(k, v)| (k, ByteString(v))).collect()
}

/// Write issued by [`KubeSecretStore::put`]
#[derive(Debug)]
enum SecretWrite {
    Create(Secret),
    Replace(Secret),
}

/// Data of a fetched Secret; a missing Secret reads as `None`.
fn fetched_data(
    fetched: std::result::Result<Secret, kube::Error>,
) -> Result<Option<BTreeMap<String, Vec<u8>>>> {
    match fetched {
        Ok(secret) => Ok(Some(
            secret
                .data
                .unwrap_or_default()
                .into_iter()
                .map(|(k, v)| (k, v.0))
                .collect(),
        )),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Decide how to store `data` given the result of reading the Secret:
/// create it when missing, otherwise replace the data of the fetched
/// object, keeping its metadata.
///
/// Last writer wins: no resourceVersion precondition is carried over from
/// a previous read.
fn plan_write(
    name: &str,
    namespace: &str,
    fetched: std::result::Result<Secret, kube::Error>,
    data: BTreeMap<String, Vec<u8>>,
) -> Result<SecretWrite> {
    match fetched {
        Ok(mut existing) => {
            existing.data = Some(to_byte_strings(data));
            Ok(SecretWrite::Replace(existing))
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            Ok(SecretWrite::Create(build_state_secret(name, namespace, data)))
        }
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get(&self) -> Result<Option<BTreeMap<String, Vec<u8>>>> {
        let data = fetched_data(self.api.get(&self.name).await)?;
        if data.is_none() {
            debug!(secret = %self.name, namespace = %self.namespace, "State Secret not found");
        }
        Ok(data)
    }

    async fn put(&self, data: BTreeMap<String, Vec<u8>>) -> Result<()> {
        let fetched = self.api.get(&self.name).await;
        match plan_write(&self.name, &self.namespace, fetched, data)? {
            SecretWrite::Replace(secret) => {
                self.api
                    .replace(&self.name, &PostParams::default(), &secret)
                    .await?;
                debug!(secret = %self.name, namespace = %self.namespace, "Updated state Secret");
            }
            SecretWrite::Create(secret) => {
                self.api.create(&PostParams::default(), &secret).await?;
                info!(secret = %self.name, namespace = %self.namespace, "Created state Secret");
            }
        }
        Ok(())
    }
}

/// Secret-backed state store. Carries every entry, including the
/// connector config.
#[derive(Clone)]
pub struct SecretPersistence {
    secret: Arc<dyn SecretStore>,
}

impl SecretPersistence {
    /// Persist state through the given Secret
    pub fn new(secret: Arc<dyn SecretStore>) -> Self {
        Self { secret }
    }
}

fn state_to_secret(state: &SerializedState) -> BTreeMap<String, Vec<u8>> {
    StateKey::ALL
        .into_iter()
        .map(|key| {
            (
                secret_key(key).to_string(),
                state.get(key).unwrap_or_default().as_bytes().to_vec(),
            )
        })
        .collect()
}

fn secret_to_state(mut data: BTreeMap<String, Vec<u8>>) -> Result<Option<SerializedState>> {
    if data.is_empty() {
        return Ok(None);
    }
    let mut state = SerializedState::new();
    for key in StateKey::ALL {
        let bytes = data.remove(secret_key(key)).unwrap_or_default();
        let value = String::from_utf8(bytes).map_err(|e| {
            Error::serialization_for_entry(key.name(), format!("secret data is not UTF-8: {}", e))
        })?;
        state.insert(key, value);
    }
    Ok(Some(state))
}

#[async_trait]
impl Persistence for SecretPersistence {
    /// A missing or empty Secret loads as `None`.
    async fn load(&self) -> Result<Option<SerializedState>> {
        match self.secret.get().await? {
            Some(data) => secret_to_state(data),
            None => Ok(None),
        }
    }

    async fn save(&self, state: &SerializedState) -> Result<()> {
        self.secret.put(state_to_secret(state)).await
    }
}
