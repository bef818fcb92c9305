//! Conversion between [`ConnectorState`] and [`SerializedState`]
//!
//! The payload formats are dictated by the companion SSM agent, which reads
//! `Manifest`, `Store/RegistrationKey` and `Store/InstanceFingerprint` from
//! its vault directory. Field names and order must stay bit-compatible.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use connector_common::{Error, Result};

use crate::state::{ConnectorState, SerializedState, StateKey};

/// Path of the instance fingerprint file as seen by the companion agent
pub const AGENT_INSTANCE_FINGERPRINT_PATH: &str =
    "/var/lib/amazon/ssm/Vault/Store/InstanceFingerprint";

/// Path of the registration key file as seen by the companion agent
pub const AGENT_REGISTRATION_KEY_PATH: &str = "/var/lib/amazon/ssm/Vault/Store/RegistrationKey";

/// Similarity threshold that disables hardware matching in the agent
const SIMILARITY_THRESHOLD_DISABLED: i32 = -1;

#[derive(Debug, Serialize)]
struct ManifestDoc {
    #[serde(rename = "InstanceFingerprint")]
    instance_fingerprint: String,
    #[serde(rename = "RegistrationKey")]
    registration_key: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct InstanceFingerprintDoc {
    fingerprint: String,
    #[serde(rename = "hardwareHash")]
    hardware_hash: BTreeMap<String, String>,
    #[serde(rename = "similarityThreshold")]
    similarity_threshold: i32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct RegistrationKeyDoc {
    #[serde(rename = "instanceID")]
    instance_id: String,
    region: String,
    #[serde(rename = "InstanceType")]
    instance_type: String,
    #[serde(rename = "availabilityZone")]
    availability_zone: String,
    #[serde(rename = "privateKey")]
    private_key: String,
    #[serde(rename = "privateKeyType")]
    private_key_type: String,
    #[serde(rename = "privateKeyCreatedDate")]
    private_key_created_date: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct ConnectorConfigDoc {
    #[serde(rename = "activationId")]
    activation_id: String,
}

impl ConnectorState {
    /// Render every logical entry.
    ///
    /// `InstanceType`, `availabilityZone`, `hardwareHash` and
    /// `similarityThreshold` are always written with fixed values.
    pub fn serialize(&self) -> Result<SerializedState> {
        let mut state = SerializedState::new();

        state.insert(
            StateKey::Manifest,
            encode(
                StateKey::Manifest,
                &ManifestDoc {
                    instance_fingerprint: AGENT_INSTANCE_FINGERPRINT_PATH.to_string(),
                    registration_key: AGENT_REGISTRATION_KEY_PATH.to_string(),
                },
            )?,
        );

        state.insert(
            StateKey::RegistrationKey,
            encode(
                StateKey::RegistrationKey,
                &RegistrationKeyDoc {
                    instance_id: self.instance_id.clone(),
                    region: self.region.clone(),
                    instance_type: String::new(),
                    availability_zone: String::new(),
                    private_key: self.private_key.clone(),
                    private_key_type: self.private_key_type.clone(),
                    private_key_created_date: self.private_key_created_date.clone(),
                },
            )?,
        );

        state.insert(
            StateKey::InstanceFingerprint,
            encode(
                StateKey::InstanceFingerprint,
                &InstanceFingerprintDoc {
                    fingerprint: self.fingerprint.clone(),
                    hardware_hash: BTreeMap::new(),
                    similarity_threshold: SIMILARITY_THRESHOLD_DISABLED,
                },
            )?,
        );

        state.insert(
            StateKey::ConnectorConfig,
            encode(
                StateKey::ConnectorConfig,
                &ConnectorConfigDoc {
                    activation_id: self.activation_id.clone(),
                },
            )?,
        );

        Ok(state)
    }

    /// Rebuild the structured state from its serialized form.
    ///
    /// Missing or empty entries yield default fields; a non-empty entry that
    /// is not valid JSON is an error. State written before the activation id
    /// was recorded has no connector config and yields an empty
    /// `activation_id`.
    pub fn deserialize(state: &SerializedState) -> Result<Self> {
        let fingerprint: InstanceFingerprintDoc =
            decode_if_present(state, StateKey::InstanceFingerprint)?;
        let reg_key: RegistrationKeyDoc = decode_if_present(state, StateKey::RegistrationKey)?;
        let connector_config: ConnectorConfigDoc =
            decode_if_present(state, StateKey::ConnectorConfig)?;

        Ok(Self {
            activation_id: connector_config.activation_id,
            fingerprint: fingerprint.fingerprint,
            instance_id: reg_key.instance_id,
            private_key: reg_key.private_key,
            private_key_type: reg_key.private_key_type,
            private_key_created_date: reg_key.private_key_created_date,
            region: reg_key.region,
        })
    }
}

fn encode<T: Serialize>(key: StateKey, value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::serialization_for_entry(key.name(), e.to_string()))
}

fn decode_if_present<T: DeserializeOwned + Default>(
    state: &SerializedState,
    key: StateKey,
) -> Result<T> {
    match state.non_empty(key) {
        Some(text) => serde_json::from_str(text)
            .map_err(|e| Error::serialization_for_entry(key.name(), e.to_string())),
        None => Ok(T::default()),
    }
}
