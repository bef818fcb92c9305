//! Connector state model
//!
//! [`ConnectorState`] is the structured identity produced by a registration.
//! [`SerializedState`] is the same identity rendered into the opaque payloads
//! the companion agent reads, keyed by logical entry.

use std::collections::BTreeMap;

/// Logical entries of a serialized state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StateKey {
    /// Static pointer document naming the two credential files
    Manifest,
    /// Instance id, region and private key
    RegistrationKey,
    /// Instance fingerprint
    InstanceFingerprint,
    /// Connector-only metadata (activation id); never seen by the agent
    ConnectorConfig,
}

impl StateKey {
    /// All entries, in serialization order
    pub const ALL: [StateKey; 4] = [
        StateKey::Manifest,
        StateKey::RegistrationKey,
        StateKey::InstanceFingerprint,
        StateKey::ConnectorConfig,
    ];

    /// Logical name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            StateKey::Manifest => "manifest",
            StateKey::RegistrationKey => "registrationKey",
            StateKey::InstanceFingerprint => "instanceFingerprint",
            StateKey::ConnectorConfig => "connectorConfig",
        }
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Serialized connector state: logical entry -> payload.
///
/// An empty payload means the same as a missing entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerializedState(BTreeMap<StateKey, String>);

impl SerializedState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload of an entry, if present
    pub fn get(&self, key: StateKey) -> Option<&str> {
        self.0.get(&key).map(String::as_str)
    }

    /// Payload of an entry, treating an empty payload as absent
    pub fn non_empty(&self, key: StateKey) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    /// Set the payload of an entry
    pub fn insert(&mut self, key: StateKey, value: impl Into<String>) {
        self.0.insert(key, value.into());
    }

    /// Remove an entry, returning its payload
    pub fn remove(&mut self, key: StateKey) -> Option<String> {
        self.0.remove(&key)
    }
}

impl FromIterator<(StateKey, String)> for SerializedState {
    fn from_iter<I: IntoIterator<Item = (StateKey, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Identity of a registered managed instance.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectorState {
    /// Activation id the instance was registered with; empty for state
    /// written before the connector recorded it
    pub activation_id: String,
    /// Random fingerprint sent at registration
    pub fingerprint: String,
    /// Managed instance id assigned by the activation service
    pub instance_id: String,
    /// Base64 DER (PKCS#1) private key
    pub private_key: String,
    /// Key algorithm tag (e.g. "Rsa")
    pub private_key_type: String,
    /// Key creation timestamp in the companion agent's format
    pub private_key_created_date: String,
    /// Region the instance is registered in
    pub region: String,
}

impl std::fmt::Debug for ConnectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorState")
            .field("activation_id", &self.activation_id)
            .field("fingerprint", &self.fingerprint)
            .field("instance_id", &self.instance_id)
            .field("private_key", &"<redacted>")
            .field("private_key_type", &self.private_key_type)
            .field("private_key_created_date", &self.private_key_created_date)
            .field("region", &self.region)
            .finish()
    }
}
