//! Connector lifecycle against a real vault directory
//!
//! Bootstraps an identity into a temporary vault, rotates the registration
//! key the way the companion agent does, and checks the durable record
//! follows. The Secret is replaced by an in-memory store and the activation
//! service by a mock.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;

use connector_agent::{
    InitOutcome, Initializer, Reconciler, RegistrationClient, SsmRegistration, SyncOutcome,
};
use connector_common::retry::RetryConfig;
use connector_common::{ActivationConfig, Result};
use connector_state::{
    registration_key_path, ConnectorState, FileSystemPersistence, Persistence,
    SecretPersistence, SecretStore,
};

mock! {
    Ssm {}

    #[async_trait]
    impl RegistrationClient for Ssm {
        async fn register_managed_instance(
            &self,
            activation_id: &str,
            activation_code: &str,
            public_key: &str,
            public_key_type: &str,
            fingerprint: &str,
        ) -> Result<String>;

        fn region(&self) -> String;
    }
}

#[derive(Default)]
struct MemorySecret {
    data: Mutex<Option<BTreeMap<String, Vec<u8>>>>,
    puts: Mutex<u32>,
}

impl MemorySecret {
    fn field(&self, key: &str) -> Option<String> {
        self.data
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|d| d.get(key))
            .map(|v| String::from_utf8(v.clone()).unwrap())
    }

    fn puts(&self) -> u32 {
        *self.puts.lock().unwrap()
    }
}

#[async_trait]
impl SecretStore for MemorySecret {
    async fn get(&self) -> Result<Option<BTreeMap<String, Vec<u8>>>> {
        Ok(self.data.lock().unwrap().clone())
    }

    async fn put(&self, data: BTreeMap<String, Vec<u8>>) -> Result<()> {
        *self.data.lock().unwrap() = Some(data);
        *self.puts.lock().unwrap() += 1;
        Ok(())
    }
}

fn activation(id: &str) -> ActivationConfig {
    ActivationConfig {
        id: id.to_string(),
        code: "OJuk0mXbzV".to_string(),
    }
}

fn ssm(instance_id: &'static str, calls: usize) -> MockSsm {
    let mut ssm = MockSsm::new();
    ssm.expect_register_managed_instance()
        .times(calls)
        .returning(move |_, _, _, _, _| Ok(instance_id.to_string()));
    ssm.expect_region().returning(|| "us-west-2".to_string());
    ssm
}

fn initializer(
    id: &str,
    secret: &Arc<MemorySecret>,
    vault: &std::path::Path,
    ssm: MockSsm,
) -> Initializer {
    Initializer::new(
        activation(id),
        Arc::new(SecretPersistence::new(secret.clone())),
        Arc::new(FileSystemPersistence::new(vault)),
        Arc::new(SsmRegistration::new(Arc::new(ssm), activation(id))),
    )
}

#[tokio::test]
async fn story_bootstrap_rotate_and_restart() {
    let vault = tempfile::tempdir().unwrap();
    let secret = Arc::new(MemorySecret::default());

    // First start: nothing recorded, a new instance is registered
    let outcome = initializer("A", &secret, vault.path(), ssm("mi-0123456789abcdef0", 1))
        .initialize()
        .await
        .unwrap();
    assert_eq!(outcome, InitOutcome::Registered);

    let regkey = std::fs::read_to_string(registration_key_path(vault.path())).unwrap();
    assert!(regkey.contains(r#""instanceID":"mi-0123456789abcdef0""#));
    assert!(regkey.contains(r#""region":"us-west-2""#));
    assert_eq!(secret.field("regkey").as_deref(), Some(regkey.as_str()));
    assert_eq!(
        secret.field("connector-config").as_deref(),
        Some(r#"{"activationId":"A"}"#)
    );

    // The agent rotates its key in place
    let fs = FileSystemPersistence::new(vault.path());
    let local = fs.load().await.unwrap().unwrap();
    let mut rotated = ConnectorState::deserialize(&local).unwrap();
    rotated.private_key = "cm90YXRlZCBrZXk=".to_string();
    let rotated_regkey = rotated
        .serialize()
        .unwrap()
        .get(connector_state::StateKey::RegistrationKey)
        .unwrap()
        .to_string();
    std::fs::write(registration_key_path(vault.path()), &rotated_regkey).unwrap();

    let reconciler = Reconciler::new(
        Arc::new(FileSystemPersistence::new(vault.path())),
        Arc::new(SecretPersistence::new(secret.clone())),
    )
    .with_retry(RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        backoff_multiplier: 2.0,
    });
    assert_eq!(
        reconciler.sync_with_backoff().await.unwrap(),
        SyncOutcome::Updated
    );
    assert_eq!(
        reconciler.sync_with_backoff().await.unwrap(),
        SyncOutcome::Unchanged
    );
    assert_eq!(secret.field("regkey"), Some(rotated_regkey.clone()));
    assert_eq!(
        secret.field("connector-config").as_deref(),
        Some(r#"{"activationId":"A"}"#)
    );
    assert_eq!(secret.puts(), 2);

    // Pod restart with a fresh vault: the rotated identity is inherited
    let fresh_vault = tempfile::tempdir().unwrap();
    let outcome = initializer("A", &secret, fresh_vault.path(), ssm("mi-unused", 0))
        .initialize()
        .await
        .unwrap();
    assert_eq!(outcome, InitOutcome::Inherited);
    assert_eq!(
        std::fs::read_to_string(registration_key_path(fresh_vault.path())).unwrap(),
        rotated_regkey
    );
}

#[tokio::test]
async fn story_new_activation_replaces_identity() {
    let vault = tempfile::tempdir().unwrap();
    let secret = Arc::new(MemorySecret::default());

    initializer("A", &secret, vault.path(), ssm("mi-first", 1))
        .initialize()
        .await
        .unwrap();
    let outcome = initializer("B", &secret, vault.path(), ssm("mi-second", 1))
        .initialize()
        .await
        .unwrap();

    assert_eq!(outcome, InitOutcome::Registered);
    assert!(secret.field("regkey").unwrap().contains("mi-second"));
    assert_eq!(
        secret.field("connector-config").as_deref(),
        Some(r#"{"activationId":"B"}"#)
    );
    let regkey = std::fs::read_to_string(registration_key_path(vault.path())).unwrap();
    assert!(regkey.contains("mi-second"));
}
