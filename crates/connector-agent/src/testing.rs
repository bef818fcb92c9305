//! In-memory store used by the initializer and reconciler tests

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use connector_common::{Error, Result};
use connector_state::{ConnectorState, Persistence, SerializedState};

/// [`Persistence`] over a single in-memory slot, recording every save.
#[derive(Default)]
pub struct MemoryPersistence {
    state: Mutex<Option<SerializedState>>,
    saves: Mutex<Vec<SerializedState>>,
    loads: AtomicU32,
    load_failures: AtomicU32,
    save_failures: AtomicU32,
    failure: Option<fn() -> Error>,
}

impl MemoryPersistence {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_state(state: SerializedState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            ..Default::default()
        }
    }

    /// Fail the next `n` loads
    pub fn fail_loads(self, n: u32) -> Self {
        self.load_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Fail the next `n` saves
    pub fn fail_saves(self, n: u32) -> Self {
        self.save_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Fail injected loads and saves with `error` instead of a transient
    /// internal error
    pub fn failing_with(mut self, error: fn() -> Error) -> Self {
        self.failure = Some(error);
        self
    }

    /// Number of load calls, failed ones included
    pub fn loads(&self) -> u32 {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Option<SerializedState> {
        self.state.lock().unwrap().clone()
    }

    pub fn saves(&self) -> Vec<SerializedState> {
        self.saves.lock().unwrap().clone()
    }

    /// Replace the stored state without recording a save
    pub fn set(&self, state: SerializedState) {
        *self.state.lock().unwrap() = Some(state);
    }
}

impl MemoryPersistence {
    fn injected(&self, op: &str) -> Error {
        match self.failure {
            Some(error) => error(),
            None => Error::internal_with_context(op, "injected failure"),
        }
    }
}

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn load(&self) -> Result<Option<SerializedState>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.load_failures) {
            return Err(self.injected("load"));
        }
        Ok(self.current())
    }

    async fn save(&self, state: &SerializedState) -> Result<()> {
        if take_failure(&self.save_failures) {
            return Err(self.injected("save"));
        }
        self.saves.lock().unwrap().push(state.clone());
        self.set(state.clone());
        Ok(())
    }
}

/// Kubernetes API rejection with the given status code
pub fn api_error(code: u16) -> Error {
    kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: "secrets \"eks-connector-state-0\" is forbidden".to_string(),
        reason: "Forbidden".to_string(),
        code,
    })
    .into()
}

/// A registered state with the given activation id and instance id
pub fn sample_state(activation_id: &str, instance_id: &str) -> ConnectorState {
    ConnectorState {
        activation_id: activation_id.to_string(),
        fingerprint: "d3a9c8a4-5b2f-4d4e-9f57-3c1f3e1a2b6c".to_string(),
        instance_id: instance_id.to_string(),
        private_key: "cHJpdmF0ZSBrZXkgYnl0ZXM=".to_string(),
        private_key_type: "Rsa".to_string(),
        private_key_created_date: "2021-10-05 05:27:47.693369915 +0000 UTC".to_string(),
        region: "us-west-2".to_string(),
    }
}
