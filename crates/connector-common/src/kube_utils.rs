//! Kubernetes helpers: client construction and pod identity
//!
//! The connector runs as a StatefulSet. Each replica keeps its durable
//! state in its own Secret, named after the replica's ordinal index.

use std::time::Duration;

use tracing::debug;

use crate::{Error, Result, StateConfig};

/// Environment variable carrying the pod name (set via the downward API)
pub const ENV_POD_NAME: &str = "POD_NAME";

/// Connection timeout for kube clients
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Read timeout for kube clients
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait for reading the pod environment
///
/// Abstracts environment variable access so pod identity can be tested
/// without touching process-wide state.
#[cfg_attr(test, mockall::automock)]
pub trait PodEnv: Send + Sync {
    /// Name of the running pod, if known
    fn pod_name(&self) -> Option<String>;
}

/// Default implementation that reads from environment variables
#[derive(Clone, Default)]
pub struct OsPodEnv;

impl PodEnv for OsPodEnv {
    fn pod_name(&self) -> Option<String> {
        std::env::var(ENV_POD_NAME).ok()
    }
}

/// Extract the StatefulSet ordinal index from a pod name.
///
/// `eks-connector-0` yields `0`. Names without a `-`, or ending in one,
/// are rejected.
pub fn pod_index(pod_name: &str) -> Result<String> {
    match pod_name.rfind('-') {
        Some(idx) if idx + 1 < pod_name.len() => Ok(pod_name[idx + 1..].to_string()),
        _ => Err(Error::validation_for_field(
            ENV_POD_NAME,
            format!("unexpected pod name '{}'", pod_name),
        )),
    }
}

/// Resolve the ordinal index of the running pod.
pub fn current_pod_index(env: &dyn PodEnv) -> Result<String> {
    let pod = env
        .pod_name()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            Error::validation_for_field(
                ENV_POD_NAME,
                format!("cannot get pod name from env {}", ENV_POD_NAME),
            )
        })?;
    let index = pod_index(&pod)?;
    debug!(pod = %pod, index = %index, "Resolved pod index");
    Ok(index)
}

/// Name of the durable state Secret for the running pod.
pub fn state_secret_name(state: &StateConfig, env: &dyn PodEnv) -> Result<String> {
    Ok(state.secret_name(&current_pod_index(env)?))
}

/// Create a Kubernetes client from the inferred (in-cluster) configuration.
pub async fn create_client() -> Result<kube::Client> {
    let mut config = kube::Config::infer()
        .await
        .map_err(|e| Error::from(kube::Error::InferConfig(e)))?;
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
    Ok(kube::Client::try_from(config)?)
}
