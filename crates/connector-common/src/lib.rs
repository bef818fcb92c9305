//! Common types for the cluster connector: errors, configuration, and utilities

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod kube_utils;
pub mod retry;
pub mod telemetry;

pub use config::{ActivationConfig, AgentConfig, ConnectorConfig, StateConfig};
pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Vault directory of the companion SSM agent container
pub const DEFAULT_STATE_BASE_DIR: &str = "/var/lib/amazon/ssm/Vault";

/// Default prefix of the Secret holding durable connector state
pub const DEFAULT_SECRET_NAME_PREFIX: &str = "eks-connector-state";

/// Default namespace of the Secret holding durable connector state
pub const DEFAULT_SECRET_NAMESPACE: &str = "eks-connector";

/// Default AWS region the agent registers against
pub const DEFAULT_REGION: &str = "us-west-2";
