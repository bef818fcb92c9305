//! Cluster connector
//!
//! Registers the cluster as a managed instance with the activation service
//! and keeps the companion agent's credentials durable across pod restarts.
//!
//! - `connector init`: one-shot bootstrap, run as an init container
//! - `connector server`: keeps the durable record in sync with key
//!   rotations performed by the companion agent

pub mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use connector_common::telemetry::LogFormat;
use connector_common::{
    ActivationConfig, AgentConfig, ConnectorConfig, StateConfig, DEFAULT_REGION,
    DEFAULT_SECRET_NAMESPACE, DEFAULT_SECRET_NAME_PREFIX, DEFAULT_STATE_BASE_DIR,
};

/// Cluster connector
#[derive(Parser, Debug)]
#[command(name = "connector", version, about, long_about = None)]
pub struct Cli {
    /// Log format: text or json
    #[arg(long, global = true, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register (or inherit) the connector identity and write it for the agent
    Init(InitArgs),
    /// Keep the durable state in sync with the agent's local files
    Server(ServerArgs),
}

/// Activation service flags
#[derive(Args, Debug, Clone)]
pub struct AgentArgs {
    /// AWS region of the activation
    #[arg(long = "agent-region", env = "AGENT_REGION", default_value = DEFAULT_REGION)]
    pub region: String,

    /// Activation service endpoint override
    #[arg(long = "agent-endpoint", env = "AGENT_ENDPOINT")]
    pub endpoint: Option<String>,
}

/// Activation credential flags
#[derive(Args, Debug, Clone)]
pub struct ActivationArgs {
    /// Activation id
    #[arg(long = "activation-id", env = "ACTIVATION_ID")]
    pub id: String,

    /// Activation code
    #[arg(long = "activation-code", env = "ACTIVATION_CODE", hide_env_values = true)]
    pub code: String,
}

/// State location flags
#[derive(Args, Debug, Clone)]
pub struct StateArgs {
    /// Vault directory of the companion agent
    #[arg(long = "state-base-dir", env = "STATE_BASE_DIR", default_value = DEFAULT_STATE_BASE_DIR)]
    pub base_dir: PathBuf,

    /// Prefix of the Secret holding durable state
    #[arg(
        long = "state-secret-name-prefix",
        env = "STATE_SECRET_NAME_PREFIX",
        default_value = DEFAULT_SECRET_NAME_PREFIX
    )]
    pub secret_name_prefix: String,

    /// Namespace of the Secret holding durable state
    #[arg(
        long = "state-secret-namespace",
        env = "STATE_SECRET_NAMESPACE",
        default_value = DEFAULT_SECRET_NAMESPACE
    )]
    pub secret_namespace: String,
}

impl From<StateArgs> for StateConfig {
    fn from(args: StateArgs) -> Self {
        Self {
            base_dir: args.base_dir,
            secret_name_prefix: args.secret_name_prefix,
            secret_namespace: args.secret_namespace,
        }
    }
}

/// `init` arguments
#[derive(Args, Debug)]
pub struct InitArgs {
    #[command(flatten)]
    pub agent: AgentArgs,

    #[command(flatten)]
    pub activation: ActivationArgs,

    #[command(flatten)]
    pub state: StateArgs,
}

impl InitArgs {
    /// Assemble the connector configuration
    pub fn into_config(self) -> ConnectorConfig {
        ConnectorConfig {
            agent: AgentConfig {
                region: self.agent.region,
                endpoint: self.agent.endpoint.filter(|e| !e.is_empty()),
            },
            activation: ActivationConfig {
                id: self.activation.id,
                code: self.activation.code,
            },
            state: self.state.into(),
        }
    }
}

/// `server` arguments
#[derive(Args, Debug)]
pub struct ServerArgs {
    #[command(flatten)]
    pub state: StateArgs,
}

impl Cli {
    /// Run the selected command
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Commands::Init(args) => commands::init::run(args.into_config()).await,
            Commands::Server(args) => commands::server::run(args.state.into()).await,
        }
    }
}
