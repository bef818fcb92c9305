//! Client for the remote activation service (AWS Systems Manager)
//!
//! `RegisterManagedInstance` is an anonymous call: the activation code is
//! the credential, so requests are not SigV4-signed. The operation is not
//! part of the public SDKs; it is spoken directly over the AWS JSON 1.1
//! protocol.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use connector_common::{AgentConfig, Error, Result};

const TARGET_REGISTER_MANAGED_INSTANCE: &str = "AmazonSSM.RegisterManagedInstance";
const CONTENT_TYPE_AMZ_JSON: &str = "application/x-amz-json-1.1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Operations of the activation service the connector depends on.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RegistrationClient: Send + Sync {
    /// Register a managed instance, returning its instance id.
    async fn register_managed_instance(
        &self,
        activation_id: &str,
        activation_code: &str,
        public_key: &str,
        public_key_type: &str,
        fingerprint: &str,
    ) -> Result<String>;

    /// Region the client talks to
    fn region(&self) -> String;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct RegisterManagedInstanceInput<'a> {
    activation_code: &'a str,
    activation_id: &'a str,
    public_key: &'a str,
    public_key_type: &'a str,
    fingerprint: &'a str,
}

#[derive(Debug, Deserialize)]
struct RegisterManagedInstanceOutput {
    #[serde(rename = "InstanceId")]
    instance_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServiceError {
    #[serde(rename = "__type")]
    error_type: String,
    #[serde(alias = "Message")]
    message: String,
}

/// Regional endpoint, unless an override is configured.
pub fn resolve_endpoint(config: &AgentConfig) -> String {
    match config.endpoint.as_deref().filter(|e| !e.is_empty()) {
        Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
        None => format!("https://ssm.{}.amazonaws.com", config.region),
    }
}

fn parse_response(status: u16, body: &[u8]) -> Result<String> {
    if !(200..300).contains(&status) {
        let err: ServiceError = serde_json::from_slice(body).unwrap_or_default();
        // Shape names arrive as "com.amazonaws.ssm#InvalidActivation"
        let kind = err
            .error_type
            .rsplit('#')
            .next()
            .filter(|k| !k.is_empty())
            .unwrap_or("UnknownError");
        return Err(Error::registration_with_status(
            status,
            format!("{}: {}", kind, err.message),
        ));
    }

    let output: RegisterManagedInstanceOutput = serde_json::from_slice(body)
        .map_err(|e| Error::registration(format!("malformed response: {}", e)))?;
    output
        .instance_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::registration("response did not contain an InstanceId"))
}

/// [`RegistrationClient`] speaking to SSM over HTTPS.
#[derive(Clone)]
pub struct SsmClient {
    http: reqwest::Client,
    endpoint: String,
    region: String,
}

impl SsmClient {
    /// Create a client for the configured region/endpoint
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let endpoint = resolve_endpoint(config);
        if config.endpoint.is_some() {
            info!(endpoint = %endpoint, "Overriding SSM endpoint");
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::registration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            endpoint,
            region: config.region.clone(),
        })
    }
}

#[async_trait]
impl RegistrationClient for SsmClient {
    async fn register_managed_instance(
        &self,
        activation_id: &str,
        activation_code: &str,
        public_key: &str,
        public_key_type: &str,
        fingerprint: &str,
    ) -> Result<String> {
        let input = RegisterManagedInstanceInput {
            activation_code,
            activation_id,
            public_key,
            public_key_type,
            fingerprint,
        };
        let body = serde_json::to_vec(&input).map_err(|e| Error::serialization(e.to_string()))?;

        debug!(endpoint = %self.endpoint, "Calling RegisterManagedInstance");
        let response = self
            .http
            .post(format!("{}/", self.endpoint))
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE_AMZ_JSON)
            .header("X-Amz-Target", TARGET_REGISTER_MANAGED_INSTANCE)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::registration(format!("request failed: {}", e)))?;

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::registration(format!("failed to read response: {}", e)))?;
        parse_response(status, &bytes)
    }

    fn region(&self) -> String {
        self.region.clone()
    }
}
