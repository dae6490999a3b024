use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use dcv_common::InstanceState;
use thiserror::Error;

/// The cloud API boundary the orchestrator drives.
///
/// Only the two calls a provisioning run needs: submit one launch, then read
/// back the instance state. Termination, tagging and pricing are left to the
/// provider's own tooling.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Submit a launch for exactly one instance and return its id.
    /// Never retried by callers: a repeat could create a second instance.
    async fn launch_instance(&self, spec: LaunchSpec) -> Result<String, ProviderError>;

    async fn describe_instance(
        &self,
        instance_id: &str,
    ) -> Result<InstanceDescription, ProviderError>;
}

/// Everything a provider needs to start the instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchSpec {
    pub image_id: String,
    pub instance_class: String,
    pub key_pair_name: String,
    pub security_group_id: String,
    pub boot_script: Vec<u8>,
    /// Idempotency token. A repeated launch with the same token returns the
    /// original instance instead of creating another.
    pub client_token: String,
}

impl LaunchSpec {
    /// Boot payload in the binary-safe form launch APIs expect (base64).
    pub fn encoded_boot_script(&self) -> String {
        STANDARD.encode(&self.boot_script)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceDescription {
    pub state: InstanceState,
    pub public_address: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request throttled: {0}")]
    Throttled(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{code}: {message}")]
    Rejected { code: String, message: String },

    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),

    #[error("provider client error: {0}")]
    Client(String),
}

impl ProviderError {
    /// Faults worth another try: the network, rate limits, and reads that race
    /// the provider's eventual consistency right after a launch.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Transport(_) | ProviderError::Throttled(_) | ProviderError::NotFound(_)
        )
    }

    /// For a mutating call: the request may still have taken effect on the
    /// provider side (no answer, a server fault, or an unreadable success).
    pub fn may_have_taken_effect(&self) -> bool {
        matches!(
            self,
            ProviderError::Transport(_) | ProviderError::InvalidResponse(_)
        )
    }
}

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "ec2")]
pub mod ec2;
