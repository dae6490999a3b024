use thiserror::Error;

/// Everything that ends a provisioning run.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("missing required configuration: {name}")]
    MissingConfiguration { name: &'static str },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("invalid {field} choice: '{input}'")]
    InvalidSelection { field: &'static str, input: String },

    #[error("instance launch rejected by provider: {message}")]
    LaunchFailed { message: String },

    /// The launch request may have reached the provider but no answer came
    /// back, so an instance may exist. `client_token` identifies it.
    #[error("instance launch outcome unknown (client token {client_token}): {message}")]
    LaunchUnconfirmed {
        message: String,
        client_token: String,
    },

    #[error("provider error while polling instance {instance_id}: {message}")]
    ProviderTransport {
        instance_id: String,
        message: String,
    },

    #[error("instance {instance_id} entered state '{state}' before reaching running")]
    InstanceFailed { instance_id: String, state: String },

    #[error("instance {instance_id} not ready after {attempts} status checks")]
    ProvisionIncomplete { instance_id: String, attempts: u32 },

    #[error("provisioning cancelled")]
    Cancelled { instance_id: Option<String> },
}

impl ProvisionError {
    /// Process exit code for the CLI, one per error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            ProvisionError::MissingConfiguration { .. } | ProvisionError::Configuration(_) => 2,
            ProvisionError::InvalidSelection { .. } => 3,
            ProvisionError::LaunchFailed { .. } => 4,
            ProvisionError::ProviderTransport { .. } => 5,
            ProvisionError::InstanceFailed { .. } => 6,
            ProvisionError::ProvisionIncomplete { .. } => 7,
            ProvisionError::LaunchUnconfirmed { .. } => 8,
            ProvisionError::Cancelled { .. } => 130,
        }
    }

    /// Id of an instance that exists on the provider side despite the failure.
    pub fn instance_id(&self) -> Option<&str> {
        match self {
            ProvisionError::ProviderTransport { instance_id, .. }
            | ProvisionError::InstanceFailed { instance_id, .. }
            | ProvisionError::ProvisionIncomplete { instance_id, .. } => Some(instance_id),
            ProvisionError::Cancelled { instance_id } => instance_id.as_deref(),
            _ => None,
        }
    }

    /// Operator warning for runs that may have left a billable instance behind.
    pub fn leftover_warning(&self) -> Option<String> {
        if let Some(instance_id) = self.instance_id() {
            return Some(format!(
                "Instance {} was created and has not been terminated. It may still be running and billing.",
                instance_id
            ));
        }
        match self {
            ProvisionError::LaunchUnconfirmed { client_token, .. } => Some(format!(
                "The launch may have succeeded. Look for an instance with client token {} and terminate it if unwanted.",
                client_token
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_per_class() {
        let errors = [
            ProvisionError::MissingConfiguration { name: "AWS_KEYPAIR_NAME" },
            ProvisionError::InvalidSelection {
                field: "operating system",
                input: "3".into(),
            },
            ProvisionError::LaunchFailed { message: "quota".into() },
            ProvisionError::ProviderTransport {
                instance_id: "i-1".into(),
                message: "timeout".into(),
            },
            ProvisionError::InstanceFailed {
                instance_id: "i-1".into(),
                state: "terminated".into(),
            },
            ProvisionError::ProvisionIncomplete {
                instance_id: "i-1".into(),
                attempts: 3,
            },
            ProvisionError::Cancelled { instance_id: None },
            ProvisionError::LaunchUnconfirmed {
                message: "timed out".into(),
                client_token: "tok".into(),
            },
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn instance_id_only_after_launch() {
        assert_eq!(
            ProvisionError::LaunchFailed { message: "x".into() }.instance_id(),
            None
        );
        assert_eq!(
            ProvisionError::ProvisionIncomplete {
                instance_id: "i-9".into(),
                attempts: 1
            }
            .instance_id(),
            Some("i-9")
        );
        assert_eq!(
            ProvisionError::Cancelled {
                instance_id: Some("i-7".into())
            }
            .instance_id(),
            Some("i-7")
        );
    }

    #[test]
    fn leftover_warning_only_when_an_instance_may_exist() {
        assert_eq!(
            ProvisionError::LaunchFailed { message: "x".into() }.leftover_warning(),
            None
        );
        assert_eq!(
            ProvisionError::Cancelled { instance_id: None }.leftover_warning(),
            None
        );

        let failed = ProvisionError::InstanceFailed {
            instance_id: "i-3".into(),
            state: "stopped".into(),
        };
        assert!(failed.leftover_warning().unwrap().contains("i-3"));

        let unconfirmed = ProvisionError::LaunchUnconfirmed {
            message: "operation timed out".into(),
            client_token: "4f1c".into(),
        };
        assert_eq!(unconfirmed.instance_id(), None);
        assert!(unconfirmed.leftover_warning().unwrap().contains("4f1c"));
    }
}
