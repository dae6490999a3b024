use dcv_common::ProvisionError;
use dcv_providers::ComputeProvider;

use crate::settings::Settings;
#[cfg(feature = "provider-ec2")]
use crate::settings::{ACCESS_KEY_ID_VAR, SECRET_ACCESS_KEY_VAR};

/// Simulated pending answers before the mock provider reports running.
#[cfg(feature = "provider-mock")]
const MOCK_PENDING_POLLS: usize = 2;

pub struct ProviderManager;

impl ProviderManager {
    pub fn current_provider_name(settings: &Settings) -> &str {
        &settings.provider
    }

    /// Build the provider named `provider_name`. Only providers compiled in via
    /// the `provider-*` features are available.
    #[cfg_attr(not(feature = "provider-ec2"), allow(unused_variables))]
    pub fn get_provider(
        provider_name: &str,
        settings: &Settings,
    ) -> Result<Box<dyn ComputeProvider>, ProvisionError> {
        match provider_name.trim().to_lowercase().as_str() {
            #[cfg(feature = "provider-ec2")]
            "ec2" => {
                use dcv_providers::ec2::{Credentials, Ec2Provider};

                let access_key_id = settings
                    .access_key_id
                    .clone()
                    .ok_or(ProvisionError::MissingConfiguration {
                        name: ACCESS_KEY_ID_VAR,
                    })?;
                let secret_access_key = settings.secret_access_key.clone().ok_or(
                    ProvisionError::MissingConfiguration {
                        name: SECRET_ACCESS_KEY_VAR,
                    },
                )?;
                let credentials = Credentials {
                    access_key_id,
                    secret_access_key,
                    session_token: settings.session_token.clone(),
                };
                let provider = match settings.ec2_endpoint.as_deref() {
                    Some(endpoint) => {
                        Ec2Provider::with_endpoint(settings.region.clone(), credentials, endpoint)
                    }
                    None => Ec2Provider::new(settings.region.clone(), credentials),
                }
                .map_err(|e| ProvisionError::Configuration(format!("ec2 client: {}", e)))?;
                Ok(Box::new(provider))
            }
            #[cfg(feature = "provider-mock")]
            "mock" => Ok(Box::new(dcv_providers::mock::MockProvider::simulated(
                MOCK_PENDING_POLLS,
            ))),
            other => Err(ProvisionError::Configuration(format!(
                "unknown or disabled provider '{}'",
                other
            ))),
        }
    }
}
