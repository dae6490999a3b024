use dcv_common::{OsFamily, ProvisionError, SizeClass};
use std::fmt;
use std::fs;
use std::time::Duration;

use crate::catalog::Catalog;
use crate::poll::PollPolicy;

pub const KEYPAIR_NAME_VAR: &str = "AWS_KEYPAIR_NAME";
pub const SECURITY_GROUP_ID_VAR: &str = "AWS_SECURITY_GROUP_ID";
pub const ACCESS_KEY_ID_VAR: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_ACCESS_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";

pub const DEFAULT_PROVIDER: &str = "ec2";
pub const DEFAULT_REGION: &str = "us-east-1";

/// Process configuration, read once at startup.
#[derive(Clone)]
pub struct Settings {
    pub provider: String,
    pub key_pair_name: Option<String>,
    pub security_group_id: Option<String>,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub ec2_endpoint: Option<String>,
    pub poll_policy: PollPolicy,
    pub image_overrides: Vec<(OsFamily, SizeClass, String)>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("provider", &self.provider)
            .field("key_pair_name", &self.key_pair_name)
            .field("security_group_id", &self.security_group_id)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "<redacted>"))
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("ec2_endpoint", &self.ec2_endpoint)
            .field("poll_policy", &self.poll_policy)
            .field("image_overrides", &self.image_overrides)
            .finish()
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ProvisionError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Values are trimmed; blank means unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ProvisionError> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        // Prefer *_FILE for secrets (Docker/K8s friendly), fallback to env var.
        let secret_access_key = get("AWS_SECRET_ACCESS_KEY_FILE")
            .and_then(|path| fs::read_to_string(path).ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| get(SECRET_ACCESS_KEY_VAR));

        let mut poll_policy = PollPolicy::default();
        if let Some(secs) = parse_number::<u64>(&get, "DCV_POLL_INTERVAL_SECS")? {
            if secs == 0 {
                return Err(ProvisionError::Configuration(
                    "DCV_POLL_INTERVAL_SECS must be at least 1".to_string(),
                ));
            }
            poll_policy.interval = Duration::from_secs(secs);
        }
        if let Some(max) = parse_number::<u32>(&get, "DCV_POLL_MAX_ATTEMPTS")? {
            poll_policy.max_attempts = (max > 0).then_some(max);
        }
        if let Some(max) = parse_number::<u32>(&get, "DCV_POLL_MAX_TRANSIENT_ERRORS")? {
            poll_policy.max_transient_errors = Some(max);
        }

        let mut image_overrides = Vec::new();
        for os in OsFamily::ALL {
            for size in SizeClass::ALL {
                if let Some(image) = get(&image_override_var(os, size)) {
                    image_overrides.push((os, size, image));
                }
            }
        }

        Ok(Self {
            provider: get("PROVIDER")
                .map(|p| p.to_ascii_lowercase())
                .unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
            key_pair_name: get(KEYPAIR_NAME_VAR),
            security_group_id: get(SECURITY_GROUP_ID_VAR),
            region: get("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            access_key_id: get(ACCESS_KEY_ID_VAR),
            secret_access_key,
            session_token: get("AWS_SESSION_TOKEN"),
            ec2_endpoint: get("AWS_EC2_ENDPOINT"),
            poll_policy,
            image_overrides,
        })
    }

    /// Built-in catalog with this configuration's image overrides applied.
    pub fn catalog(&self) -> Result<Catalog, ProvisionError> {
        let mut catalog = Catalog::builtin()?;
        for (os, size, image) in &self.image_overrides {
            catalog.override_image(*os, *size, image)?;
        }
        Ok(catalog)
    }

    pub fn key_pair_name(&self) -> &str {
        self.key_pair_name.as_deref().unwrap_or("")
    }

    pub fn security_group_id(&self) -> &str {
        self.security_group_id.as_deref().unwrap_or("")
    }
}

/// `DCV_IMAGE_LINUX_SMALL`, `DCV_IMAGE_WINDOWS_LARGE`, ...
pub fn image_override_var(os: OsFamily, size: SizeClass) -> String {
    format!(
        "DCV_IMAGE_{}_{}",
        os.as_str().to_ascii_uppercase(),
        size.as_str().to_ascii_uppercase()
    )
}

fn parse_number<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ProvisionError> {
    match get(name) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            ProvisionError::Configuration(format!("{} must be a number, got '{}'", name, raw))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ProvisionError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.provider, "ec2");
        assert_eq!(s.region, "us-east-1");
        assert_eq!(s.key_pair_name, None);
        assert_eq!(s.key_pair_name(), "");
        assert_eq!(s.poll_policy, PollPolicy::default());
        assert!(s.image_overrides.is_empty());
    }

    #[test]
    fn blank_values_count_as_unset() {
        let s = settings(&[
            ("AWS_KEYPAIR_NAME", "   "),
            ("AWS_SECURITY_GROUP_ID", " sg-1 "),
        ])
        .unwrap();
        assert_eq!(s.key_pair_name, None);
        assert_eq!(s.security_group_id.as_deref(), Some("sg-1"));
    }

    #[test]
    fn poll_overrides() {
        let s = settings(&[
            ("DCV_POLL_INTERVAL_SECS", "2"),
            ("DCV_POLL_MAX_ATTEMPTS", "0"),
            ("DCV_POLL_MAX_TRANSIENT_ERRORS", "9"),
        ])
        .unwrap();
        assert_eq!(s.poll_policy.interval, Duration::from_secs(2));
        assert_eq!(s.poll_policy.max_attempts, None);
        assert_eq!(s.poll_policy.max_transient_errors, Some(9));
    }

    #[test]
    fn bad_numbers_are_configuration_errors() {
        assert!(matches!(
            settings(&[("DCV_POLL_MAX_ATTEMPTS", "lots")]),
            Err(ProvisionError::Configuration(_))
        ));
        assert!(matches!(
            settings(&[("DCV_POLL_INTERVAL_SECS", "0")]),
            Err(ProvisionError::Configuration(_))
        ));
    }

    #[test]
    fn image_overrides_reach_the_catalog() {
        let s = settings(&[("DCV_IMAGE_WINDOWS_LARGE", "ami-0123")]).unwrap();
        assert_eq!(
            s.image_overrides,
            vec![(OsFamily::Windows, SizeClass::Large, "ami-0123".to_string())]
        );
        let catalog = s.catalog().unwrap();
        let e = catalog.lookup(OsFamily::Windows, SizeClass::Large).unwrap();
        assert_eq!(e.image_id, "ami-0123");
        assert_eq!(e.instance_class, "t2.large");
    }

    #[test]
    fn debug_redacts_secrets() {
        let s = settings(&[
            ("AWS_SECRET_ACCESS_KEY", "topsecret"),
            ("AWS_SESSION_TOKEN", "tok"),
        ])
        .unwrap();
        let rendered = format!("{:?}", s);
        assert!(!rendered.contains("topsecret"));
        assert!(!rendered.contains("tok\""));
    }

    #[test]
    fn override_var_names() {
        assert_eq!(
            image_override_var(OsFamily::Linux, SizeClass::Small),
            "DCV_IMAGE_LINUX_SMALL"
        );
    }
}
