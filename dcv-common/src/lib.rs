use serde::{Deserialize, Serialize};
use std::fmt;

mod error;

pub use error::ProvisionError;

/// Port the DCV server listens on for browser and native clients.
pub const DCV_PORT: u16 = 8443;

// --- Enums ---

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Linux,
    Windows,
}

impl OsFamily {
    pub const ALL: [OsFamily; 2] = [OsFamily::Linux, OsFamily::Windows];

    /// Parse the operator's menu choice (`1` = Linux, `2` = Windows).
    pub fn from_choice(raw: &str) -> Result<Self, ProvisionError> {
        match raw.trim() {
            "1" => Ok(OsFamily::Linux),
            "2" => Ok(OsFamily::Windows),
            other => Err(ProvisionError::InvalidSelection {
                field: "operating system",
                input: other.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Linux => "linux",
            OsFamily::Windows => "windows",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    Small,
    Large,
}

impl SizeClass {
    pub const ALL: [SizeClass; 2] = [SizeClass::Small, SizeClass::Large];

    /// Parse the operator's menu choice (`1` = Small, `2` = Large).
    pub fn from_choice(raw: &str) -> Result<Self, ProvisionError> {
        match raw.trim() {
            "1" => Ok(SizeClass::Small),
            "2" => Ok(SizeClass::Large),
            other => Err(ProvisionError::InvalidSelection {
                field: "instance size",
                input: other.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeClass::Small => "small",
            SizeClass::Large => "large",
        }
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instance lifecycle state as reported by the compute provider.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    Stopping,
    Stopped,
    ShuttingDown,
    Terminated,
    Other(String),
}

impl InstanceState {
    /// Map a provider state name (case-insensitive) to a state.
    /// Unknown names are kept verbatim in `Other`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => InstanceState::Pending,
            "running" => InstanceState::Running,
            "stopping" => InstanceState::Stopping,
            "stopped" => InstanceState::Stopped,
            "shutting-down" => InstanceState::ShuttingDown,
            "terminated" => InstanceState::Terminated,
            _ => InstanceState::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Terminated => "terminated",
            InstanceState::Other(raw) => raw,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, InstanceState::Running)
    }

    /// States an instance cannot come back from to reach `running` on its own.
    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            InstanceState::Stopping
                | InstanceState::Stopped
                | InstanceState::ShuttingDown
                | InstanceState::Terminated
        )
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Entities ---

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub image_id: String,
    pub instance_class: String,
}

/// The one instance a run manages. Only poll responses mutate it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct InstanceHandle {
    pub instance_id: String,
    pub state: InstanceState,
    pub public_address: Option<String>,
}

impl InstanceHandle {
    pub fn submitted(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            state: InstanceState::Pending,
            public_address: None,
        }
    }

    /// `https://<public-address>:8443/`, once an address is known.
    pub fn connection_url(&self) -> Option<String> {
        self.public_address
            .as_deref()
            .map(|addr| format!("https://{}:{}/", addr, DCV_PORT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_choices() {
        assert_eq!(OsFamily::from_choice("1").ok(), Some(OsFamily::Linux));
        assert_eq!(OsFamily::from_choice(" 2\n").ok(), Some(OsFamily::Windows));
        assert_eq!(SizeClass::from_choice("1").ok(), Some(SizeClass::Small));
        assert_eq!(SizeClass::from_choice("2").ok(), Some(SizeClass::Large));

        for bad in ["3", "", "linux", "0", "12"] {
            assert!(matches!(
                OsFamily::from_choice(bad),
                Err(ProvisionError::InvalidSelection { .. })
            ));
            assert!(matches!(
                SizeClass::from_choice(bad),
                Err(ProvisionError::InvalidSelection { .. })
            ));
        }
    }

    #[test]
    fn state_parse_roundtrip() {
        for (s, st) in [
            ("pending", InstanceState::Pending),
            ("running", InstanceState::Running),
            ("stopping", InstanceState::Stopping),
            ("stopped", InstanceState::Stopped),
            ("shutting-down", InstanceState::ShuttingDown),
            ("terminated", InstanceState::Terminated),
        ] {
            assert_eq!(InstanceState::parse(s), st);
            assert_eq!(InstanceState::parse(&s.to_uppercase()), st);
            assert_eq!(st.as_str(), s);
        }
        assert_eq!(
            InstanceState::parse("rebooting"),
            InstanceState::Other("rebooting".to_string())
        );
    }

    #[test]
    fn failed_states() {
        assert!(InstanceState::Terminated.is_failed());
        assert!(InstanceState::ShuttingDown.is_failed());
        assert!(!InstanceState::Pending.is_failed());
        assert!(!InstanceState::Running.is_failed());
        assert!(!InstanceState::Other("rebooting".into()).is_failed());
    }

    #[test]
    fn connection_url_requires_address() {
        let mut handle = InstanceHandle::submitted("i-0abc");
        assert_eq!(handle.connection_url(), None);
        handle.public_address = Some("203.0.113.5".to_string());
        assert_eq!(
            handle.connection_url().as_deref(),
            Some("https://203.0.113.5:8443/")
        );
    }

    #[test]
    fn handle_serializes_state_names() {
        let handle = InstanceHandle {
            instance_id: "i-0abc".into(),
            state: InstanceState::ShuttingDown,
            public_address: None,
        };
        let json = serde_json::to_value(&handle).unwrap();
        assert_eq!(json["state"], "shutting-down");
        assert_eq!(json["instance_id"], "i-0abc");
    }
}
