pub mod boot_script;
pub mod catalog;
pub mod logger;
pub mod poll;
pub mod provider_manager;
pub mod provisioning;
pub mod selection;
pub mod settings;
pub mod state_machine;

pub use provisioning::{validate_launch_identity, Provisioner};
