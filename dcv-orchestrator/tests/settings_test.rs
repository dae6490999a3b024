use dcv_common::{OsFamily, ProvisionError, SizeClass};
use dcv_orchestrator::settings::Settings;
use serial_test::serial;
use std::env;
use std::time::Duration;

const VARS: &[&str] = &[
    "PROVIDER",
    "AWS_KEYPAIR_NAME",
    "AWS_SECURITY_GROUP_ID",
    "AWS_REGION",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SECRET_ACCESS_KEY_FILE",
    "AWS_SESSION_TOKEN",
    "AWS_EC2_ENDPOINT",
    "DCV_POLL_INTERVAL_SECS",
    "DCV_POLL_MAX_ATTEMPTS",
    "DCV_POLL_MAX_TRANSIENT_ERRORS",
    "DCV_IMAGE_LINUX_SMALL",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn reads_process_environment() {
    clear_env();
    env::set_var("PROVIDER", "Mock");
    env::set_var("AWS_KEYPAIR_NAME", " ops-keypair ");
    env::set_var("AWS_SECURITY_GROUP_ID", "sg-1");
    env::set_var("AWS_REGION", "eu-west-3");
    env::set_var("DCV_POLL_INTERVAL_SECS", "3");
    env::set_var("DCV_IMAGE_LINUX_SMALL", "ami-custom");

    let settings = Settings::from_env().unwrap();
    clear_env();

    assert_eq!(settings.provider, "mock");
    assert_eq!(settings.key_pair_name(), "ops-keypair");
    assert_eq!(settings.security_group_id(), "sg-1");
    assert_eq!(settings.region, "eu-west-3");
    assert_eq!(settings.poll_policy.interval, Duration::from_secs(3));
    let catalog = settings.catalog().unwrap();
    assert_eq!(
        catalog
            .lookup(OsFamily::Linux, SizeClass::Small)
            .unwrap()
            .image_id,
        "ami-custom"
    );
}

#[test]
#[serial]
fn secret_file_wins_over_variable() {
    clear_env();
    let path = env::temp_dir().join(format!("dcv-secret-{}", std::process::id()));
    std::fs::write(&path, "from-file\n").unwrap();
    env::set_var("AWS_SECRET_ACCESS_KEY_FILE", &path);
    env::set_var("AWS_SECRET_ACCESS_KEY", "from-env");

    let settings = Settings::from_env().unwrap();
    clear_env();
    let _ = std::fs::remove_file(&path);

    assert_eq!(settings.secret_access_key.as_deref(), Some("from-file"));
}

#[test]
#[serial]
fn unreadable_secret_file_falls_back_to_variable() {
    clear_env();
    env::set_var("AWS_SECRET_ACCESS_KEY_FILE", "/nonexistent/dcv-secret");
    env::set_var("AWS_SECRET_ACCESS_KEY", "from-env");

    let settings = Settings::from_env().unwrap();
    clear_env();

    assert_eq!(settings.secret_access_key.as_deref(), Some("from-env"));
}

#[test]
#[serial]
fn malformed_number_is_rejected() {
    clear_env();
    env::set_var("DCV_POLL_MAX_TRANSIENT_ERRORS", "-1");

    let result = Settings::from_env();
    clear_env();

    assert!(matches!(result, Err(ProvisionError::Configuration(_))));
}
