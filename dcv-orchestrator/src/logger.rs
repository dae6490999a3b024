use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Logs go to stderr so stdout carries only
/// operator output. Filter from `RUST_LOG`, default `info`.
pub fn init() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {}", e))
}

/// An in-flight action (LAUNCH_INSTANCE, WAIT_FOR_RUNNING, ...). Logged when
/// started and again, with its duration, when completed.
#[derive(Debug)]
pub struct ActionLog {
    action_type: &'static str,
    instance_id: Option<String>,
    started: Instant,
}

/// Log the start of an action with context info.
pub fn log_event_with_metadata(
    action_type: &'static str,
    instance_id: Option<&str>,
    metadata: Option<serde_json::Value>,
) -> ActionLog {
    let metadata = metadata.map(|m| m.to_string()).unwrap_or_default();
    tracing::info!(
        action_type,
        status = "in_progress",
        instance_id = instance_id.unwrap_or(""),
        metadata = %metadata,
        "action started"
    );
    ActionLog {
        action_type,
        instance_id: instance_id.map(|s| s.to_string()),
        started: Instant::now(),
    }
}

impl ActionLog {
    /// Attach the instance id once it is known (e.g. after launch).
    pub fn set_instance_id(&mut self, instance_id: &str) {
        self.instance_id = Some(instance_id.to_string());
    }

    pub fn complete(self, status: &'static str, error_message: Option<&str>) {
        let duration_ms = self.started.elapsed().as_millis() as u64;
        let instance_id = self.instance_id.as_deref().unwrap_or("");
        match error_message {
            Some(error_message) => tracing::warn!(
                action_type = self.action_type,
                status,
                instance_id,
                duration_ms,
                error_message,
                "action completed"
            ),
            None => tracing::info!(
                action_type = self.action_type,
                status,
                instance_id,
                duration_ms,
                "action completed"
            ),
        }
    }

    pub fn success(self) {
        self.complete("success", None)
    }

    pub fn failed(self, error_message: &str) {
        self.complete("failed", Some(error_message))
    }
}
