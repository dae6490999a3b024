use dcv_common::{InstanceHandle, InstanceState, OsFamily, ProvisionError, SizeClass};
use dcv_providers::{ComputeProvider, LaunchSpec};
use tokio_util::sync::CancellationToken;

use crate::boot_script;
use crate::catalog::Catalog;
use crate::logger;
use crate::poll::{self, PollOutcome, PollPolicy};
use crate::settings::{KEYPAIR_NAME_VAR, SECURITY_GROUP_ID_VAR};
use crate::state_machine::{ProvisionEvent, Tracked};

pub type EventSink = Box<dyn Fn(&ProvisionEvent) + Send + Sync>;

/// Drives one instance from launch request to a reachable DCV endpoint.
///
/// Flow:
/// - validate the key pair / security group (no provider call before this)
/// - catalog lookup + boot script
/// - exactly one launch request, never retried
/// - describe until running with a public address, the poll budget runs
///   out, the instance fails, or the token is cancelled
pub struct Provisioner<'a> {
    provider: &'a dyn ComputeProvider,
    catalog: Catalog,
    policy: PollPolicy,
    cancel: CancellationToken,
    on_event: Option<EventSink>,
}

impl<'a> Provisioner<'a> {
    pub fn new(provider: &'a dyn ComputeProvider, catalog: Catalog) -> Self {
        Self {
            provider,
            catalog,
            policy: PollPolicy::default(),
            cancel: CancellationToken::new(),
            on_event: None,
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn on_event(mut self, sink: impl Fn(&ProvisionEvent) + Send + Sync + 'static) -> Self {
        self.on_event = Some(Box::new(sink));
        self
    }

    pub async fn provision(
        &self,
        os: OsFamily,
        size: SizeClass,
        key_pair_name: &str,
        security_group_id: &str,
    ) -> Result<InstanceHandle, ProvisionError> {
        let (key_pair_name, security_group_id) =
            validate_launch_identity(key_pair_name, security_group_id)?;

        let entry = self.catalog.lookup(os, size)?.clone();
        let boot_script = boot_script::generate(os);

        if self.cancel.is_cancelled() {
            return Err(ProvisionError::Cancelled { instance_id: None });
        }

        let client_token = uuid::Uuid::new_v4().simple().to_string();
        let mut action = logger::log_event_with_metadata(
            "LAUNCH_INSTANCE",
            None,
            Some(serde_json::json!({
                "provider": self.provider.name(),
                "os": os.as_str(),
                "size": size.as_str(),
                "image_id": entry.image_id,
                "instance_class": entry.instance_class,
                "client_token": client_token,
            })),
        );

        let spec = LaunchSpec {
            image_id: entry.image_id,
            instance_class: entry.instance_class,
            key_pair_name,
            security_group_id,
            boot_script,
            client_token: client_token.clone(),
        };

        // In-flight launches are not cancellable: dropping the request could
        // leave an instance we never learn the id of.
        let instance_id = match self.provider.launch_instance(spec).await {
            Ok(id) if !id.trim().is_empty() => id.trim().to_string(),
            Ok(_) => {
                let message =
                    "provider accepted the launch but returned no instance id".to_string();
                action.failed(&message);
                return Err(ProvisionError::LaunchUnconfirmed {
                    message,
                    client_token,
                });
            }
            Err(e) if e.may_have_taken_effect() => {
                let message = e.to_string();
                tracing::warn!(
                    client_token = %client_token,
                    error = %message,
                    "launch outcome unknown, an instance may exist"
                );
                action.failed(&message);
                return Err(ProvisionError::LaunchUnconfirmed {
                    message,
                    client_token,
                });
            }
            Err(e) => {
                let message = e.to_string();
                action.failed(&message);
                return Err(ProvisionError::LaunchFailed { message });
            }
        };
        action.set_instance_id(&instance_id);
        action.success();

        self.emit(ProvisionEvent::Launched {
            instance_id: instance_id.clone(),
        });

        let mut tracked = Tracked::submitted(&instance_id);
        self.wait_until_ready(&mut tracked).await?;
        Ok(tracked.handle)
    }

    async fn wait_until_ready(&self, tracked: &mut Tracked) -> Result<(), ProvisionError> {
        let action = logger::log_event_with_metadata(
            "WAIT_FOR_RUNNING",
            Some(&tracked.handle.instance_id),
            Some(serde_json::json!({
                "interval_ms": self.policy.interval.as_millis() as u64,
                "max_attempts": self.policy.max_attempts,
            })),
        );
        let result = self.poll_until_ready(tracked).await;
        match &result {
            Ok(()) => action.success(),
            Err(e) => action.failed(&e.to_string()),
        }
        result
    }

    async fn poll_until_ready(&self, tracked: &mut Tracked) -> Result<(), ProvisionError> {
        let instance_id = tracked.handle.instance_id.clone();
        let mut attempts: u32 = 0;
        let mut error_streak: u32 = 0;

        loop {
            attempts += 1;
            let described = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(cancelled(tracked)),
                r = self.provider.describe_instance(&instance_id) => r,
            };

            let delay = match poll::classify(described) {
                PollOutcome::Ready { address } => {
                    tracing::info!(
                        instance_id = %instance_id,
                        attempt = attempts,
                        address = %address,
                        "instance running"
                    );
                    self.emit(ProvisionEvent::Polled {
                        attempt: attempts,
                        state: InstanceState::Running,
                    });
                    tracked.pending_to_running(address.clone());
                    self.emit(ProvisionEvent::Ready { address });
                    return Ok(());
                }
                PollOutcome::NotReady(state) => {
                    tracing::info!(
                        instance_id = %instance_id,
                        attempt = attempts,
                        state = %state,
                        "instance not ready"
                    );
                    error_streak = 0;
                    self.emit(ProvisionEvent::Polled {
                        attempt: attempts,
                        state: state.clone(),
                    });
                    tracked.observe_not_ready(state);
                    self.policy.interval
                }
                PollOutcome::Failed(state) => {
                    self.emit(ProvisionEvent::Polled {
                        attempt: attempts,
                        state: state.clone(),
                    });
                    let state_name = state.to_string();
                    tracked.to_failed(state);
                    return Err(ProvisionError::InstanceFailed {
                        instance_id,
                        state: state_name,
                    });
                }
                PollOutcome::TransientError(e) => {
                    error_streak += 1;
                    if self.policy.transient_budget_exceeded(error_streak) {
                        let message =
                            format!("{} consecutive transient errors, last: {}", error_streak, e);
                        tracked.to_poll_failed(&message);
                        return Err(ProvisionError::ProviderTransport {
                            instance_id,
                            message,
                        });
                    }
                    let delay = self.policy.transient_delay(error_streak);
                    tracing::warn!(
                        instance_id = %instance_id,
                        attempt = attempts,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "transient describe error, backing off"
                    );
                    self.emit(ProvisionEvent::RetryingAfterError {
                        attempt: attempts,
                        message: e.to_string(),
                        delay,
                    });
                    delay
                }
                PollOutcome::FatalError(e) => {
                    let message = e.to_string();
                    tracked.to_poll_failed(&message);
                    return Err(ProvisionError::ProviderTransport {
                        instance_id,
                        message,
                    });
                }
            };

            if self.policy.attempts_exhausted(attempts) {
                tracked.to_timed_out(attempts);
                return Err(ProvisionError::ProvisionIncomplete {
                    instance_id,
                    attempts,
                });
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(cancelled(tracked)),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn emit(&self, event: ProvisionEvent) {
        if let Some(sink) = &self.on_event {
            sink(&event);
        }
    }
}

fn cancelled(tracked: &mut Tracked) -> ProvisionError {
    tracked.to_cancelled();
    ProvisionError::Cancelled {
        instance_id: Some(tracked.handle.instance_id.clone()),
    }
}

/// Both identifiers must be non-blank; returns them trimmed.
pub fn validate_launch_identity(
    key_pair_name: &str,
    security_group_id: &str,
) -> Result<(String, String), ProvisionError> {
    let key_pair_name = key_pair_name.trim();
    if key_pair_name.is_empty() {
        return Err(ProvisionError::MissingConfiguration {
            name: KEYPAIR_NAME_VAR,
        });
    }
    let security_group_id = security_group_id.trim();
    if security_group_id.is_empty() {
        return Err(ProvisionError::MissingConfiguration {
            name: SECURITY_GROUP_ID_VAR,
        });
    }
    Ok((key_pair_name.to_string(), security_group_id.to_string()))
}
