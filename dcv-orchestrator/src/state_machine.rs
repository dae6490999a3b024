use dcv_common::{InstanceHandle, InstanceState};
use std::fmt;
use std::time::Duration;

/// Where a run's single instance is in the provisioning flow.
///
/// `Submitted -> Pending -> Running` on the happy path, `Pending` looping on
/// itself until the provider reports running. `Failed`, `TimedOut` and
/// `Cancelled` end a run after launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionPhase {
    Submitted,
    Pending,
    Running,
    Failed,
    TimedOut,
    Cancelled,
}

impl ProvisionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionPhase::Submitted => "submitted",
            ProvisionPhase::Pending => "pending",
            ProvisionPhase::Running => "running",
            ProvisionPhase::Failed => "failed",
            ProvisionPhase::TimedOut => "timed_out",
            ProvisionPhase::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProvisionPhase::Running
                | ProvisionPhase::Failed
                | ProvisionPhase::TimedOut
                | ProvisionPhase::Cancelled
        )
    }
}

impl fmt::Display for ProvisionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress notifications for whoever drives the run (the CLI prints them).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionEvent {
    Launched {
        instance_id: String,
    },
    Polled {
        attempt: u32,
        state: InstanceState,
    },
    RetryingAfterError {
        attempt: u32,
        message: String,
        delay: Duration,
    },
    Ready {
        address: String,
    },
}

/// The handle plus its phase. Owned by the one orchestration task; every
/// mutation goes through a transition below so it gets logged.
#[derive(Debug)]
pub struct Tracked {
    pub handle: InstanceHandle,
    phase: ProvisionPhase,
}

impl Tracked {
    pub fn submitted(instance_id: &str) -> Self {
        let t = Self {
            handle: InstanceHandle::submitted(instance_id),
            phase: ProvisionPhase::Submitted,
        };
        log_state_transition(instance_id, None, ProvisionPhase::Submitted, "launch accepted");
        t
    }

    /// Record a not-yet-ready poll (SUBMITTED/PENDING -> PENDING).
    pub fn observe_not_ready(&mut self, state: InstanceState) {
        self.handle.state = state;
        if self.phase != ProvisionPhase::Pending {
            let reason = format!("provider reports '{}'", self.handle.state);
            self.transition(ProvisionPhase::Pending, &reason);
        }
    }

    /// PENDING -> RUNNING with the public address.
    pub fn pending_to_running(&mut self, address: String) {
        self.handle.state = InstanceState::Running;
        self.handle.public_address = Some(address);
        self.transition(ProvisionPhase::Running, "running with public address");
    }

    /// Instance stopped or terminated before running.
    pub fn to_failed(&mut self, state: InstanceState) {
        let reason = format!("provider reports '{}'", state);
        self.handle.state = state;
        self.transition(ProvisionPhase::Failed, &reason);
    }

    pub fn to_timed_out(&mut self, attempts: u32) {
        self.transition(
            ProvisionPhase::TimedOut,
            &format!("not ready after {} status checks", attempts),
        );
    }

    pub fn to_cancelled(&mut self) {
        self.transition(ProvisionPhase::Cancelled, "cancelled by caller");
    }

    /// Poll errors end the run too; recorded as a failure of the wait.
    pub fn to_poll_failed(&mut self, message: &str) {
        self.transition(ProvisionPhase::Failed, message);
    }

    fn transition(&mut self, to: ProvisionPhase, reason: &str) {
        if self.phase.is_terminal() {
            tracing::warn!(
                instance_id = %self.handle.instance_id,
                from = %self.phase,
                to = %to,
                "[state_machine] ignoring transition out of terminal phase"
            );
            return;
        }
        let from = self.phase;
        self.phase = to;
        log_state_transition(&self.handle.instance_id, Some(from), to, reason);
    }
}

fn log_state_transition(
    instance_id: &str,
    from: Option<ProvisionPhase>,
    to: ProvisionPhase,
    reason: &str,
) {
    let from = from.map(|p| p.as_str()).unwrap_or("none");
    match to {
        ProvisionPhase::Failed | ProvisionPhase::TimedOut => {
            tracing::warn!(instance_id, from, to = %to, reason, "[state_machine] transition")
        }
        _ => tracing::info!(instance_id, from, to = %to, reason, "[state_machine] transition"),
    }
}
