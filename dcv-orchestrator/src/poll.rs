use dcv_common::InstanceState;
use dcv_providers::{InstanceDescription, ProviderError};
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 120;
pub const DEFAULT_BACKOFF_FACTOR: u32 = 2;
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_TRANSIENT_ERRORS: u32 = 5;

/// How long and how hard the wait-until-ready loop tries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between describe calls while the instance is not ready.
    pub interval: Duration,
    /// Describe budget; `None` polls until ready, failed or cancelled.
    pub max_attempts: Option<u32>,
    /// Multiplier applied per consecutive transient error.
    pub backoff_factor: u32,
    pub max_backoff: Duration,
    /// Consecutive transient errors tolerated; `None` tolerates any number.
    pub max_transient_errors: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_backoff: DEFAULT_MAX_BACKOFF,
            max_transient_errors: Some(DEFAULT_MAX_TRANSIENT_ERRORS),
        }
    }
}

impl PollPolicy {
    /// Poll every `interval` until the instance runs: no attempt cap and no
    /// error cap. Only cancellation or a failed instance stops it.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            max_transient_errors: None,
            ..Self::default()
        }
    }

    /// Delay after the `streak`-th consecutive transient error (1-based):
    /// `interval * factor^streak`, capped at `max_backoff`. Never shorter than
    /// `interval`.
    pub fn transient_delay(&self, streak: u32) -> Duration {
        let multiplier = self.backoff_factor.max(1).saturating_pow(streak);
        self.interval
            .checked_mul(multiplier)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
            .max(self.interval)
    }

    pub fn attempts_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }

    pub fn transient_budget_exceeded(&self, streak: u32) -> bool {
        self.max_transient_errors.is_some_and(|max| streak > max)
    }
}

/// What one describe call means for the wait loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Ready { address: String },
    NotReady(InstanceState),
    Failed(InstanceState),
    TransientError(ProviderError),
    FatalError(ProviderError),
}

pub fn classify(result: Result<InstanceDescription, ProviderError>) -> PollOutcome {
    match result {
        Ok(desc) if desc.state.is_running() => match desc.public_address {
            Some(address) if !address.trim().is_empty() => PollOutcome::Ready { address },
            // Running but the address is not assigned yet.
            _ => PollOutcome::NotReady(desc.state),
        },
        Ok(desc) if desc.state.is_failed() => PollOutcome::Failed(desc.state),
        Ok(desc) => PollOutcome::NotReady(desc.state),
        Err(e) if e.is_transient() => PollOutcome::TransientError(e),
        Err(e) => PollOutcome::FatalError(e),
    }
}
