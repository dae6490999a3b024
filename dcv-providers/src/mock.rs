use crate::{ComputeProvider, InstanceDescription, LaunchSpec, ProviderError};
use async_trait::async_trait;
use dcv_common::InstanceState;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Address handed out by the simulated provider (TEST-NET-3).
pub const SIMULATED_ADDRESS: &str = "203.0.113.10";

/// In-memory provider for local runs and tests.
///
/// Describe results are served from a script in order; once the script is
/// down to its last entry, that entry repeats forever. Every call is counted.
pub struct MockProvider {
    launch_result: Result<String, ProviderError>,
    describes: Mutex<VecDeque<Result<InstanceDescription, ProviderError>>>,
    launched: Mutex<Vec<LaunchSpec>>,
    launch_calls: AtomicUsize,
    describe_calls: AtomicUsize,
}

impl MockProvider {
    pub fn scripted(
        launch_result: Result<String, ProviderError>,
        describes: Vec<Result<InstanceDescription, ProviderError>>,
    ) -> Self {
        Self {
            launch_result,
            describes: Mutex::new(describes.into()),
            launched: Mutex::new(Vec::new()),
            launch_calls: AtomicUsize::new(0),
            describe_calls: AtomicUsize::new(0),
        }
    }

    /// Behaves like a healthy cloud: `pending_polls` pending answers, then
    /// running with [`SIMULATED_ADDRESS`].
    pub fn simulated(pending_polls: usize) -> Self {
        let id12 = uuid::Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(12)
            .collect::<String>();
        let mut describes: Vec<_> = (0..pending_polls).map(|_| pending()).collect();
        describes.push(running(SIMULATED_ADDRESS));
        Self::scripted(Ok(format!("i-mock{}", id12)), describes)
    }

    pub fn launch_calls(&self) -> usize {
        self.launch_calls.load(Ordering::SeqCst)
    }

    pub fn describe_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }

    /// Specs received by `launch_instance`, in call order.
    pub fn launched_specs(&self) -> Vec<LaunchSpec> {
        self.launched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ComputeProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn launch_instance(&self, spec: LaunchSpec) -> Result<String, ProviderError> {
        self.launch_calls.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            image_id = %spec.image_id,
            instance_class = %spec.instance_class,
            "[Mock Provider] launch_instance"
        );
        self.launched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(spec);
        self.launch_result.clone()
    }

    async fn describe_instance(
        &self,
        instance_id: &str,
    ) -> Result<InstanceDescription, ProviderError> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.describes.lock().unwrap_or_else(PoisonError::into_inner);
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        tracing::debug!(instance_id, ?next, "[Mock Provider] describe_instance");
        next.unwrap_or_else(|| Err(ProviderError::NotFound(instance_id.to_string())))
    }
}

pub fn pending() -> Result<InstanceDescription, ProviderError> {
    Ok(InstanceDescription {
        state: InstanceState::Pending,
        public_address: None,
    })
}

pub fn running(address: &str) -> Result<InstanceDescription, ProviderError> {
    Ok(InstanceDescription {
        state: InstanceState::Running,
        public_address: Some(address.to_string()),
    })
}

/// Any provider state name, without an address.
pub fn state(raw: &str) -> Result<InstanceDescription, ProviderError> {
    Ok(InstanceDescription {
        state: InstanceState::parse(raw),
        public_address: None,
    })
}
