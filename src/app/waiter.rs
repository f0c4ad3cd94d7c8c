//! Polling until a function settles after a create or update call.
//!
//! Lambda applies configuration asynchronously: a new function starts in
//! `Pending`, an updated one reports `LastUpdateStatus = InProgress`. The
//! next mutating call is rejected until both have settled, so every
//! mutation is followed by [`wait_until_stable`].

use super::lambda_service::FunctionPlatform;
use anyhow::{bail, Result};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 150;

/// Lifecycle fields of a function configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionState {
    pub state: Option<String>,
    pub state_reason: Option<String>,
    pub last_update_status: Option<String>,
    pub last_update_status_reason: Option<String>,
}

/// Outcome of a single state probe.
#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    Stable,
    Settling,
    Failed(String),
}

impl FunctionState {
    pub fn readiness(&self) -> Readiness {
        if self.state.as_deref() == Some("Failed") {
            return Readiness::Failed(format!(
                "function state is Failed: {}",
                self.state_reason.as_deref().unwrap_or("no reason given")
            ));
        }
        if self.last_update_status.as_deref() == Some("Failed") {
            return Readiness::Failed(format!(
                "last update failed: {}",
                self.last_update_status_reason
                    .as_deref()
                    .unwrap_or("no reason given")
            ));
        }
        if self.state.as_deref() == Some("Pending")
            || self.last_update_status.as_deref() == Some("InProgress")
        {
            return Readiness::Settling;
        }
        Readiness::Stable
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Poll the function until it is stable, failed, or the attempt budget is
/// spent. Returns the final state on success.
pub async fn wait_until_stable(
    platform: &dyn FunctionPlatform,
    function_name: &str,
    policy: WaitPolicy,
) -> Result<FunctionState> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    while attempts < max_attempts {
        if attempts > 0 {
            tokio::time::sleep(policy.interval).await;
        }
        attempts += 1;

        let state = platform.get_function_state(function_name).await?;
        match state.readiness() {
            Readiness::Stable => {
                info!(
                    "Function {} is stable (state: {}, last update: {})",
                    function_name,
                    state.state.as_deref().unwrap_or("-"),
                    state.last_update_status.as_deref().unwrap_or("-")
                );
                return Ok(state);
            }
            Readiness::Settling => {
                debug!(
                    "Waiting for {} (attempt {}/{}): state={:?} last_update={:?}",
                    function_name,
                    attempts,
                    max_attempts,
                    state.state,
                    state.last_update_status
                );
            }
            Readiness::Failed(reason) => {
                bail!("Function {} did not become ready: {}", function_name, reason);
            }
        }
    }

    bail!(
        "Timed out waiting for function {} after {} attempts",
        function_name,
        max_attempts
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(state: &str, update: &str) -> FunctionState {
        FunctionState {
            state: Some(state.to_string()),
            state_reason: Some("reason text".to_string()),
            last_update_status: Some(update.to_string()),
            last_update_status_reason: Some("update reason".to_string()),
        }
    }

    #[test]
    fn test_readiness() {
        assert_eq!(state("Active", "Successful").readiness(), Readiness::Stable);
        assert_eq!(state("Inactive", "Successful").readiness(), Readiness::Stable);
        assert_eq!(state("Pending", "Successful").readiness(), Readiness::Settling);
        assert_eq!(state("Active", "InProgress").readiness(), Readiness::Settling);
        assert_eq!(FunctionState::default().readiness(), Readiness::Stable);

        match state("Failed", "Successful").readiness() {
            Readiness::Failed(reason) => assert!(reason.contains("reason text")),
            other => panic!("unexpected readiness {:?}", other),
        }
        match state("Active", "Failed").readiness() {
            Readiness::Failed(reason) => assert!(reason.contains("update reason")),
            other => panic!("unexpected readiness {:?}", other),
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = WaitPolicy::default();
        assert_eq!(policy.interval, Duration::from_secs(2));
        assert_eq!(policy.max_attempts, 150);
    }
}
