//! Engine configuration.

use std::time::Duration;

use podline_constants::LOG_CHANNEL_CAPACITY;
use podline_constants::MAX_WAITER_POLLS;
use podline_constants::WAITER_POLL_INTERVAL_MS;
use podline_logscan::SanitizeOptions;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::EngineError;
use crate::error::Result;
use crate::orchestrator::StepLogLine;

/// What the scheduler does with in-flight siblings once a step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Every step runs to completion; the stage result reports the failure.
    #[default]
    RunToCompletion,
    /// Cancel the remaining steps of the stage. Cancelled steps still delete their pods.
    CancelSiblings,
}

/// Configuration for the pod orchestrator and the stage scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Delay between pod status fetches.
    pub poll_interval_ms: u64,
    /// Fetch ceiling of a single waiter call.
    pub max_polls: u32,
    /// Transforms applied to every log line.
    pub sanitize: SanitizeOptions,
    /// Capacity of the bounded log line channel.
    pub log_channel_capacity: usize,
    pub failure_policy: FailurePolicy,
    /// Fail a step whose containers exit non-zero.
    pub check_exit_codes: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: WAITER_POLL_INTERVAL_MS,
            max_polls: MAX_WAITER_POLLS,
            sanitize: SanitizeOptions::default(),
            log_channel_capacity: LOG_CHANNEL_CAPACITY,
            failure_policy: FailurePolicy::default(),
            check_exit_codes: true,
        }
    }
}

impl EngineConfig {
    /// Reject values that would stall or spin the engine.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(EngineError::InvalidConfig {
                reason: "poll_interval_ms must be greater than 0".to_string(),
            });
        }
        if self.max_polls == 0 {
            return Err(EngineError::InvalidConfig {
                reason: "max_polls must be greater than 0".to_string(),
            });
        }
        if self.log_channel_capacity == 0 {
            return Err(EngineError::InvalidConfig {
                reason: "log_channel_capacity must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Bounded channel for the log lines of a stage run.
    pub fn log_channel(&self) -> (mpsc::Sender<StepLogLine>, mpsc::Receiver<StepLogLine>) {
        mpsc::channel(self.log_channel_capacity.max(1))
    }
}
