//! Step and stage outcomes.

use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;

use crate::definition::StepDefinition;
use crate::error::EngineError;

/// Outcome of one step.
#[derive(Debug)]
pub struct StepResult {
    pub name: String,
    pub step_type: String,
    /// Terminal error; `None` on success.
    pub error: Option<EngineError>,
}

impl StepResult {
    pub fn new(step: &StepDefinition, error: Option<EngineError>) -> Self {
        Self {
            name: step.name.clone(),
            step_type: step.step_type.clone(),
            error,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of one stage.
///
/// `steps` is index-aligned with the stage's step list, not with completion order.
#[derive(Debug)]
pub struct StageResult {
    pub name: String,
    /// True only if every step succeeded.
    pub success: bool,
    pub steps: Vec<StepResult>,
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl StageResult {
    /// Results of the steps that failed, in step order.
    pub fn failed_steps(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|step| !step.succeeded())
    }

    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|step| step.name == name)
    }
}
