//! Concurrent execution of the steps of a stage.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use tracing::Span;
use tracing::info;
use tracing::info_span;
use tracing::warn;

use crate::config::FailurePolicy;
use crate::definition::StageDefinition;
use crate::error::EngineError;
use crate::orchestrator::PodOrchestrator;
use crate::orchestrator::StepLogLine;
use crate::result::StageResult;
use crate::result::StepResult;
use crate::verified::duration_ms;
use crate::verified::is_stage_successful;

/// Runs every step of a stage concurrently, one pod per step.
pub struct StepScheduler {
    orchestrator: Arc<PodOrchestrator>,
    span: Span,
}

impl StepScheduler {
    /// Create a scheduler. Stage spans are children of `span`.
    pub fn new(orchestrator: Arc<PodOrchestrator>, span: Span) -> Self {
        Self { orchestrator, span }
    }

    /// Run every step of `stage` and collect the results.
    ///
    /// Never fails: step failures are reported in the returned
    /// [`StageResult`], whose steps are in the stage's step order.
    pub async fn run_stage(
        &self,
        stage: &StageDefinition,
        build_id: u64,
        logs: mpsc::Sender<StepLogLine>,
    ) -> StageResult {
        self.run_stage_with_cancel(stage, build_id, logs, CancellationToken::new()).await
    }

    /// Like [`run_stage`](Self::run_stage), stopping every step once `cancel` fires.
    ///
    /// Cancelled steps delete their pods and report [`EngineError::Cancelled`].
    pub async fn run_stage_with_cancel(
        &self,
        stage: &StageDefinition,
        build_id: u64,
        logs: mpsc::Sender<StepLogLine>,
        cancel: CancellationToken,
    ) -> StageResult {
        let started_at = Utc::now();
        let start = Instant::now();
        let policy = self.orchestrator.config().failure_policy;
        let span = info_span!(parent: &self.span, "stage", stage = %stage.name, build_id);
        info!(parent: &span, steps = stage.steps.len(), ?policy, "stage started");

        // fired by the caller, or by a failing step under CancelSiblings
        let siblings = cancel.child_token();
        let stage_def = Arc::new(stage.clone());

        let handles: Vec<_> = (0..stage.steps.len())
            .map(|index| {
                let orchestrator = Arc::clone(&self.orchestrator);
                let stage_def = Arc::clone(&stage_def);
                let logs = logs.clone();
                let siblings = siblings.clone();
                let step_span = info_span!(parent: &span, "step", step = %stage.steps[index].name);
                let task_span = step_span.clone();

                tokio::spawn(
                    async move {
                        let step = &stage_def.steps[index];
                        let outcome = orchestrator.run(step, &stage_def, build_id, logs, &siblings).await;
                        if let Err(e) = &outcome {
                            if !e.is_cancelled() {
                                warn!(parent: &task_span, error = %e, "step failed");
                                if policy == FailurePolicy::CancelSiblings {
                                    siblings.cancel();
                                }
                            }
                        }
                        StepResult::new(step, outcome.err())
                    }
                    .instrument(step_span),
                )
            })
            .collect();
        drop(logs);

        let steps: Vec<StepResult> = join_all(handles)
            .await
            .into_iter()
            .zip(&stage.steps)
            .map(|(joined, step)| match joined {
                Ok(result) => result,
                Err(e) => {
                    warn!(parent: &span, step = %step.name, error = %e, "step task panicked");
                    StepResult::new(step, Some(EngineError::StepPanicked {
                        step: step.name.clone(),
                        reason: e.to_string(),
                    }))
                }
            })
            .collect();

        let success = is_stage_successful(steps.iter().map(StepResult::succeeded));
        let duration = start.elapsed();
        info!(
            parent: &span,
            success,
            failed = steps.iter().filter(|s| !s.succeeded()).count(),
            duration_ms = duration_ms(duration),
            "stage finished"
        );

        StageResult {
            name: stage.name.clone(),
            success,
            steps,
            duration,
            started_at,
            completed_at: Utc::now(),
        }
    }
}
