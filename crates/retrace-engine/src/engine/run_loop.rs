use super::actions::StepOutcome;
use super::{
    ReplayEngine, ReplayError, ReplayEvent, ReplayProgress, ReplayStatus, StepError,
    StepExecutionResult, StepStatus,
};
use retrace_core::{Workflow, WorkflowStep, validate_workflow};
use retrace_device::ControlSurface;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

impl<D: ControlSurface> ReplayEngine<D> {
    pub(crate) fn emit(&self, event: ReplayEvent) {
        self.shared.publish(event);
    }

    pub(crate) fn log(&self, msg: impl Into<String>) {
        let msg = msg.into();
        info!("{}", msg);
        self.emit(ReplayEvent::Log(msg));
    }

    pub(crate) fn emit_error(&self, msg: impl Into<String>) {
        let msg = msg.into();
        error!("{}", msg);
        self.emit(ReplayEvent::Error(msg));
    }

    /// Replay every step of `workflow` in order.
    ///
    /// Returns the final progress snapshot for completed, failed and
    /// cancelled runs alike; `Err` means the run never started.
    pub async fn execute_workflow(
        &mut self,
        workflow: &Workflow,
    ) -> Result<ReplayProgress, ReplayError> {
        let status = self.shared.status();
        if status.is_terminal() {
            return Err(ReplayError::RunFinished(status));
        }
        validate_workflow(workflow)?;

        let token = self.shared.cancel_token();
        let mut paused = self.shared.pause_flag();
        self.workflow_screen = workflow.screen_bounds();

        let started = self.shared.update(|p| p.begin(workflow));
        self.emit(ReplayEvent::StatusChanged(started));
        self.log(format!(
            "Replaying '{}' ({} steps)",
            workflow.name,
            workflow.len()
        ));

        let steps = workflow.steps();
        for (index, step) in steps.iter().enumerate() {
            if token.is_cancelled() || !self.wait_if_paused(&token, &mut paused).await {
                return Ok(self.finish(ReplayStatus::Cancelled, None));
            }

            let step_name = self.namer.label_for_step(step);
            let started = self.shared.update(|p| {
                p.current_step = Some(index);
                p.current_step_name = Some(step_name.clone());
            });
            self.emit(ReplayEvent::StepStarted(started));

            let result = if step.enabled {
                self.log(format!("Step {}/{}: {}", index + 1, steps.len(), step_name));
                let clock = Instant::now();
                let outcome = self.execute_step(step, &token).await;
                let duration_ms = clock.elapsed().as_millis() as u64;
                match outcome {
                    Err(StepError::Cancelled) => {
                        return Ok(self.finish(ReplayStatus::Cancelled, None));
                    }
                    outcome => step_result(step, index, &step_name, outcome, duration_ms),
                }
            } else {
                self.log(format!("Skipping disabled step: {}", step_name));
                StepExecutionResult {
                    message: Some("step disabled".to_string()),
                    ..step_result(step, index, &step_name, Ok(StepOutcome::default()), 0)
                }
                .with_status(StepStatus::Skipped)
            };

            let failure = result.status.is_failure().then(|| {
                format!(
                    "Step '{}' failed: {}",
                    step_name,
                    result.error.as_deref().unwrap_or("unknown error")
                )
            });
            let completed = self.shared.update(|p| p.results.push(result));
            self.emit(ReplayEvent::StepCompleted(completed));

            // A step that finished while the cancel landed still counts, but
            // nothing after it runs.
            if token.is_cancelled() {
                return Ok(self.finish(ReplayStatus::Cancelled, None));
            }

            if let Some(msg) = failure {
                self.emit_error(&msg);
                if self.config.stop_on_error {
                    return Ok(self.finish(ReplayStatus::Failed, Some(msg)));
                }
            }

            let more_to_run = index + 1 < steps.len();
            if more_to_run
                && step.enabled
                && !self.config.step_delay.is_zero()
                && self.sleep(self.config.step_delay, &token).await.is_err()
            {
                return Ok(self.finish(ReplayStatus::Cancelled, None));
            }
        }

        if token.is_cancelled() {
            return Ok(self.finish(ReplayStatus::Cancelled, None));
        }
        Ok(self.finish(ReplayStatus::Completed, None))
    }

    /// Block while paused. Returns `false` if the run was cancelled.
    async fn wait_if_paused(
        &self,
        token: &CancellationToken,
        paused: &mut watch::Receiver<bool>,
    ) -> bool {
        if !*paused.borrow_and_update() {
            return !token.is_cancelled();
        }
        self.log("Waiting for resume");
        tokio::select! {
            biased;
            _ = token.cancelled() => false,
            resumed = paused.wait_for(|p| !*p) => resumed.is_ok() && !token.is_cancelled(),
        }
    }

    fn finish(&self, status: ReplayStatus, error: Option<String>) -> ReplayProgress {
        let progress = self.shared.update(|p| p.finish(status, error));
        match status {
            ReplayStatus::Completed => self.log(format!(
                "Replay completed: {} succeeded, {} failed, {} skipped",
                progress.succeeded(),
                progress.failed(),
                progress.skipped()
            )),
            ReplayStatus::Cancelled => warn!("Replay cancelled"),
            _ => {}
        }
        self.emit(ReplayEvent::StatusChanged(progress.clone()));
        progress
    }
}

fn step_result(
    step: &WorkflowStep,
    index: usize,
    step_name: &str,
    outcome: Result<StepOutcome, StepError>,
    duration_ms: u64,
) -> StepExecutionResult {
    let base = StepExecutionResult {
        step_id: step.id,
        step_index: index,
        step_name: step_name.to_string(),
        action: step.kind(),
        status: StepStatus::Success,
        message: None,
        error: None,
        duration_ms,
        selector_used: None,
        selector_index: None,
        fallback_used: false,
    };
    match outcome {
        Ok(outcome) => {
            let (selector_used, selector_index) = match outcome.selector {
                Some((selector, index)) => (Some(selector.to_string()), Some(index)),
                None => (None, None),
            };
            StepExecutionResult {
                message: (!outcome.message.is_empty()).then_some(outcome.message),
                selector_used,
                selector_index,
                fallback_used: outcome.fallback_used,
                ..base
            }
        }
        Err(e) => {
            let status = match e {
                StepError::Timeout { .. } => StepStatus::Timeout,
                _ => StepStatus::Failed,
            };
            StepExecutionResult {
                status,
                error: Some(e.to_string()),
                ..base
            }
        }
    }
}

impl StepExecutionResult {
    fn with_status(mut self, status: StepStatus) -> Self {
        self.status = status;
        self
    }
}
