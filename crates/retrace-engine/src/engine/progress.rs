use super::ReplayStatus;
use chrono::{DateTime, Utc};
use retrace_core::{ActionKind, Workflow};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
    Skipped,
    Timeout,
}

impl StepStatus {
    pub fn is_failure(self) -> bool {
        matches!(self, StepStatus::Failed | StepStatus::Timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecutionResult {
    pub step_id: Uuid,
    pub step_index: usize,
    pub step_name: String,
    pub action: ActionKind,
    pub status: StepStatus,
    pub message: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
    /// Selector that located the element, rendered for display.
    pub selector_used: Option<String>,
    pub selector_index: Option<usize>,
    pub fallback_used: bool,
}

/// Snapshot of a run. Every event carries its own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayProgress {
    pub run_id: Uuid,
    pub workflow_id: Option<Uuid>,
    pub workflow_name: String,
    pub status: ReplayStatus,
    pub total_steps: usize,
    pub current_step: Option<usize>,
    pub current_step_name: Option<String>,
    pub results: Vec<StepExecutionResult>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ReplayProgress {
    pub(crate) fn idle() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            workflow_id: None,
            workflow_name: String::new(),
            status: ReplayStatus::Idle,
            total_steps: 0,
            current_step: None,
            current_step_name: None,
            results: vec![],
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub(crate) fn begin(&mut self, workflow: &Workflow) {
        self.workflow_id = Some(workflow.id);
        self.workflow_name = workflow.name.clone();
        self.status = ReplayStatus::Running;
        self.total_steps = workflow.len();
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn finish(&mut self, status: ReplayStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        self.current_step = None;
        self.current_step_name = None;
        self.finished_at = Some(Utc::now());
    }

    pub fn succeeded(&self) -> usize {
        self.count(StepStatus::Success)
    }

    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status.is_failure())
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.count(StepStatus::Skipped)
    }

    fn count(&self, status: StepStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn last_result(&self) -> Option<&StepExecutionResult> {
        self.results.last()
    }
}

/// Events published to run observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReplayEvent {
    StatusChanged(ReplayProgress),
    StepStarted(ReplayProgress),
    /// The finished step is the last entry of `results`.
    StepCompleted(ReplayProgress),
    Log(String),
    Error(String),
}

impl ReplayEvent {
    pub fn progress(&self) -> Option<&ReplayProgress> {
        match self {
            ReplayEvent::StatusChanged(p)
            | ReplayEvent::StepStarted(p)
            | ReplayEvent::StepCompleted(p) => Some(p),
            ReplayEvent::Log(_) | ReplayEvent::Error(_) => None,
        }
    }
}
