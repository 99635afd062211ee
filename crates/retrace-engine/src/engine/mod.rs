mod actions;
mod control;
mod error;
mod fallback;
mod progress;
mod retry;
mod run_loop;


pub use control::ReplayHandle;
pub use error::{ReplayError, StepError};
pub use progress::{ReplayEvent, ReplayProgress, StepExecutionResult, StepStatus};

use control::Shared;
use parking_lot::Mutex;
use retrace_core::{Bounds, ElementMatcher, StepNamer};
use retrace_device::{ControlSurface, DeviceClient};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayStatus {
    Idle,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl ReplayStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReplayStatus::Completed | ReplayStatus::Failed | ReplayStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReplayStatus::Idle => "idle",
            ReplayStatus::Running => "running",
            ReplayStatus::Paused => "paused",
            ReplayStatus::Completed => "completed",
            ReplayStatus::Failed => "failed",
            ReplayStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ReplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// End the run as `Failed` at the first failed step.
    pub stop_on_error: bool,
    /// Attempts per device call, counting the first one.
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Pause between consecutive steps.
    pub step_delay: Duration,
    pub wait_poll_interval: Duration,
    /// Screen used for directional gestures when neither the device nor the
    /// workflow has reported one.
    pub default_screen: Bounds,
    pub long_press_ms: u64,
    pub swipe_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            stop_on_error: true,
            max_attempts: 3,
            retry_delay: Duration::from_millis(500),
            step_delay: Duration::from_millis(500),
            wait_poll_interval: Duration::from_millis(250),
            default_screen: Bounds {
                left: 0,
                top: 0,
                right: 1080,
                bottom: 2400,
            },
            long_press_ms: 1000,
            swipe_ms: 300,
        }
    }
}

/// Replays workflows against one device.
pub struct ReplayEngine<D: ControlSurface = DeviceClient> {
    device: D,
    matcher: ElementMatcher,
    namer: StepNamer,
    config: ReplayConfig,
    shared: Arc<Shared>,
    /// Root bounds from the most recent tree fetch.
    last_screen: Mutex<Option<Bounds>>,
    /// Screen recorded with the workflow being replayed.
    workflow_screen: Option<Bounds>,
}

impl<D: ControlSurface> ReplayEngine<D> {
    pub fn new(device: D, matcher: ElementMatcher, namer: StepNamer, config: ReplayConfig) -> Self {
        Self {
            device,
            matcher,
            namer,
            config,
            shared: Shared::new(),
            last_screen: Mutex::new(None),
            workflow_screen: None,
        }
    }

    pub fn handle(&self) -> ReplayHandle {
        ReplayHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReplayEvent> {
        self.shared.subscribe()
    }

    pub fn status(&self) -> ReplayStatus {
        self.shared.status()
    }

    pub fn progress(&self) -> ReplayProgress {
        self.shared.snapshot()
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn pause(&self) -> bool {
        self.shared.pause()
    }

    pub fn resume(&self) -> bool {
        self.shared.resume()
    }

    pub fn cancel(&self) -> bool {
        self.shared.cancel()
    }

    /// Discard the finished run so the engine can replay again.
    pub fn reset(&mut self) {
        *self.last_screen.lock() = None;
        self.workflow_screen = None;
        self.shared.reset();
    }
}
