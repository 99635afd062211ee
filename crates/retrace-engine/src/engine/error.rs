use super::ReplayStatus;
use retrace_core::ValidationError;
use retrace_device::DeviceError;
use thiserror::Error;

/// Why a single step did not succeed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    #[error("no element matched {0}")]
    ElementNotFound(String),

    #[error("element {chain} did not appear within {waited_ms} ms")]
    Timeout { chain: String, waited_ms: u64 },

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("run already finished as {0}; reset the engine before replaying again")]
    RunFinished(ReplayStatus),

    #[error("workflow is not valid: {0}")]
    Invalid(#[from] ValidationError),
}
