use thiserror::Error;

/// Failure talking to the device control surface.
///
/// Only [`DeviceError::Transport`] is worth retrying: the request may not
/// have reached the device. A rejection is the device's answer and repeating
/// the request would get the same one.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    #[error("transport error on {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    #[error("device rejected {endpoint}: {message}")]
    Rejected { endpoint: String, message: String },

    #[error("unexpected response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("failed to set up HTTP client: {0}")]
    Setup(String),
}

impl DeviceError {
    pub fn transport(endpoint: impl Into<String>, message: impl ToString) -> Self {
        DeviceError::Transport {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    pub fn rejected(endpoint: impl Into<String>, message: impl ToString) -> Self {
        DeviceError::Rejected {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    pub fn decode(endpoint: impl Into<String>, message: impl ToString) -> Self {
        DeviceError::Decode {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, DeviceError::Transport { .. })
    }
}
