use crate::{DeviceAction, DeviceError, DeviceState, RecordedEvent};
use async_trait::async_trait;
use std::sync::Arc;

/// What the replay engine needs from a device.
#[async_trait]
pub trait ControlSurface: Send + Sync {
    async fn ping(&self) -> Result<(), DeviceError>;

    /// Current accessibility tree and phone state.
    async fn fetch_state(&self) -> Result<DeviceState, DeviceError>;

    async fn perform(&self, action: &DeviceAction) -> Result<(), DeviceError>;
}

/// Source of interactions captured by an on-device recorder.
#[async_trait]
pub trait RecordingFeed: Send + Sync {
    /// Events with an id greater than `since`, oldest first.
    async fn recorded_events(&self, since: Option<u64>) -> Result<Vec<RecordedEvent>, DeviceError>;
}

#[async_trait]
impl<T: ControlSurface + ?Sized> ControlSurface for Arc<T> {
    async fn ping(&self) -> Result<(), DeviceError> {
        (**self).ping().await
    }

    async fn fetch_state(&self) -> Result<DeviceState, DeviceError> {
        (**self).fetch_state().await
    }

    async fn perform(&self, action: &DeviceAction) -> Result<(), DeviceError> {
        (**self).perform(action).await
    }
}

#[async_trait]
impl<T: RecordingFeed + ?Sized> RecordingFeed for Arc<T> {
    async fn recorded_events(&self, since: Option<u64>) -> Result<Vec<RecordedEvent>, DeviceError> {
        (**self).recorded_events(since).await
    }
}
