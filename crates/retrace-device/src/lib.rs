//! Client side of the device control surface: JSON over HTTP to an
//! accessibility portal running on the phone.

mod client;
mod error;
pub mod protocol;
mod surface;

pub use client::{DeviceClient, DeviceConfig};
pub use error::DeviceError;
pub use protocol::{DeviceAction, DeviceState, GlobalAction, RecordedEvent, ScrollDirection};
pub use surface::{ControlSurface, RecordingFeed};
