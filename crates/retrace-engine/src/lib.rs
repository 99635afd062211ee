mod engine;
pub mod recording;

pub use engine::*;
pub use recording::{RecordingConfig, RecordingPoller, RecordingSession};
