use crate::DeviceError;
use retrace_core::{AccessibilityNode, Direction};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::str::FromStr;

/// `{status, message?}` envelope returned by every endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl StatusResponse {
    /// Responses without a status field count as success; some portal
    /// builds only send `data`.
    pub fn is_success(&self) -> bool {
        self.status.as_deref().is_none_or(|s| s == "success")
    }

    pub fn into_result(self, endpoint: &str) -> Result<Self, DeviceError> {
        if self.is_success() {
            return Ok(self);
        }
        let message = self
            .message
            .clone()
            .or_else(|| self.data.as_ref().and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| format!("status '{}'", self.status.as_deref().unwrap_or("")));
        Err(DeviceError::rejected(endpoint, message))
    }
}

/// Decoded `/state` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    #[serde(default, alias = "a11yTree")]
    pub a11y_tree: Vec<AccessibilityNode>,
    #[serde(default, alias = "phoneState")]
    pub phone_state: Value,
}

impl DeviceState {
    /// `data` is normally a JSON document inside a string; an inline object
    /// is accepted too.
    pub fn from_data(data: &Value) -> Result<Self, DeviceError> {
        let decoded = match data {
            Value::String(s) => serde_json::from_str(s),
            Value::Object(_) => serde_json::from_value(data.clone()),
            other => {
                return Err(DeviceError::decode(
                    "/state",
                    format!("expected string or object data, got {}", other),
                ));
            }
        };
        decoded.map_err(|e| DeviceError::decode("/state", e))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Forward,
    Backward,
}

impl ScrollDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            ScrollDirection::Forward => "forward",
            ScrollDirection::Backward => "backward",
        }
    }
}

impl From<Direction> for ScrollDirection {
    /// Down and right reveal content further along the list.
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Down | Direction::Right => ScrollDirection::Forward,
            Direction::Up | Direction::Left => ScrollDirection::Backward,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlobalAction {
    Back,
    Home,
    Recents,
    Notifications,
}

impl GlobalAction {
    pub fn as_str(self) -> &'static str {
        match self {
            GlobalAction::Back => "back",
            GlobalAction::Home => "home",
            GlobalAction::Recents => "recents",
            GlobalAction::Notifications => "notifications",
        }
    }
}

impl FromStr for GlobalAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "back" => Ok(GlobalAction::Back),
            "home" => Ok(GlobalAction::Home),
            "recents" => Ok(GlobalAction::Recents),
            "notifications" => Ok(GlobalAction::Notifications),
            other => Err(format!(
                "unknown global action '{}' (expected back, home, recents or notifications)",
                other
            )),
        }
    }
}

/// One request to an `/action/*` endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceAction {
    Tap {
        x: i32,
        y: i32,
    },
    Click {
        index: i64,
    },
    LongClick {
        index: i64,
    },
    LongPress {
        x: i32,
        y: i32,
        duration_ms: u64,
    },
    Swipe {
        start: (i32, i32),
        end: (i32, i32),
        duration_ms: u64,
    },
    Scroll {
        index: i64,
        direction: ScrollDirection,
    },
    SetText {
        index: Option<i64>,
        text: String,
    },
    Global(GlobalAction),
}

impl DeviceAction {
    pub fn endpoint(&self) -> &'static str {
        match self {
            DeviceAction::Tap { .. } => "/action/tap",
            DeviceAction::Click { .. } => "/action/click",
            DeviceAction::LongClick { .. } => "/action/longclick",
            DeviceAction::LongPress { .. } => "/action/longpress",
            DeviceAction::Swipe { .. } => "/action/swipe",
            DeviceAction::Scroll { .. } => "/action/scroll",
            DeviceAction::SetText { .. } => "/action/setText",
            DeviceAction::Global(_) => "/action/global",
        }
    }

    pub fn body(&self) -> Value {
        match self {
            DeviceAction::Tap { x, y } => json!({"x": x, "y": y}),
            DeviceAction::Click { index } | DeviceAction::LongClick { index } => {
                json!({"index": index})
            }
            DeviceAction::LongPress { x, y, duration_ms } => {
                json!({"x": x, "y": y, "duration": duration_ms})
            }
            DeviceAction::Swipe {
                start,
                end,
                duration_ms,
            } => json!({
                "startX": start.0,
                "startY": start.1,
                "endX": end.0,
                "endY": end.1,
                "duration": duration_ms,
            }),
            DeviceAction::Scroll { index, direction } => {
                json!({"index": index, "direction": direction.as_str()})
            }
            DeviceAction::SetText { index, text } => match index {
                Some(index) => json!({"index": index, "text": text}),
                None => json!({"text": text}),
            },
            DeviceAction::Global(action) => json!({"action": action.as_str()}),
        }
    }
}

/// An interaction captured by the on-device recorder.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecordedEvent {
    pub id: u64,
    pub action: String,
    #[serde(default)]
    pub element: Value,
    #[serde(default)]
    pub x: Option<i32>,
    #[serde(default)]
    pub y: Option<i32>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default, alias = "durationMs", alias = "duration")]
    pub duration_ms: Option<u64>,
    /// Finger path of a swipe, when the recorder reports one.
    #[serde(default, alias = "startX")]
    pub start_x: Option<i32>,
    #[serde(default, alias = "startY")]
    pub start_y: Option<i32>,
    #[serde(default, alias = "endX")]
    pub end_x: Option<i32>,
    #[serde(default, alias = "endY")]
    pub end_y: Option<i32>,
}

/// Events from a `/recording/events` response; a missing `data` means none.
pub(crate) fn decode_events(
    response: StatusResponse,
    endpoint: &str,
) -> Result<Vec<RecordedEvent>, DeviceError> {
    match response.into_result(endpoint)?.data {
        Some(Value::Null) | None => Ok(vec![]),
        Some(data) => serde_json::from_value(data).map_err(|e| DeviceError::decode(endpoint, e)),
    }
}
