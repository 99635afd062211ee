use crate::selector::RawSelector;
use crate::{Bounds, SelectorChain, ValidationError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "WorkflowRecord")]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub device_info: Option<DeviceInfo>,
    pub tags: Vec<String>,
    pub version: u32,
    steps: Vec<WorkflowStep>,
}

impl Default for Workflow {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            name: "New Workflow".to_string(),
            device_info: None,
            tags: vec![],
            version: 1,
            steps: vec![],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub model: Option<String>,
    pub manufacturer: Option<String>,
    pub os_version: Option<String>,
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn push_step(&mut self, step: WorkflowStep) -> Uuid {
        let id = step.id;
        self.steps.push(step);
        self.renumber();
        id
    }

    pub fn insert_step(&mut self, index: usize, step: WorkflowStep) -> Result<Uuid, ValidationError> {
        if index > self.steps.len() {
            return Err(ValidationError::StepOutOfRange {
                index,
                len: self.steps.len(),
            });
        }
        let id = step.id;
        self.steps.insert(index, step);
        self.renumber();
        Ok(id)
    }

    pub fn remove_step(&mut self, id: Uuid) -> Option<WorkflowStep> {
        let position = self.steps.iter().position(|s| s.id == id)?;
        let removed = self.steps.remove(position);
        self.renumber();
        Some(removed)
    }

    pub fn move_step(&mut self, from: usize, to: usize) -> Result<(), ValidationError> {
        let len = self.steps.len();
        for index in [from, to] {
            if index >= len {
                return Err(ValidationError::StepOutOfRange { index, len });
            }
        }
        let step = self.steps.remove(from);
        self.steps.insert(to, step);
        self.renumber();
        Ok(())
    }

    pub fn find_step(&self, id: Uuid) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Mutable access to a step's content. Its position cannot change through
    /// this reference, so `order` stays consistent.
    pub fn find_step_mut(&mut self, id: Uuid) -> Option<&mut WorkflowStep> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    /// Screen rectangle recorded with the workflow, if the recorder knew it.
    pub fn screen_bounds(&self) -> Option<Bounds> {
        let info = self.device_info.as_ref()?;
        let width = i32::try_from(info.screen_width?).ok()?;
        let height = i32::try_from(info.screen_height?).ok()?;
        Bounds::new(0, 0, width, height)
    }

    fn renumber(&mut self) {
        for (position, step) in self.steps.iter_mut().enumerate() {
            step.order = position;
        }
    }
}

/// Deserialization shape; order values from disk are never trusted.
#[derive(Deserialize)]
struct WorkflowRecord {
    #[serde(default = "Uuid::new_v4")]
    id: Uuid,
    #[serde(default)]
    name: String,
    #[serde(default)]
    device_info: Option<DeviceInfo>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    steps: Vec<WorkflowStep>,
}

fn default_version() -> u32 {
    1
}

impl From<WorkflowRecord> for Workflow {
    fn from(record: WorkflowRecord) -> Self {
        let mut steps = record.steps;
        steps.sort_by_key(|s| s.order);
        let mut workflow = Workflow {
            id: record.id,
            name: record.name,
            device_info: record.device_info,
            tags: record.tags,
            version: record.version,
            steps,
        };
        workflow.renumber();
        workflow
    }
}

// =============================================================================
// Steps
// =============================================================================

/// One step of a workflow.
///
/// A record that cannot be turned into a runnable step (unknown action,
/// missing payload, empty selector value) still loads, as an
/// [`Action::Invalid`] step that fails on its own when replayed.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowStep {
    pub id: Uuid,
    pub action: Action,
    pub selector: Option<SelectorChain>,
    pub name: String,
    pub enabled: bool,
    order: usize,
}

impl WorkflowStep {
    pub fn new(action: Action, selector: Option<SelectorChain>) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            selector,
            name: String::new(),
            enabled: true,
            order: 0,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Position in the owning workflow, maintained by [`Workflow`].
    pub fn order(&self) -> usize {
        self.order
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Tap,
    LongTap,
    Swipe,
    InputText,
    Wait,
    Scroll,
    /// Stands in for a record that did not decode; never parsed from a file.
    Invalid,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Tap => "tap",
            ActionKind::LongTap => "long_tap",
            ActionKind::Swipe => "swipe",
            ActionKind::InputText => "input_text",
            ActionKind::Wait => "wait",
            ActionKind::Scroll => "scroll",
            ActionKind::Invalid => "invalid",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tap" => Ok(ActionKind::Tap),
            "long_tap" => Ok(ActionKind::LongTap),
            "swipe" => Ok(ActionKind::Swipe),
            "input_text" => Ok(ActionKind::InputText),
            "wait" => Ok(ActionKind::Wait),
            "scroll" => Ok(ActionKind::Scroll),
            other => Err(ValidationError::UnknownAction(other.to_string())),
        }
    }
}

/// What a step does, with the payload that kind of action needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Tap(TapData),
    LongTap(TapData),
    Swipe(SwipeData),
    Scroll(SwipeData),
    InputText(InputTextData),
    Wait(WaitData),
    Invalid(InvalidAction),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Tap(_) => ActionKind::Tap,
            Action::LongTap(_) => ActionKind::LongTap,
            Action::Swipe(_) => ActionKind::Swipe,
            Action::Scroll(_) => ActionKind::Scroll,
            Action::InputText(_) => ActionKind::InputText,
            Action::Wait(_) => ActionKind::Wait,
            Action::Invalid(_) => ActionKind::Invalid,
        }
    }
}

/// A step record that failed to decode, kept as read so saving the workflow
/// writes it back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidAction {
    /// The `action` field as written, empty when absent.
    pub action: String,
    pub error: ValidationError,
    record: Value,
}

impl InvalidAction {
    pub fn new(record: Value, error: ValidationError) -> Self {
        let action = record
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self {
            action,
            error,
            record,
        }
    }

    /// The original record with the step's current identity fields.
    fn record_for(&self, step: &WorkflowStep) -> Value {
        let mut record = self.record.clone();
        if let Some(fields) = record.as_object_mut() {
            fields.insert("id".into(), Value::String(step.id.to_string()));
            fields.insert("name".into(), Value::String(step.name.clone()));
            fields.insert("enabled".into(), Value::Bool(step.enabled));
            fields.insert("order".into(), Value::from(step.order));
        }
        record
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapData {
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub duration_ms: u64,
}

impl TapData {
    pub fn at(x: i32, y: i32) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            duration_ms: 0,
        }
    }

    pub fn point(&self) -> Option<(i32, i32)> {
        Some((self.x?, self.y?))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geometry of a swipe or scroll. For `Swipe` the direction is the finger
/// movement; for `Scroll` it is the direction the content moves towards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwipeData {
    pub direction: Direction,
    pub start_x: Option<i32>,
    pub start_y: Option<i32>,
    pub end_x: Option<i32>,
    pub end_y: Option<i32>,
    pub duration_ms: u64,
}

impl Default for SwipeData {
    fn default() -> Self {
        Self {
            direction: Direction::default(),
            start_x: None,
            start_y: None,
            end_x: None,
            end_y: None,
            duration_ms: 300,
        }
    }
}

impl SwipeData {
    pub fn towards(direction: Direction) -> Self {
        Self {
            direction,
            ..Default::default()
        }
    }

    /// Explicit start and end points, when all four coordinates are known.
    pub fn path(&self) -> Option<((i32, i32), (i32, i32))> {
        Some((
            (self.start_x?, self.start_y?),
            (self.end_x?, self.end_y?),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputTextData {
    pub text: String,
    #[serde(default = "default_true")]
    pub clear_first: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitData {
    pub duration_ms: u64,
    #[serde(default)]
    pub wait_for_element: bool,
}

impl WaitData {
    pub fn for_ms(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            wait_for_element: false,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Flat wire record: the action kind as a string plus one optional payload
/// field per kind, as written by recorders.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawStep {
    #[serde(default = "Uuid::new_v4")]
    id: Uuid,
    action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selector: Option<RawSelector>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    order: usize,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tap_data: Option<TapData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    swipe_data: Option<SwipeData>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "input_text_data")]
    input_data: Option<InputTextData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    wait_data: Option<WaitData>,
}

impl RawStep {
    /// Names of the payload fields that are populated.
    fn populated(&self) -> Vec<&'static str> {
        let mut found = Vec::new();
        if self.tap_data.is_some() {
            found.push("tap_data");
        }
        if self.swipe_data.is_some() {
            found.push("swipe_data");
        }
        if self.input_data.is_some() {
            found.push("input_data");
        }
        if self.wait_data.is_some() {
            found.push("wait_data");
        }
        found
    }
}

impl TryFrom<RawStep> for WorkflowStep {
    type Error = ValidationError;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        let kind: ActionKind = raw.action.parse()?;
        let expected = match kind {
            ActionKind::Tap | ActionKind::LongTap => "tap_data",
            ActionKind::Swipe | ActionKind::Scroll => "swipe_data",
            ActionKind::InputText => "input_data",
            ActionKind::Wait => "wait_data",
            ActionKind::Invalid => return Err(ValidationError::UnknownAction(raw.action)),
        };
        if let Some(found) = raw.populated().into_iter().find(|f| *f != expected) {
            return Err(ValidationError::PayloadMismatch {
                action: kind,
                found,
            });
        }

        // Taps and scrolls are meaningful without a payload (selector-driven);
        // the other kinds carry data that cannot be defaulted.
        let action = match kind {
            ActionKind::Tap => Action::Tap(raw.tap_data.unwrap_or_default()),
            ActionKind::LongTap => Action::LongTap(raw.tap_data.unwrap_or_default()),
            ActionKind::Scroll => Action::Scroll(raw.swipe_data.unwrap_or_default()),
            ActionKind::Swipe => Action::Swipe(
                raw.swipe_data
                    .ok_or(ValidationError::MissingPayload(kind))?,
            ),
            ActionKind::InputText => Action::InputText(
                raw.input_data
                    .ok_or(ValidationError::MissingPayload(kind))?,
            ),
            ActionKind::Wait => Action::Wait(
                raw.wait_data
                    .ok_or(ValidationError::MissingPayload(kind))?,
            ),
            ActionKind::Invalid => return Err(ValidationError::UnknownAction(raw.action)),
        };
        let selector = raw.selector.map(SelectorChain::try_from).transpose()?;

        Ok(WorkflowStep {
            id: raw.id,
            action,
            selector,
            name: raw.name,
            enabled: raw.enabled,
            order: raw.order,
        })
    }
}

impl RawStep {
    fn from_step(step: &WorkflowStep) -> Self {
        let mut raw = RawStep {
            id: step.id,
            action: step.kind().as_str().to_string(),
            selector: step.selector.clone().map(RawSelector::from),
            name: step.name.clone(),
            order: step.order,
            enabled: step.enabled,
            tap_data: None,
            swipe_data: None,
            input_data: None,
            wait_data: None,
        };
        match &step.action {
            Action::Tap(data) | Action::LongTap(data) => raw.tap_data = Some(data.clone()),
            Action::Swipe(data) | Action::Scroll(data) => raw.swipe_data = Some(data.clone()),
            Action::InputText(data) => raw.input_data = Some(data.clone()),
            Action::Wait(data) => raw.wait_data = Some(data.clone()),
            Action::Invalid(_) => {}
        }
        raw
    }
}

impl WorkflowStep {
    fn from_record(record: Value) -> Self {
        let decoded = RawStep::deserialize(&record)
            .map_err(|e| ValidationError::Malformed(e.to_string()))
            .and_then(WorkflowStep::try_from);
        match decoded {
            Ok(step) => step,
            Err(error) => {
                warn!(%error, "keeping undecodable step as invalid");
                let field = |key: &str| record.get(key);
                WorkflowStep {
                    id: field("id")
                        .and_then(Value::as_str)
                        .and_then(|s| Uuid::parse_str(s).ok())
                        .unwrap_or_else(Uuid::new_v4),
                    name: field("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    enabled: field("enabled").and_then(Value::as_bool).unwrap_or(true),
                    order: field("order")
                        .and_then(Value::as_u64)
                        .map_or(0, |o| o as usize),
                    selector: None,
                    action: Action::Invalid(InvalidAction::new(record, error)),
                }
            }
        }
    }
}

impl Serialize for WorkflowStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.action {
            Action::Invalid(invalid) => invalid.record_for(self).serialize(serializer),
            _ => RawStep::from_step(self).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for WorkflowStep {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(WorkflowStep::from_record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait(ms: u64) -> WorkflowStep {
        WorkflowStep::new(Action::Wait(WaitData::for_ms(ms)), None)
    }

    fn orders(wf: &Workflow) -> Vec<usize> {
        wf.steps().iter().map(|s| s.order()).collect()
    }

    #[test]
    fn order_stays_dense_across_mutations() {
        let mut wf = Workflow::new("login");
        let a = wf.push_step(wait(1));
        let b = wf.push_step(wait(2));
        wf.push_step(wait(3));
        assert_eq!(orders(&wf), vec![0, 1, 2]);

        wf.insert_step(0, wait(4)).unwrap();
        assert_eq!(orders(&wf), vec![0, 1, 2, 3]);
        assert_eq!(wf.find_step(a).unwrap().order(), 1);

        wf.remove_step(b).unwrap();
        assert_eq!(orders(&wf), vec![0, 1, 2]);

        wf.move_step(2, 0).unwrap();
        assert_eq!(orders(&wf), vec![0, 1, 2]);
        assert_eq!(wf.find_step(a).unwrap().order(), 2);
    }

    #[test]
    fn out_of_range_mutations_are_rejected() {
        let mut wf = Workflow::new("w");
        wf.push_step(wait(1));
        assert!(wf.insert_step(5, wait(2)).is_err());
        assert!(wf.move_step(0, 1).is_err());
        assert!(wf.remove_step(Uuid::new_v4()).is_none());
        assert_eq!(wf.len(), 1);
    }

    #[test]
    fn flat_record_decodes_into_matching_variant() {
        let json = serde_json::json!({
            "action": "swipe",
            "name": "Swipe up",
            "swipe_data": {"direction": "up", "duration_ms": 250}
        });
        let step: WorkflowStep = serde_json::from_value(json).unwrap();
        match step.action {
            Action::Swipe(data) => {
                assert_eq!(data.direction, Direction::Up);
                assert_eq!(data.duration_ms, 250);
                assert!(data.path().is_none());
            }
            other => panic!("unexpected action {:?}", other),
        }
        assert!(step.enabled);
    }

    fn invalid_error(json: serde_json::Value) -> ValidationError {
        let step: WorkflowStep = serde_json::from_value(json).unwrap();
        match step.action {
            Action::Invalid(invalid) => invalid.error,
            other => panic!("expected an invalid step, got {:?}", other),
        }
    }

    #[test]
    fn unknown_action_loads_as_invalid_step() {
        let json = serde_json::json!({"action": "pinch", "name": "Zoom"});
        let step: WorkflowStep = serde_json::from_value(json).unwrap();
        assert_eq!(step.name, "Zoom");
        assert_eq!(step.kind(), ActionKind::Invalid);
        match &step.action {
            Action::Invalid(invalid) => {
                assert_eq!(invalid.action, "pinch");
                assert_eq!(invalid.error, ValidationError::UnknownAction("pinch".into()));
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn mismatched_payload_loads_as_invalid_step() {
        let err = invalid_error(serde_json::json!({
            "action": "swipe",
            "tap_data": {"x": 1, "y": 2}
        }));
        assert!(matches!(
            err,
            ValidationError::PayloadMismatch { found: "tap_data", .. }
        ));
    }

    #[test]
    fn missing_required_payload_loads_as_invalid_step() {
        let err = invalid_error(serde_json::json!({"action": "input_text"}));
        assert_eq!(err, ValidationError::MissingPayload(ActionKind::InputText));
    }

    #[test]
    fn empty_selector_value_loads_as_invalid_step() {
        let err = invalid_error(serde_json::json!({
            "action": "tap",
            "selector": {"type": "text", "value": ""}
        }));
        assert!(matches!(err, ValidationError::EmptySelectorValue(_)));
    }

    #[test]
    fn malformed_payload_loads_as_invalid_step() {
        let err = invalid_error(serde_json::json!({
            "action": "wait",
            "wait_data": {"duration_ms": "soon"}
        }));
        assert!(matches!(err, ValidationError::Malformed(_)));
    }

    #[test]
    fn invalid_step_is_written_back_as_read() {
        let json = serde_json::json!({
            "action": "pinch",
            "scale": 2.5,
            "selector": {"type": "text", "value": "Map"}
        });
        let mut step: WorkflowStep = serde_json::from_value(json).unwrap();
        step.name = "Zoom map".into();
        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["action"], "pinch");
        assert_eq!(value["scale"], 2.5);
        assert_eq!(value["selector"]["value"], "Map");
        assert_eq!(value["name"], "Zoom map");
        assert_eq!(value["id"], step.id.to_string());
    }

    #[test]
    fn tap_without_payload_defaults() {
        let json = serde_json::json!({
            "action": "tap",
            "selector": {"type": "text", "value": "OK"}
        });
        let step: WorkflowStep = serde_json::from_value(json).unwrap();
        assert_eq!(step.action, Action::Tap(TapData::default()));
        assert_eq!(step.selector.unwrap().primary().value(), "OK");
    }

    #[test]
    fn serialization_populates_only_the_matching_payload() {
        let step = WorkflowStep::new(
            Action::InputText(InputTextData {
                text: "hi".into(),
                clear_first: false,
            }),
            None,
        );
        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["action"], "input_text");
        assert_eq!(value["input_data"]["text"], "hi");
        assert!(value.get("tap_data").is_none());
        assert!(value.get("wait_data").is_none());
    }

    #[test]
    fn loaded_workflow_renumbers_steps() {
        let json = serde_json::json!({
            "name": "w",
            "steps": [
                {"action": "wait", "order": 7, "name": "second", "wait_data": {"duration_ms": 1}},
                {"action": "wait", "order": 3, "name": "first", "wait_data": {"duration_ms": 1}}
            ]
        });
        let wf: Workflow = serde_json::from_value(json).unwrap();
        assert_eq!(orders(&wf), vec![0, 1]);
        assert_eq!(wf.steps()[0].name, "first");
        assert_eq!(wf.version, 1);
    }

    #[test]
    fn screen_bounds_from_device_info() {
        let mut wf = Workflow::new("w");
        assert!(wf.screen_bounds().is_none());
        wf.device_info = Some(DeviceInfo {
            screen_width: Some(1080),
            screen_height: Some(2400),
            ..Default::default()
        });
        assert_eq!(wf.screen_bounds(), Bounds::new(0, 0, 1080, 2400));
    }
}
