//! Turns interactions captured on the device into workflow steps.
//!
//! A background task polls the device's recording feed and appends one step
//! per new event to a [`RecordingSession`]. The task only holds a weak
//! reference to the session and ends quietly once the session is dropped.

use parking_lot::Mutex;
use retrace_core::{
    Action, Direction, ElementSnapshot, InputTextData, SelectorGenerator, StepNamer, SwipeData, TapData,
    WaitData, Workflow, WorkflowStep,
};
use retrace_device::{RecordedEvent, RecordingFeed};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RecordingConfig {
    pub poll_interval: Duration,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
        }
    }
}

pub struct RecordingSession {
    workflow: Mutex<Workflow>,
    last_event_id: Mutex<Option<u64>>,
    generator: SelectorGenerator,
    namer: StepNamer,
}

impl RecordingSession {
    pub fn new(workflow: Workflow, generator: SelectorGenerator, namer: StepNamer) -> Arc<Self> {
        Arc::new(Self {
            workflow: Mutex::new(workflow),
            last_event_id: Mutex::new(None),
            generator,
            namer,
        })
    }

    /// Copy of the workflow recorded so far.
    pub fn workflow(&self) -> Workflow {
        self.workflow.lock().clone()
    }

    pub fn step_count(&self) -> usize {
        self.workflow.lock().len()
    }

    pub fn last_event_id(&self) -> Option<u64> {
        *self.last_event_id.lock()
    }

    /// Append a step for `event`. Events at or before the last one seen and
    /// events that do not describe a replayable action are ignored.
    pub fn record(&self, event: &RecordedEvent) -> Option<Uuid> {
        {
            let mut last = self.last_event_id.lock();
            if last.is_some_and(|id| event.id <= id) {
                debug!(event_id = event.id, "skipping already recorded event");
                return None;
            }
            *last = Some(event.id);
        }
        let step = event_to_step(event, &self.generator, &self.namer)?;
        info!(step = %step.name, event_id = event.id, "Recorded step");
        Some(self.workflow.lock().push_step(step))
    }
}

/// Build a step from a recorded event.
///
/// Coordinates are kept only when no selector could be generated, so that
/// replay locates the element again rather than tapping a stale position.
pub fn event_to_step(
    event: &RecordedEvent,
    generator: &SelectorGenerator,
    namer: &StepNamer,
) -> Option<WorkflowStep> {
    let element = ElementSnapshot::from_value(&event.element);
    let selector = generator.generate(&element);
    let point = if selector.is_some() {
        (None, None)
    } else {
        (event.x, event.y)
    };
    let tap = TapData {
        x: point.0,
        y: point.1,
        duration_ms: event.duration_ms.unwrap_or(0),
    };
    let path = match (event.start_x, event.start_y, event.end_x, event.end_y) {
        (Some(sx), Some(sy), Some(ex), Some(ey)) => Some(((sx, sy), (ex, ey))),
        _ => None,
    };
    let swipe = SwipeData {
        direction: event
            .direction
            .or_else(|| path.map(|(start, end)| direction_of(start, end)))
            .unwrap_or_default(),
        start_x: path.map(|(start, _)| start.0),
        start_y: path.map(|(start, _)| start.1),
        end_x: path.map(|(_, end)| end.0),
        end_y: path.map(|(_, end)| end.1),
        duration_ms: event.duration_ms.unwrap_or(SwipeData::default().duration_ms),
    };

    let action = match event.action.to_ascii_lowercase().as_str() {
        "tap" | "click" => Action::Tap(tap),
        "long_tap" | "long_click" | "longclick" | "long_press" | "longpress" => {
            Action::LongTap(tap)
        }
        "swipe" => Action::Swipe(swipe),
        "scroll" => Action::Scroll(swipe),
        "input_text" | "text" | "type" | "set_text" => Action::InputText(InputTextData {
            text: event.text.clone().filter(|t| !t.is_empty())?,
            clear_first: true,
        }),
        "wait" => Action::Wait(WaitData::for_ms(event.duration_ms.unwrap_or(1000))),
        other => {
            warn!(action = other, event_id = event.id, "ignoring unsupported recorded action");
            return None;
        }
    };

    let target = (!element.is_empty()).then_some(&element);
    let name = namer.label(&action, target);
    Some(WorkflowStep::new(action, selector).named(name))
}

/// Direction of the dominant axis of a finger path.
fn direction_of(start: (i32, i32), end: (i32, i32)) -> Direction {
    let dx = i64::from(end.0) - i64::from(start.0);
    let dy = i64::from(end.1) - i64::from(start.1);
    match (dx.abs() > dy.abs(), dx < 0, dy < 0) {
        (true, true, _) => Direction::Left,
        (true, false, _) => Direction::Right,
        (false, _, true) => Direction::Up,
        (false, _, false) => Direction::Down,
    }
}

/// Background task feeding a [`RecordingSession`].
pub struct RecordingPoller {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RecordingPoller {
    pub fn spawn<F>(feed: Arc<F>, session: &Arc<RecordingSession>, config: RecordingConfig) -> Self
    where
        F: RecordingFeed + ?Sized + 'static,
    {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll_loop(
            feed,
            Arc::downgrade(session),
            config,
            cancel.clone(),
        ));
        Self { cancel, task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the task and wait for it to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("recording poller ended abnormally: {}", e);
        }
    }
}

async fn poll_loop<F>(
    feed: Arc<F>,
    session: Weak<RecordingSession>,
    config: RecordingConfig,
    cancel: CancellationToken,
) where
    F: RecordingFeed + ?Sized,
{
    info!("Recording poller started");
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(config.poll_interval) => {}
        }

        let Some(since) = session.upgrade().map(|s| s.last_event_id()) else {
            break;
        };
        let events = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            events = feed.recorded_events(since) => events,
        };
        let events = match events {
            Ok(events) => events,
            Err(e) => {
                warn!("failed to poll recorded events: {}", e);
                continue;
            }
        };

        let Some(live) = session.upgrade() else {
            break;
        };
        let mut sorted = events;
        sorted.sort_by_key(|e| e.id);
        for event in &sorted {
            live.record(event);
        }
    }
    debug!("Recording poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use retrace_core::{Direction, SelectorKind};
    use retrace_device::DeviceError;
    use serde_json::json;

    fn event(value: serde_json::Value) -> RecordedEvent {
        serde_json::from_value(value).unwrap()
    }

    fn convert(value: serde_json::Value) -> Option<WorkflowStep> {
        event_to_step(
            &event(value),
            &SelectorGenerator::default(),
            &StepNamer::default(),
        )
    }

    #[test]
    fn tap_on_element_gets_selector_and_no_coordinates() {
        let step = convert(json!({
            "id": 1,
            "action": "click",
            "x": 200,
            "y": 300,
            "element": {
                "resourceId": "com.app:id/login",
                "text": "Login",
                "className": "android.widget.Button",
                "bounds": "100,200,300,400"
            }
        }))
        .unwrap();
        assert_eq!(step.action, Action::Tap(TapData::default()));
        let chain = step.selector.unwrap();
        assert_eq!(chain.primary().kind(), SelectorKind::ResourceId);
        assert_eq!(step.name, "Tap \"Login\"");
    }

    #[test]
    fn tap_without_element_keeps_coordinates() {
        let step = convert(json!({"id": 1, "action": "tap", "x": 5, "y": 6})).unwrap();
        assert_eq!(step.action, Action::Tap(TapData::at(5, 6)));
        assert!(step.selector.is_none());
        assert_eq!(step.name, "Tap at (5, 6)");
    }

    #[test]
    fn gestures_and_text() {
        let swipe = convert(json!({"id": 2, "action": "swipe", "direction": "left"})).unwrap();
        assert_eq!(swipe.action, Action::Swipe(SwipeData::towards(Direction::Left)));

        let typed = convert(json!({
            "id": 3,
            "action": "input_text",
            "text": "hello",
            "element": {"contentDescription": "Search"}
        }))
        .unwrap();
        assert_eq!(typed.name, "Type \"hello\" into \"Search\"");

        assert!(convert(json!({"id": 4, "action": "input_text"})).is_none());
        assert!(convert(json!({"id": 5, "action": "pinch"})).is_none());
    }

    #[test]
    fn recorded_swipe_keeps_its_path() {
        let swipe = convert(json!({
            "id": 6,
            "action": "swipe",
            "startX": 540,
            "startY": 1800,
            "endX": 540,
            "endY": 600,
            "durationMs": 250
        }))
        .unwrap();
        let Action::Swipe(data) = swipe.action else {
            panic!("expected a swipe, got {:?}", swipe.action);
        };
        assert_eq!(data.path(), Some(((540, 1800), (540, 600))));
        assert_eq!(data.direction, Direction::Up);
        assert_eq!(data.duration_ms, 250);

        let partial = convert(json!({"id": 7, "action": "swipe", "startX": 1, "direction": "right"}))
            .unwrap();
        assert_eq!(partial.action, Action::Swipe(SwipeData::towards(Direction::Right)));
    }

    #[test]
    fn session_ignores_replayed_event_ids() {
        let session = RecordingSession::new(
            Workflow::new("rec"),
            SelectorGenerator::default(),
            StepNamer::default(),
        );
        let tap = event(json!({"id": 4, "action": "tap", "x": 1, "y": 1}));
        assert!(session.record(&tap).is_some());
        assert!(session.record(&tap).is_none());
        assert_eq!(session.step_count(), 1);
        assert_eq!(session.last_event_id(), Some(4));
    }

    struct ScriptedFeed {
        events: Vec<RecordedEvent>,
        calls: Mutex<Vec<Option<u64>>>,
    }

    #[async_trait]
    impl RecordingFeed for ScriptedFeed {
        async fn recorded_events(
            &self,
            since: Option<u64>,
        ) -> Result<Vec<RecordedEvent>, DeviceError> {
            self.calls.lock().push(since);
            Ok(self
                .events
                .iter()
                .filter(|e| since.is_none_or(|s| e.id > s))
                .cloned()
                .collect())
        }
    }

    fn feed() -> Arc<ScriptedFeed> {
        Arc::new(ScriptedFeed {
            events: vec![
                event(json!({"id": 2, "action": "swipe", "direction": "up"})),
                event(json!({"id": 1, "action": "tap", "x": 10, "y": 20})),
            ],
            calls: Mutex::new(vec![]),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn poller_appends_new_events_in_id_order() {
        let feed = feed();
        let session = RecordingSession::new(
            Workflow::new("rec"),
            SelectorGenerator::default(),
            StepNamer::default(),
        );
        let poller = RecordingPoller::spawn(feed.clone(), &session, RecordingConfig::default());

        tokio::time::sleep(Duration::from_millis(1600)).await;
        poller.stop().await;

        let workflow = session.workflow();
        assert_eq!(workflow.len(), 2);
        assert_eq!(workflow.steps()[0].kind(), retrace_core::ActionKind::Tap);
        assert_eq!(workflow.steps()[1].kind(), retrace_core::ActionKind::Swipe);
        let calls = feed.calls.lock().clone();
        assert_eq!(calls[0], None);
        assert!(calls[1..].iter().all(|since| *since == Some(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn poller_exits_when_session_is_dropped() {
        let session = RecordingSession::new(
            Workflow::new("rec"),
            SelectorGenerator::default(),
            StepNamer::default(),
        );
        let poller = RecordingPoller::spawn(feed(), &session, RecordingConfig::default());
        drop(session);

        tokio::time::sleep(Duration::from_millis(600)).await;
        tokio::task::yield_now().await;
        assert!(poller.is_finished());
    }
}
