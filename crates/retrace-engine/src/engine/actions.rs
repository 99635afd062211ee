use super::fallback::{FallbackHit, with_selector_fallback};
use super::{ReplayEngine, StepError};
use retrace_core::{
    AccessibilityNode, Action, Bounds, Direction, ElementSelector, InputTextData, SelectorChain,
    SelectorKind, SwipeData, TapData, WaitData, WorkflowStep, validate_step,
};
use retrace_device::{ControlSurface, DeviceAction, ScrollDirection};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// What a successful step reports.
#[derive(Debug, Default)]
pub(crate) struct StepOutcome {
    pub message: String,
    pub selector: Option<(ElementSelector, usize)>,
    pub fallback_used: bool,
}

impl StepOutcome {
    fn done(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    fn via<T>(message: impl Into<String>, hit: &FallbackHit<T>) -> Self {
        Self {
            message: message.into(),
            selector: Some((hit.selector.clone(), hit.index)),
            fallback_used: hit.fallback_used(),
        }
    }
}

impl<D: ControlSurface> ReplayEngine<D> {
    pub(crate) async fn execute_step(
        &self,
        step: &WorkflowStep,
        token: &CancellationToken,
    ) -> Result<StepOutcome, StepError> {
        validate_step(step)?;
        let chain = step.selector.as_ref();
        match &step.action {
            Action::Wait(data) => self.run_wait(chain, data, token).await,
            Action::Tap(data) => self.run_tap(chain, data, false, token).await,
            Action::LongTap(data) => self.run_tap(chain, data, true, token).await,
            Action::Swipe(data) => self.run_swipe(data, token).await,
            Action::Scroll(data) => self.run_scroll(chain, data, token).await,
            Action::InputText(data) => self.run_input(chain, data, token).await,
            Action::Invalid(invalid) => Err(StepError::Invalid(invalid.error.clone())),
        }
    }

    async fn run_wait(
        &self,
        chain: Option<&SelectorChain>,
        data: &WaitData,
        token: &CancellationToken,
    ) -> Result<StepOutcome, StepError> {
        let duration = Duration::from_millis(data.duration_ms);
        let Some(chain) = chain.filter(|_| data.wait_for_element) else {
            self.sleep(duration, token).await?;
            return Ok(StepOutcome::done(format!("Waited {} ms", data.duration_ms)));
        };

        let deadline = Instant::now() + duration;
        loop {
            let tree = self.fetch_tree(token).await?;
            if let Some(found) = self.matcher.find(&tree, chain) {
                return Ok(StepOutcome {
                    message: format!("Element appeared: {}", found.selector),
                    selector: Some((found.selector.clone(), found.selector_index)),
                    fallback_used: found.fallback_used(),
                });
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(StepError::Timeout {
                    chain: chain.to_string(),
                    waited_ms: data.duration_ms,
                });
            }
            self.sleep(self.config.wait_poll_interval.min(deadline - now), token)
                .await?;
        }
    }

    async fn run_tap(
        &self,
        chain: Option<&SelectorChain>,
        data: &TapData,
        long: bool,
        token: &CancellationToken,
    ) -> Result<StepOutcome, StepError> {
        let verb = if long { "Long-pressed" } else { "Tapped" };
        if let Some((x, y)) = data.point() {
            self.perform(self.press_at(x, y, long, data), token).await?;
            return Ok(StepOutcome::done(format!("{} at ({}, {})", verb, x, y)));
        }
        let Some(chain) = chain else {
            return Err(StepError::ElementNotFound("no selector".to_string()));
        };

        let tree = self.fetch_tree(token).await?;
        let result = with_selector_fallback(chain, async |selector: &ElementSelector| {
            let Some(node) = self.matcher.find_node(&tree, selector) else {
                return Ok(None);
            };
            let action = match node.parsed_bounds() {
                Some(bounds) => {
                    let (x, y) = bounds.center();
                    self.press_at(x, y, long, data)
                }
                None => match node.index {
                    Some(index) if long => DeviceAction::LongClick { index },
                    Some(index) => DeviceAction::Click { index },
                    None => return Ok(None),
                },
            };
            let described = describe(&action);
            self.perform(action, token).await?;
            Ok(Some(described))
        })
        .await;

        match result {
            Ok(hit) => Ok(StepOutcome::via(format!("{} {}", verb, hit.value), &hit)),
            Err(StepError::ElementNotFound(what)) => {
                let Some((index, selector, (x, y))) = bounds_fallback(chain) else {
                    return Err(StepError::ElementNotFound(what));
                };
                self.log(format!(
                    "No element matched {}; using recorded bounds centre ({}, {})",
                    what, x, y
                ));
                self.perform(self.press_at(x, y, long, data), token).await?;
                Ok(StepOutcome {
                    message: format!("{} recorded bounds centre ({}, {})", verb, x, y),
                    selector: Some((selector.clone(), index)),
                    fallback_used: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    fn press_at(&self, x: i32, y: i32, long: bool, data: &TapData) -> DeviceAction {
        if !long {
            return DeviceAction::Tap { x, y };
        }
        let duration_ms = if data.duration_ms > 0 {
            data.duration_ms
        } else {
            self.config.long_press_ms
        };
        DeviceAction::LongPress { x, y, duration_ms }
    }

    async fn run_swipe(
        &self,
        data: &SwipeData,
        token: &CancellationToken,
    ) -> Result<StepOutcome, StepError> {
        let (start, end) = data
            .path()
            .unwrap_or_else(|| gesture_path(self.screen(), data.direction));
        self.perform(self.swipe_action(start, end, data), token)
            .await?;
        Ok(StepOutcome::done(format!(
            "Swiped {} from ({}, {}) to ({}, {})",
            data.direction, start.0, start.1, end.0, end.1
        )))
    }

    /// Scroll the matched container by index; without a usable selector,
    /// swipe the screen instead.
    async fn run_scroll(
        &self,
        chain: Option<&SelectorChain>,
        data: &SwipeData,
        token: &CancellationToken,
    ) -> Result<StepOutcome, StepError> {
        if let Some((start, end)) = data.path() {
            self.perform(self.swipe_action(start, end, data), token)
                .await?;
            return Ok(StepOutcome::done(format!("Scrolled {}", data.direction)));
        }

        if let Some(chain) = chain {
            let direction = ScrollDirection::from(data.direction);
            let result = match self.fetch_tree(token).await {
                Ok(tree) => self.scroll_by_selector(chain, &tree, direction, token).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(hit) => {
                    return Ok(StepOutcome::via(
                        format!("Scrolled {} node #{}", direction.as_str(), hit.value),
                        &hit,
                    ));
                }
                Err(StepError::Cancelled) => return Err(StepError::Cancelled),
                Err(e) => self.log(format!("Scroll by selector failed ({}); swiping instead", e)),
            }
        }

        // Scrolling towards content further down means dragging the finger up.
        let (start, end) = gesture_path(self.screen(), opposite(data.direction));
        self.perform(self.swipe_action(start, end, data), token)
            .await?;
        Ok(StepOutcome {
            message: format!("Scrolled {} by swiping", data.direction),
            selector: None,
            fallback_used: chain.is_some(),
        })
    }

    async fn scroll_by_selector(
        &self,
        chain: &SelectorChain,
        tree: &[AccessibilityNode],
        direction: ScrollDirection,
        token: &CancellationToken,
    ) -> Result<FallbackHit<i64>, StepError> {
        with_selector_fallback(chain, async |selector: &ElementSelector| {
            let Some(index) = self.matcher.find_node(tree, selector).and_then(|n| n.index) else {
                return Ok(None);
            };
            self.perform(DeviceAction::Scroll { index, direction }, token)
                .await?;
            Ok(Some(index))
        })
        .await
    }

    fn swipe_action(&self, start: (i32, i32), end: (i32, i32), data: &SwipeData) -> DeviceAction {
        let duration_ms = if data.duration_ms > 0 {
            data.duration_ms
        } else {
            self.config.swipe_ms
        };
        DeviceAction::Swipe {
            start,
            end,
            duration_ms,
        }
    }

    async fn run_input(
        &self,
        chain: Option<&SelectorChain>,
        data: &InputTextData,
        token: &CancellationToken,
    ) -> Result<StepOutcome, StepError> {
        let Some(chain) = chain else {
            self.perform(
                DeviceAction::SetText {
                    index: None,
                    text: data.text.clone(),
                },
                token,
            )
            .await?;
            return Ok(StepOutcome::done("Typed into focused field"));
        };

        let tree = self.fetch_tree(token).await?;
        let result = with_selector_fallback(chain, async |selector: &ElementSelector| {
            let Some(node) = self.matcher.find_node(&tree, selector) else {
                return Ok(None);
            };
            let Some(focus) = focus_action(node) else {
                return Ok(None);
            };
            self.perform(focus, token).await?;
            self.perform(
                DeviceAction::SetText {
                    index: node.index,
                    text: input_text(node, data),
                },
                token,
            )
            .await?;
            Ok(Some(()))
        })
        .await;

        match result {
            Ok(hit) => Ok(StepOutcome::via("Typed into field", &hit)),
            Err(StepError::ElementNotFound(what)) => {
                let Some((index, selector, (x, y))) = bounds_fallback(chain) else {
                    return Err(StepError::ElementNotFound(what));
                };
                self.log(format!(
                    "No element matched {}; focusing recorded bounds centre ({}, {})",
                    what, x, y
                ));
                self.perform(DeviceAction::Tap { x, y }, token).await?;
                self.perform(
                    DeviceAction::SetText {
                        index: None,
                        text: data.text.clone(),
                    },
                    token,
                )
                .await?;
                Ok(StepOutcome {
                    message: "Typed into field at recorded bounds".to_string(),
                    selector: Some((selector.clone(), index)),
                    fallback_used: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Last observed root bounds, else the workflow's recorded screen, else
    /// the configured default.
    pub(crate) fn screen(&self) -> Bounds {
        (*self.last_screen.lock())
            .or(self.workflow_screen)
            .unwrap_or(self.config.default_screen)
    }
}

fn describe(action: &DeviceAction) -> String {
    match action {
        DeviceAction::Tap { x, y } | DeviceAction::LongPress { x, y, .. } => {
            format!("at ({}, {})", x, y)
        }
        DeviceAction::Click { index } | DeviceAction::LongClick { index } => {
            format!("node #{}", index)
        }
        other => other.endpoint().to_string(),
    }
}

fn focus_action(node: &AccessibilityNode) -> Option<DeviceAction> {
    match (node.parsed_bounds(), node.index) {
        (Some(bounds), _) => {
            let (x, y) = bounds.center();
            Some(DeviceAction::Tap { x, y })
        }
        (None, Some(index)) => Some(DeviceAction::Click { index }),
        (None, None) => None,
    }
}

/// Text to set: the new text, or appended to the field's current text when
/// the step keeps existing content.
fn input_text(node: &AccessibilityNode, data: &InputTextData) -> String {
    if data.clear_first || node.text.is_empty() {
        data.text.clone()
    } else {
        format!("{}{}", node.text, data.text)
    }
}

/// Centre of the chain's bounds selector, if it has a parsable one.
fn bounds_fallback(chain: &SelectorChain) -> Option<(usize, &ElementSelector, (i32, i32))> {
    let (index, selector) = chain.find_kind(SelectorKind::Bounds)?;
    let bounds = Bounds::parse(selector.value())?;
    Some((index, selector, bounds.center()))
}

fn opposite(direction: Direction) -> Direction {
    match direction {
        Direction::Up => Direction::Down,
        Direction::Down => Direction::Up,
        Direction::Left => Direction::Right,
        Direction::Right => Direction::Left,
    }
}

/// Finger path for a swipe in `direction`, covering the middle half of the
/// screen along that axis.
pub(crate) fn gesture_path(screen: Bounds, direction: Direction) -> ((i32, i32), (i32, i32)) {
    let (cx, cy) = screen.center();
    let near_top = quarter(screen.top, screen.height(), 1);
    let near_bottom = quarter(screen.top, screen.height(), 3);
    let near_left = quarter(screen.left, screen.width(), 1);
    let near_right = quarter(screen.left, screen.width(), 3);
    match direction {
        Direction::Up => ((cx, near_bottom), (cx, near_top)),
        Direction::Down => ((cx, near_top), (cx, near_bottom)),
        Direction::Left => ((near_right, cy), (near_left, cy)),
        Direction::Right => ((near_left, cy), (near_right, cy)),
    }
}

/// The point `quarters`/4 of the way along `span` from `start`.
fn quarter(start: i32, span: i64, quarters: i64) -> i32 {
    i32::try_from(i64::from(start) + span * quarters / 4).unwrap_or(start)
}
