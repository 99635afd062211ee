use crate::a11y::simple_class_name;
use crate::{Action, ElementSnapshot, SelectorChain, SelectorKind, WorkflowStep};

#[derive(Debug, Clone)]
pub struct NamerConfig {
    /// Element descriptions longer than this are cut and end with `…`.
    pub max_label_len: usize,
}

impl Default for NamerConfig {
    fn default() -> Self {
        Self { max_label_len: 30 }
    }
}

/// Derives short human-readable step labels such as `Tap "Login"`.
#[derive(Debug, Clone, Default)]
pub struct StepNamer {
    config: NamerConfig,
}

impl StepNamer {
    pub fn new(config: NamerConfig) -> Self {
        Self { config }
    }

    /// Label for an action performed on a captured element.
    pub fn label(&self, action: &Action, element: Option<&ElementSnapshot>) -> String {
        let target = element.and_then(|e| self.describe_element(e));
        self.compose(action, target)
    }

    /// Label for an existing step, described from its selector chain.
    /// Keeps an explicit step name when one is set.
    pub fn label_for_step(&self, step: &WorkflowStep) -> String {
        if !step.name.trim().is_empty() {
            return step.name.clone();
        }
        let target = step
            .selector
            .as_ref()
            .and_then(|chain| self.describe_chain(chain));
        self.compose(&step.action, target)
    }

    fn compose(&self, action: &Action, target: Option<String>) -> String {
        let on = |verb: &str| match &target {
            Some(t) => format!("{} \"{}\"", verb, t),
            None => verb.to_string(),
        };
        match action {
            Action::Tap(data) => match (&target, data.point()) {
                (None, Some((x, y))) => format!("Tap at ({}, {})", x, y),
                _ => on("Tap"),
            },
            Action::LongTap(data) => match (&target, data.point()) {
                (None, Some((x, y))) => format!("Long tap at ({}, {})", x, y),
                _ => on("Long tap"),
            },
            Action::Swipe(data) => format!("Swipe {}", data.direction),
            Action::Scroll(data) => match &target {
                Some(t) => format!("Scroll {} in \"{}\"", data.direction, t),
                None => format!("Scroll {}", data.direction),
            },
            Action::InputText(data) => {
                let text = self.truncate(&data.text);
                match &target {
                    Some(t) => format!("Type \"{}\" into \"{}\"", text, t),
                    None => format!("Type \"{}\"", text),
                }
            }
            Action::Wait(data) => match &target {
                Some(t) if data.wait_for_element => format!("Wait for \"{}\"", t),
                _ => format!("Wait {} ms", data.duration_ms),
            },
            Action::Invalid(invalid) if invalid.action.is_empty() => "Invalid step".to_string(),
            Action::Invalid(invalid) => format!("Invalid {} step", self.truncate(&invalid.action)),
        }
    }

    /// Most readable attribute first: text, description, id, then class.
    fn describe_element(&self, element: &ElementSnapshot) -> Option<String> {
        let described = element
            .text
            .as_deref()
            .or(element.content_desc.as_deref())
            .map(|s| s.trim().to_string())
            .or_else(|| element.resource_id.as_deref().map(humanize_id))
            .or_else(|| {
                element
                    .class_name
                    .as_deref()
                    .map(|c| simple_class_name(c).to_string())
            })?;
        (!described.is_empty()).then(|| self.truncate(&described))
    }

    fn describe_chain(&self, chain: &SelectorChain) -> Option<String> {
        let value = |kind| chain.find_kind(kind).map(|(_, s)| s.value());
        let described = value(SelectorKind::Text)
            .or_else(|| value(SelectorKind::ContentDesc))
            .map(|s| s.trim().to_string())
            .or_else(|| value(SelectorKind::ResourceId).map(humanize_id))?;
        (!described.is_empty()).then(|| self.truncate(&described))
    }

    fn truncate(&self, s: &str) -> String {
        let max = self.config.max_label_len.max(1);
        if s.chars().count() <= max {
            return s.to_string();
        }
        let mut cut: String = s.chars().take(max - 1).collect();
        cut.push('…');
        cut
    }
}

/// `com.app:id/btn_login` -> `btn login`
fn humanize_id(id: &str) -> String {
    let tail = id.rsplit('/').next().unwrap_or(id);
    tail.replace(['_', '-'], " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Direction, ElementSelector, InputTextData, SwipeData, TapData, WaitData};

    fn tap() -> Action {
        Action::Tap(TapData::default())
    }

    #[test]
    fn prefers_text_over_other_attributes() {
        let element = ElementSnapshot {
            text: Some("Login".into()),
            content_desc: Some("Sign in button".into()),
            resource_id: Some("com.app:id/btn_login".into()),
            ..Default::default()
        };
        assert_eq!(StepNamer::default().label(&tap(), Some(&element)), "Tap \"Login\"");
    }

    #[test]
    fn falls_back_to_humanized_id_then_class() {
        let namer = StepNamer::default();
        let by_id = ElementSnapshot {
            resource_id: Some("com.app:id/btn_login".into()),
            class_name: Some("android.widget.Button".into()),
            ..Default::default()
        };
        assert_eq!(namer.label(&tap(), Some(&by_id)), "Tap \"btn login\"");

        let by_class = ElementSnapshot {
            class_name: Some("android.widget.ImageButton".into()),
            ..Default::default()
        };
        assert_eq!(
            namer.label(&Action::LongTap(TapData::default()), Some(&by_class)),
            "Long tap \"ImageButton\""
        );
    }

    #[test]
    fn undecodable_steps_name_their_action() {
        let step: crate::WorkflowStep =
            serde_json::from_value(serde_json::json!({"action": "pinch"})).unwrap();
        assert_eq!(StepNamer::default().label(&step.action, None), "Invalid pinch step");
    }

    #[test]
    fn coordinate_taps_and_gestures() {
        let namer = StepNamer::default();
        assert_eq!(
            namer.label(&Action::Tap(TapData::at(10, 20)), None),
            "Tap at (10, 20)"
        );
        assert_eq!(
            namer.label(&Action::Swipe(SwipeData::towards(Direction::Left)), None),
            "Swipe left"
        );
        assert_eq!(
            namer.label(&Action::Wait(WaitData::for_ms(500)), None),
            "Wait 500 ms"
        );
    }

    #[test]
    fn long_descriptions_are_truncated() {
        let namer = StepNamer::new(NamerConfig { max_label_len: 8 });
        let element = ElementSnapshot {
            content_desc: Some("Open the navigation drawer".into()),
            ..Default::default()
        };
        let action = Action::InputText(InputTextData {
            text: "hello".into(),
            clear_first: true,
        });
        assert_eq!(
            namer.label(&action, Some(&element)),
            "Type \"hello\" into \"Open th…\""
        );
    }

    #[test]
    fn step_label_uses_chain_or_explicit_name() {
        let namer = StepNamer::default();
        let chain = SelectorChain::new(vec![
            ElementSelector::with_default_confidence(SelectorKind::ResourceId, "com.app:id/save")
                .unwrap(),
            ElementSelector::with_default_confidence(SelectorKind::Text, "Save").unwrap(),
        ])
        .unwrap();
        let step = WorkflowStep::new(tap(), Some(chain));
        assert_eq!(namer.label_for_step(&step), "Tap \"Save\"");
        assert_eq!(namer.label_for_step(&step.named("Persist")), "Persist");
    }
}
