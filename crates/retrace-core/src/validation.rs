use crate::{Action, ActionKind, SelectorKind, Workflow, WorkflowStep};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{0} selector has an empty value")]
    EmptySelectorValue(SelectorKind),

    #[error("selector confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f32),

    #[error("selector chain has no selectors")]
    EmptyChain,

    #[error("unknown action kind '{0}'")]
    UnknownAction(String),

    #[error("malformed step: {0}")]
    Malformed(String),

    #[error("{0} step is missing its payload")]
    MissingPayload(ActionKind),

    #[error("{action} step carries a {found} payload")]
    PayloadMismatch {
        action: ActionKind,
        found: &'static str,
    },

    #[error("step '{0}' needs a selector or explicit coordinates")]
    MissingTarget(String),

    #[error("step '{0}' has only some of its coordinates")]
    IncompleteCoordinates(String),

    #[error("input step '{0}' has no text")]
    EmptyText(String),

    #[error("duplicate step id {0}")]
    DuplicateStepId(Uuid),

    #[error("step at position {position} has order {order}")]
    OrderMismatch { position: usize, order: usize },

    #[error("step position {index} is out of range (workflow has {len} steps)")]
    StepOutOfRange { index: usize, len: usize },
}

/// Structural checks on a whole workflow.
///
/// Individual step problems are not reported here: a bad step fails on its
/// own at replay time without rejecting the rest of the workflow.
pub fn validate_workflow(workflow: &Workflow) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for (position, step) in workflow.steps().iter().enumerate() {
        if !seen.insert(step.id) {
            return Err(ValidationError::DuplicateStepId(step.id));
        }
        if step.order() != position {
            return Err(ValidationError::OrderMismatch {
                position,
                order: step.order(),
            });
        }
    }
    Ok(())
}

/// Checks that a step carries everything its action needs before dispatch.
pub fn validate_step(step: &WorkflowStep) -> Result<(), ValidationError> {
    let label = || {
        if step.name.is_empty() {
            format!("#{}", step.order())
        } else {
            step.name.clone()
        }
    };

    match &step.action {
        Action::Tap(data) | Action::LongTap(data) => {
            if data.x.is_some() != data.y.is_some() {
                return Err(ValidationError::IncompleteCoordinates(label()));
            }
            if data.point().is_none() && step.selector.is_none() {
                return Err(ValidationError::MissingTarget(label()));
            }
        }
        Action::Swipe(data) | Action::Scroll(data) => {
            let given = [data.start_x, data.start_y, data.end_x, data.end_y]
                .iter()
                .filter(|c| c.is_some())
                .count();
            if given != 0 && given != 4 {
                return Err(ValidationError::IncompleteCoordinates(label()));
            }
        }
        Action::InputText(data) => {
            if data.text.is_empty() {
                return Err(ValidationError::EmptyText(label()));
            }
        }
        Action::Wait(_) => {}
        Action::Invalid(invalid) => return Err(invalid.error.clone()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InputTextData, SwipeData, TapData, WaitData};

    #[test]
    fn tap_without_target_is_rejected() {
        let step = WorkflowStep::new(Action::Tap(TapData::default()), None).named("Login");
        assert_eq!(
            validate_step(&step),
            Err(ValidationError::MissingTarget("Login".to_string()))
        );
    }

    #[test]
    fn tap_with_coordinates_is_valid() {
        let step = WorkflowStep::new(Action::Tap(TapData::at(10, 20)), None);
        assert!(validate_step(&step).is_ok());
    }

    #[test]
    fn half_coordinates_are_rejected() {
        let step = WorkflowStep::new(
            Action::Tap(TapData {
                x: Some(3),
                ..TapData::default()
            }),
            None,
        );
        assert!(matches!(
            validate_step(&step),
            Err(ValidationError::IncompleteCoordinates(_))
        ));

        let swipe = WorkflowStep::new(
            Action::Swipe(SwipeData {
                start_x: Some(1),
                ..SwipeData::default()
            }),
            None,
        );
        assert!(matches!(
            validate_step(&swipe),
            Err(ValidationError::IncompleteCoordinates(_))
        ));
    }

    #[test]
    fn empty_input_text_is_rejected() {
        let step = WorkflowStep::new(
            Action::InputText(InputTextData {
                text: String::new(),
                clear_first: true,
            }),
            None,
        );
        assert!(matches!(
            validate_step(&step),
            Err(ValidationError::EmptyText(_))
        ));
    }

    #[test]
    fn wait_is_always_valid() {
        let step = WorkflowStep::new(Action::Wait(WaitData::for_ms(100)), None);
        assert!(validate_step(&step).is_ok());
    }

    #[test]
    fn undecodable_step_reports_its_load_error() {
        let step: WorkflowStep =
            serde_json::from_value(serde_json::json!({"action": "pinch"})).unwrap();
        assert_eq!(
            validate_step(&step),
            Err(ValidationError::UnknownAction("pinch".to_string()))
        );
    }

    #[test]
    fn workflow_with_dense_order_passes() {
        let mut wf = Workflow::new("w");
        wf.push_step(WorkflowStep::new(Action::Wait(WaitData::for_ms(1)), None));
        wf.push_step(WorkflowStep::new(Action::Wait(WaitData::for_ms(1)), None));
        assert!(validate_workflow(&wf).is_ok());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut wf = Workflow::new("w");
        let step = WorkflowStep::new(Action::Wait(WaitData::for_ms(1)), None);
        wf.push_step(step.clone());
        wf.push_step(step);
        assert!(matches!(
            validate_workflow(&wf),
            Err(ValidationError::DuplicateStepId(_))
        ));
    }
}
