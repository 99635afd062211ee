use super::StepError;
use retrace_core::{ElementSelector, SelectorChain};
use tracing::debug;

/// The selector an action finally went through.
#[derive(Debug)]
pub(crate) struct FallbackHit<T> {
    pub value: T,
    pub selector: ElementSelector,
    pub index: usize,
}

impl<T> FallbackHit<T> {
    pub fn fallback_used(&self) -> bool {
        self.index > 0
    }
}

/// Try `attempt` with each selector of the chain in order until one
/// reports success with `Ok(Some(_))`.
///
/// `Ok(None)` (nothing matched) and errors both move on to the next
/// selector; cancellation stops at once. When the chain is exhausted the
/// last error is returned, or `ElementNotFound` if no selector got as far
/// as an error.
pub(crate) async fn with_selector_fallback<T>(
    chain: &SelectorChain,
    mut attempt: impl AsyncFnMut(&ElementSelector) -> Result<Option<T>, StepError>,
) -> Result<FallbackHit<T>, StepError> {
    let mut last_error = None;
    for (index, selector) in chain.iter().enumerate() {
        match attempt(selector).await {
            Ok(Some(value)) => {
                if index > 0 {
                    debug!(selector = %selector, index, "fallback selector succeeded");
                }
                return Ok(FallbackHit {
                    value,
                    selector: selector.clone(),
                    index,
                });
            }
            Ok(None) => debug!(selector = %selector, "selector found nothing"),
            Err(StepError::Cancelled) => return Err(StepError::Cancelled),
            Err(e) => {
                debug!(selector = %selector, error = %e, "selector attempt failed");
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| StepError::ElementNotFound(chain.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrace_core::SelectorKind;
    use retrace_device::DeviceError;

    fn chain() -> SelectorChain {
        SelectorChain::new(vec![
            ElementSelector::with_default_confidence(SelectorKind::ResourceId, "a").unwrap(),
            ElementSelector::with_default_confidence(SelectorKind::Text, "b").unwrap(),
            ElementSelector::with_default_confidence(SelectorKind::ContentDesc, "c").unwrap(),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let mut tried = Vec::new();
        let hit = with_selector_fallback(&chain(), async |s: &ElementSelector| {
            tried.push(s.value().to_string());
            Ok((s.value() == "b").then_some(42))
        })
        .await
        .unwrap();
        assert_eq!(hit.value, 42);
        assert_eq!(hit.index, 1);
        assert!(hit.fallback_used());
        assert_eq!(tried, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn errors_move_on_to_next_selector() {
        let hit = with_selector_fallback(&chain(), async |s: &ElementSelector| {
            if s.value() == "a" {
                Err(StepError::Device(DeviceError::rejected("/action/tap", "nope")))
            } else {
                Ok(Some(()))
            }
        })
        .await
        .unwrap();
        assert_eq!(hit.index, 1);
    }

    #[tokio::test]
    async fn exhausted_chain_reports_last_error_or_not_found() {
        let err = with_selector_fallback(&chain(), async |_: &ElementSelector| {
            Ok::<Option<()>, StepError>(None)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, StepError::ElementNotFound(_)));

        let err = with_selector_fallback(&chain(), async |s: &ElementSelector| {
            if s.value() == "b" {
                Err(StepError::Device(DeviceError::rejected("/action/click", "gone")))
            } else {
                Ok::<Option<()>, StepError>(None)
            }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, StepError::Device(_)));
    }

    #[tokio::test]
    async fn cancellation_short_circuits() {
        let mut calls = 0;
        let err = with_selector_fallback(&chain(), async |_: &ElementSelector| {
            calls += 1;
            Err::<Option<()>, StepError>(StepError::Cancelled)
        })
        .await
        .unwrap_err();
        assert_eq!(err, StepError::Cancelled);
        assert_eq!(calls, 1);
    }
}
