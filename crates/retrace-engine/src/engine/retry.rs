use super::{ReplayEngine, StepError};
use retrace_core::{AccessibilityNode, a11y};
use retrace_device::{ControlSurface, DeviceAction, DeviceError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

impl<D: ControlSurface> ReplayEngine<D> {
    /// Run a device call, retrying transport failures up to
    /// `max_attempts` with a fixed delay. Rejections surface immediately.
    pub(crate) async fn with_retry<T, F, Fut>(
        &self,
        what: &str,
        token: &CancellationToken,
        mut call: F,
    ) -> Result<T, StepError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DeviceError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            if token.is_cancelled() {
                return Err(StepError::Cancelled);
            }
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    self.log(format!(
                        "{} failed (attempt {}/{}): {}. Retrying...",
                        what, attempt, max_attempts, e
                    ));
                    self.sleep(self.config.retry_delay, token).await?;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub(crate) async fn perform(
        &self,
        action: DeviceAction,
        token: &CancellationToken,
    ) -> Result<(), StepError> {
        debug!(endpoint = action.endpoint(), body = %action.body(), "performing device action");
        self.with_retry(action.endpoint(), token, || self.device.perform(&action))
            .await
    }

    /// Fetch the live tree and remember its root bounds as the screen.
    pub(crate) async fn fetch_tree(
        &self,
        token: &CancellationToken,
    ) -> Result<Vec<AccessibilityNode>, StepError> {
        let state = self
            .with_retry("/state", token, || self.device.fetch_state())
            .await?;
        if let Some(screen) = a11y::screen_bounds(&state.a11y_tree) {
            *self.last_screen.lock() = Some(screen);
        }
        Ok(state.a11y_tree)
    }

    /// Sleep that ends early with [`StepError::Cancelled`].
    pub(crate) async fn sleep(
        &self,
        duration: Duration,
        token: &CancellationToken,
    ) -> Result<(), StepError> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(StepError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
