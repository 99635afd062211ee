use crate::protocol::{StatusResponse, decode_events};
use crate::{ControlSurface, DeviceAction, DeviceError, DeviceState, RecordedEvent, RecordingFeed};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Base URL of the on-device portal, e.g. `http://127.0.0.1:8080`.
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            // adb forward tcp:8080 tcp:8080
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP client for the device control surface.
pub struct DeviceClient {
    config: DeviceConfig,
    http: reqwest::Client,
}

impl DeviceClient {
    pub fn new(config: DeviceConfig) -> Result<Self, DeviceError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DeviceError::Setup(e.to_string()))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    async fn get(&self, endpoint: &str) -> Result<StatusResponse, DeviceError> {
        let request = self.http.get(self.url(endpoint));
        self.send(endpoint, request).await
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<StatusResponse, DeviceError> {
        debug!(endpoint, %body, "device request");
        let request = self.http.post(self.url(endpoint)).json(body);
        self.send(endpoint, request).await
    }

    /// Connection, timeout and body-read failures are transport errors; a
    /// non-2xx status or an error envelope is a rejection.
    async fn send(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<StatusResponse, DeviceError> {
        let response = request
            .send()
            .await
            .map_err(|e| DeviceError::transport(endpoint, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DeviceError::transport(endpoint, e))?;

        if !status.is_success() {
            warn!(endpoint, %status, "device request failed");
            let detail = serde_json::from_str::<StatusResponse>(&text)
                .ok()
                .and_then(|r| r.message)
                .unwrap_or(text);
            return Err(DeviceError::rejected(
                endpoint,
                format!("HTTP {}: {}", status, detail),
            ));
        }

        let parsed: StatusResponse =
            serde_json::from_str(&text).map_err(|e| DeviceError::decode(endpoint, e))?;
        parsed.into_result(endpoint)
    }
}

#[async_trait]
impl ControlSurface for DeviceClient {
    async fn ping(&self) -> Result<(), DeviceError> {
        self.get("/ping").await?;
        info!(base_url = %self.config.base_url, "device reachable");
        Ok(())
    }

    async fn fetch_state(&self) -> Result<DeviceState, DeviceError> {
        let response = self.get("/state").await?;
        let data = response
            .data
            .ok_or_else(|| DeviceError::decode("/state", "response has no data"))?;
        let state = DeviceState::from_data(&data)?;
        debug!(roots = state.a11y_tree.len(), "fetched device state");
        Ok(state)
    }

    async fn perform(&self, action: &DeviceAction) -> Result<(), DeviceError> {
        self.post(action.endpoint(), &action.body()).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordingFeed for DeviceClient {
    async fn recorded_events(&self, since: Option<u64>) -> Result<Vec<RecordedEvent>, DeviceError> {
        const ENDPOINT: &str = "/recording/events";
        let endpoint = match since {
            Some(id) => format!("{}?since={}", ENDPOINT, id),
            None => ENDPOINT.to_string(),
        };
        let response = self.get(&endpoint).await?;
        decode_events(response, ENDPOINT)
    }
}
