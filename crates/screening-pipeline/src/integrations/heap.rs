use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{ensure_success, transport_error};
use crate::config::IntegrationSettings;
use crate::workflows::screening::collaborators::{AnalyticsTracker, IntegrationError};

const PROVIDER: &str = "heap";
const TRACK_URL: &str = "https://heapanalytics.com/api/track";
const CALLED_EVENT: &str = "Called by Oscar";
const EVENT_SOURCE: &str = "UK Screening web_app";

/// Server-side analytics event recording that a candidate was called.
pub struct HeapTracker {
    client: Client,
    track_url: String,
    app_id: Option<String>,
}

impl HeapTracker {
    pub fn new(client: Client, settings: &IntegrationSettings) -> Self {
        Self {
            client,
            track_url: TRACK_URL.to_string(),
            app_id: settings.heap_app_id.clone(),
        }
    }

    pub fn with_track_url(mut self, track_url: impl Into<String>) -> Self {
        self.track_url = track_url.into();
        self
    }
}

#[async_trait]
impl AnalyticsTracker for HeapTracker {
    async fn track_called(&self, email: &str) -> Result<(), IntegrationError> {
        let app_id = self
            .app_id
            .as_deref()
            .ok_or_else(|| IntegrationError::not_configured(PROVIDER, "HEAP_APP_ID"))?;

        let response = self
            .client
            .post(&self.track_url)
            .json(&called_event(app_id, email))
            .send()
            .await
            .map_err(|err| transport_error(PROVIDER, err))?;
        ensure_success(PROVIDER, "Heap", response).await?;
        Ok(())
    }
}

fn called_event(app_id: &str, email: &str) -> Value {
    json!({
        "app_id": app_id,
        "identity": email,
        "event": CALLED_EVENT,
        "properties": { "source": EVENT_SOURCE },
    })
}
