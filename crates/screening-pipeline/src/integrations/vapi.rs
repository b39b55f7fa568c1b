use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ensure_success, transport_error};
use crate::config::IntegrationSettings;
use crate::workflows::screening::collaborators::{
    CallRequest, IntegrationError, PlacedCall, VoiceCallProvider,
};

const PROVIDER: &str = "vapi";
const DEFAULT_BASE_URL: &str = "https://api.vapi.ai";

/// Places outbound screening calls through the voice assistant API.
pub struct VapiCallProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    assistant_id: Option<String>,
    phone_number_id: Option<String>,
}

impl VapiCallProvider {
    pub fn new(client: Client, settings: &IntegrationSettings) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: settings.vapi_api_key.clone(),
            assistant_id: settings.vapi_assistant_id.clone(),
            phone_number_id: settings.vapi_phone_number_id.clone(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedCall {
    id: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[async_trait]
impl VoiceCallProvider for VapiCallProvider {
    async fn place_call(&self, request: &CallRequest) -> Result<PlacedCall, IntegrationError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| IntegrationError::not_configured(PROVIDER, "VAPI_API_KEY"))?;
        let assistant_id = self
            .assistant_id
            .as_deref()
            .ok_or_else(|| IntegrationError::not_configured(PROVIDER, "VAPI_ASSISTANT_ID"))?;
        let phone_number_id = self
            .phone_number_id
            .as_deref()
            .ok_or_else(|| IntegrationError::not_configured(PROVIDER, "VAPI_PHONE_NUMBER_ID"))?;

        let response = self
            .client
            .post(format!("{}/call", self.base_url))
            .bearer_auth(api_key)
            .json(&call_payload(assistant_id, phone_number_id, request))
            .send()
            .await
            .map_err(|err| transport_error(PROVIDER, err))?;
        let response = ensure_success(PROVIDER, "Vapi", response).await?;

        let created: CreatedCall = response
            .json()
            .await
            .map_err(|err| transport_error(PROVIDER, err))?;
        Ok(PlacedCall {
            call_id: created.id,
            created_at: created.created_at,
        })
    }
}

fn call_payload(assistant_id: &str, phone_number_id: &str, request: &CallRequest) -> Value {
    json!({
        "assistantId": assistant_id,
        "phoneNumberId": phone_number_id,
        "customer": { "number": request.phone },
        "assistantOverrides": {
            "variableValues": {
                "first_name": request.first_name,
                "full_name": request.full_name,
                "candidate_job_title": request.job_title,
                "company_name": request.company_name,
                "job_title": request.job_title,
                "chase_stage": request.call_number.to_string(),
                "candidate_id": request.candidate_id,
                "job_id": request.job_id,
                "call_type": request.call_type.label(),
                "email": request.email,
            }
        }
    })
}
