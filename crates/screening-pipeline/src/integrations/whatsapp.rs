use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use super::{ensure_success, transport_error};
use crate::config::IntegrationSettings;
use crate::workflows::screening::collaborators::{
    IntegrationError, MessagingProvider, ScreeningMessage,
};

const PROVIDER: &str = "whatsapp";
const DEFAULT_BASE_URL: &str = "https://graph.facebook.com/v21.0";
const DEFAULT_TEMPLATE: &str = "screening_request";
const TEMPLATE_LANGUAGE: &str = "en";

/// Sends the screening template after a first-contact call.
pub struct WhatsAppMessenger {
    client: Client,
    base_url: String,
    access_token: Option<String>,
    phone_number_id: Option<String>,
    template_name: String,
}

impl WhatsAppMessenger {
    pub fn new(client: Client, settings: &IntegrationSettings) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            access_token: settings.whatsapp_access_token.clone(),
            phone_number_id: settings.whatsapp_phone_number_id.clone(),
            template_name: settings
                .whatsapp_template_name
                .clone()
                .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl MessagingProvider for WhatsAppMessenger {
    async fn send_template(&self, message: &ScreeningMessage) -> Result<(), IntegrationError> {
        let token = self
            .access_token
            .as_deref()
            .ok_or_else(|| IntegrationError::not_configured(PROVIDER, "WHATSAPP_ACCESS_TOKEN"))?;
        let phone_number_id = self.phone_number_id.as_deref().ok_or_else(|| {
            IntegrationError::not_configured(PROVIDER, "WHATSAPP_PHONE_NUMBER_ID")
        })?;

        let response = self
            .client
            .post(format!("{}/{phone_number_id}/messages", self.base_url))
            .bearer_auth(token)
            .json(&template_payload(&self.template_name, message))
            .send()
            .await
            .map_err(|err| transport_error(PROVIDER, err))?;
        ensure_success(PROVIDER, "WhatsApp", response).await?;

        debug!(template = %self.template_name, "screening template sent");
        Ok(())
    }
}

fn template_payload(template_name: &str, message: &ScreeningMessage) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "to": message.phone.replace('+', ""),
        "type": "template",
        "template": {
            "name": template_name,
            "language": { "code": TEMPLATE_LANGUAGE },
            "components": [{
                "type": "body",
                "parameters": [
                    { "type": "text", "text": message.first_name },
                    { "type": "text", "text": message.company_name },
                    { "type": "text", "text": message.job_title },
                ]
            }]
        }
    })
}
