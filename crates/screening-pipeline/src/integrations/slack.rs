use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::transport_error;
use crate::config::IntegrationSettings;
use crate::workflows::screening::collaborators::{AlertMessage, AlertNotifier, IntegrationError};

const PROVIDER: &str = "slack";
const POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

/// Posts run alerts to the operations channel.
pub struct SlackNotifier {
    client: Client,
    bot_token: Option<String>,
    channel_id: Option<String>,
}

impl SlackNotifier {
    pub fn new(client: Client, settings: &IntegrationSettings) -> Self {
        Self {
            client,
            bot_token: settings.slack_bot_token.clone(),
            channel_id: settings.slack_channel_id.clone(),
        }
    }
}

/// Slack answers 200 even on failure; `ok` carries the outcome.
#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl AlertNotifier for SlackNotifier {
    async fn notify(&self, alert: &AlertMessage) -> Result<(), IntegrationError> {
        let token = self
            .bot_token
            .as_deref()
            .ok_or_else(|| IntegrationError::not_configured(PROVIDER, "SLACK_BOT_TOKEN"))?;
        let channel = self
            .channel_id
            .as_deref()
            .ok_or_else(|| IntegrationError::not_configured(PROVIDER, "SLACK_CHANNEL_ID"))?;

        let outcome: PostMessageResponse = self
            .client
            .post(POST_MESSAGE_URL)
            .bearer_auth(token)
            .json(&json!({ "channel": channel, "text": alert.render() }))
            .send()
            .await
            .map_err(|err| transport_error(PROVIDER, err))?
            .json()
            .await
            .map_err(|err| transport_error(PROVIDER, err))?;

        if outcome.ok {
            Ok(())
        } else {
            Err(IntegrationError::new(
                PROVIDER,
                format!(
                    "Slack error: {}",
                    outcome.error.unwrap_or_else(|| "unknown".to_string())
                ),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refuses_without_bot_token() {
        let notifier = SlackNotifier::new(Client::new(), &IntegrationSettings::default());
        let err = notifier.notify(&AlertMessage::RunStarted).await.unwrap_err();
        assert_eq!(err.to_string(), "slack: SLACK_BOT_TOKEN not configured");
    }
}
