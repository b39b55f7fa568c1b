use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use super::{ensure_success, transport_error};
use crate::config::IntegrationSettings;
use crate::workflows::screening::collaborators::{CrmContact, CrmSync, IntegrationError};

const PROVIDER: &str = "activecampaign";
const JOB_TITLE_FIELD: &str = "755";
const COMPANY_FIELD: &str = "756";
const DEFAULT_LIST_ID: &str = "365";
const SUBSCRIBED: u8 = 1;

/// Upserts the contact with the job they were called about, then subscribes them to the
/// screening list.
pub struct ActiveCampaignSync {
    client: Client,
    api_url: Option<String>,
    api_key: Option<String>,
    list_id: String,
}

impl ActiveCampaignSync {
    pub fn new(client: Client, settings: &IntegrationSettings) -> Self {
        Self {
            client,
            api_url: settings
                .activecampaign_api_url
                .as_deref()
                .map(|url| url.trim_end_matches('/').to_string()),
            api_key: settings.activecampaign_api_key.clone(),
            list_id: settings
                .activecampaign_list_id
                .clone()
                .unwrap_or_else(|| DEFAULT_LIST_ID.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SyncResponse {
    contact: Option<SyncedContact>,
}

#[derive(Debug, Deserialize)]
struct SyncedContact {
    id: Value,
}

#[async_trait]
impl CrmSync for ActiveCampaignSync {
    async fn sync_contact(&self, contact: &CrmContact) -> Result<(), IntegrationError> {
        let (Some(api_url), Some(api_key)) = (self.api_url.as_deref(), self.api_key.as_deref())
        else {
            return Err(IntegrationError::not_configured(
                PROVIDER,
                "ACTIVECAMPAIGN_API_URL/ACTIVECAMPAIGN_API_KEY",
            ));
        };

        let response = self
            .client
            .post(format!("{api_url}/api/3/contact/sync"))
            .header("Api-Token", api_key)
            .json(&contact_payload(contact))
            .send()
            .await
            .map_err(|err| transport_error(PROVIDER, err))?;
        let synced: SyncResponse = ensure_success(PROVIDER, "AC sync", response)
            .await?
            .json()
            .await
            .map_err(|err| transport_error(PROVIDER, err))?;

        let contact_id = synced
            .contact
            .map(|contact| contact.id)
            .filter(|id| !id.is_null())
            .ok_or_else(|| IntegrationError::new(PROVIDER, "No contact ID returned"))?;

        let list = self
            .client
            .post(format!("{api_url}/api/3/contactLists"))
            .header("Api-Token", api_key)
            .json(&json!({
                "contactList": {
                    "list": self.list_id,
                    "contact": contact_id,
                    "status": SUBSCRIBED,
                }
            }))
            .send()
            .await;
        match list {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => warn!(status = %response.status(), "list subscription rejected"),
            Err(err) => warn!(error = %err, "list subscription failed"),
        }

        Ok(())
    }
}

fn contact_payload(contact: &CrmContact) -> Value {
    json!({
        "contact": {
            "email": contact.email,
            "fieldValues": [
                { "field": JOB_TITLE_FIELD, "value": contact.job_title },
                { "field": COMPANY_FIELD, "value": contact.company_name },
            ]
        }
    })
}
