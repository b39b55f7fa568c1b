//! HTTP and file adapters for the collaborators the screening pipeline drives.
//!
//! Every adapter is constructed from [`IntegrationSettings`](crate::config::IntegrationSettings)
//! and reports a "not configured" [`IntegrationError`] at call time when its credentials are
//! missing, so a partially configured deployment still prepares runs.

use std::time::Duration;

use reqwest::{Client, Response};

use crate::workflows::screening::collaborators::IntegrationError;

pub mod activecampaign;
pub mod csv_export;
pub mod heap;
pub mod slack;
pub mod trevor;
pub mod vapi;
pub mod whatsapp;

pub use activecampaign::ActiveCampaignSync;
pub use csv_export::CsvCandidateSource;
pub use heap::HeapTracker;
pub use slack::SlackNotifier;
pub use trevor::TrevorReportSource;
pub use vapi::VapiCallProvider;
pub use whatsapp::WhatsAppMessenger;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared client for every provider adapter.
pub fn http_client() -> Result<Client, reqwest::Error> {
    Client::builder().timeout(REQUEST_TIMEOUT).build()
}

/// Turn a non-2xx response into `"{label} {status}: {body}"`.
pub(crate) async fn ensure_success(
    provider: &'static str,
    label: &str,
    response: Response,
) -> Result<Response, IntegrationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(IntegrationError::new(
        provider,
        format!("{label} {}: {body}", status.as_u16()),
    ))
}

pub(crate) fn transport_error(provider: &'static str, err: reqwest::Error) -> IntegrationError {
    IntegrationError::new(provider, err.to_string())
}
