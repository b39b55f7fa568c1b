use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{CallType, RawCandidate};

/// Origin of the open job requests a run works through.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RawCandidate>, SourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("{0} not configured")]
    NotConfigured(&'static str),
    #[error("candidate fetch failed: {0}")]
    Transport(String),
    #[error("candidate report malformed: {0}")]
    Format(String),
    #[error("candidate export unreadable: {0}")]
    Io(#[from] std::io::Error),
    #[error("candidate export malformed: {0}")]
    Csv(#[from] csv::Error),
}

/// Variables handed to the voice assistant for one outbound call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRequest {
    pub phone: String,
    pub first_name: String,
    pub full_name: String,
    pub job_title: String,
    pub company_name: String,
    pub candidate_id: String,
    pub job_id: String,
    pub call_type: CallType,
    pub call_number: u32,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedCall {
    pub call_id: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait VoiceCallProvider: Send + Sync {
    async fn place_call(&self, request: &CallRequest) -> Result<PlacedCall, IntegrationError>;
}

/// Template message sent after a first-contact call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreeningMessage {
    pub phone: String,
    pub first_name: String,
    pub company_name: String,
    pub job_title: String,
}

#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn send_template(&self, message: &ScreeningMessage) -> Result<(), IntegrationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmContact {
    pub email: String,
    pub job_title: String,
    pub company_name: String,
}

#[async_trait]
pub trait CrmSync: Send + Sync {
    async fn sync_contact(&self, contact: &CrmContact) -> Result<(), IntegrationError>;
}

#[async_trait]
pub trait AnalyticsTracker: Send + Sync {
    async fn track_called(&self, email: &str) -> Result<(), IntegrationError>;
}

#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify(&self, alert: &AlertMessage) -> Result<(), IntegrationError>;
}

/// Failure reported by an outbound provider. Never fatal to a run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{provider}: {message}")]
pub struct IntegrationError {
    pub provider: &'static str,
    pub message: String,
}

impl IntegrationError {
    pub fn new(provider: &'static str, message: impl Into<String>) -> Self {
        Self {
            provider,
            message: message.into(),
        }
    }

    pub fn not_configured(provider: &'static str, setting: &str) -> Self {
        Self::new(provider, format!("{setting} not configured"))
    }
}

/// Operator notifications raised by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertMessage {
    RunStarted,
    RunCompleted { total_called: usize, total_errors: usize },
    CallFailed { candidate_name: String, error: String },
    FetchFailed { error: String },
}

impl AlertMessage {
    pub fn render(&self) -> String {
        match self {
            AlertMessage::RunStarted => "<!here> UK Screening Call run starting".to_string(),
            AlertMessage::RunCompleted {
                total_called,
                total_errors,
            } => {
                let mut text = format!(
                    "<!here> UK Screening Call run completed\n\n:tada: *Daily Voice Campaign Complete*\n:phone: *Calls made:* {total_called}"
                );
                if *total_errors > 0 {
                    text.push_str(&format!("\n:warning: *Errors:* {total_errors}"));
                }
                text
            }
            AlertMessage::CallFailed {
                candidate_name,
                error,
            } => format!("<!here> UK Vapi Error for {candidate_name}: {error}"),
            AlertMessage::FetchFailed { error } => format!("UK Screening fetch failed: {error}"),
        }
    }
}

/// Source of "now" for a run.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Waits between successive outbound calls.
#[async_trait]
pub trait CallPacer: Send + Sync {
    async fn pause(&self, interval: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioPacer;

#[async_trait]
impl CallPacer for TokioPacer {
    async fn pause(&self, interval: Duration) {
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_alert_mentions_errors_only_when_present() {
        let clean = AlertMessage::RunCompleted {
            total_called: 4,
            total_errors: 0,
        }
        .render();
        assert!(clean.contains("*Calls made:* 4"));
        assert!(!clean.contains("Errors"));

        let noisy = AlertMessage::RunCompleted {
            total_called: 2,
            total_errors: 1,
        }
        .render();
        assert!(noisy.ends_with(":warning: *Errors:* 1"));
    }

    #[test]
    fn call_failure_alert_names_the_candidate() {
        let text = AlertMessage::CallFailed {
            candidate_name: "Ada Lovelace".to_string(),
            error: "Vapi 500: boom".to_string(),
        }
        .render();
        assert_eq!(text, "<!here> UK Vapi Error for Ada Lovelace: Vapi 500: boom");
    }

    #[test]
    fn not_configured_errors_name_the_setting() {
        let err = IntegrationError::not_configured("vapi", "VAPI_API_KEY");
        assert_eq!(err.to_string(), "vapi: VAPI_API_KEY not configured");
    }
}
