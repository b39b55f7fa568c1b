use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::IntegrationSettings;
use crate::workflows::screening::collaborators::{CandidateSource, SourceError};
use crate::workflows::screening::domain::RawCandidate;

/// Reads open job requests from a saved JSON report in the reporting service.
pub struct TrevorReportSource {
    client: Client,
    report_url: Option<String>,
}

impl TrevorReportSource {
    pub fn new(client: Client, settings: &IntegrationSettings) -> Self {
        Self {
            client,
            report_url: settings.trevor_report_url.clone(),
        }
    }
}

#[async_trait]
impl CandidateSource for TrevorReportSource {
    async fn fetch(&self) -> Result<Vec<RawCandidate>, SourceError> {
        let url = self
            .report_url
            .as_deref()
            .ok_or(SourceError::NotConfigured("TREVOR_REPORT_URL"))?;

        debug!("requesting candidate report");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| SourceError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Transport(format!(
                "report returned {}",
                status
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|err| SourceError::Format(err.to_string()))?;
        let candidates = parse_report(payload)?;
        info!(records = candidates.len(), "candidate report fetched");
        Ok(candidates)
    }
}

#[derive(Debug, Deserialize)]
struct Report {
    headings: Vec<Heading>,
    rows: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct Heading {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Row {
    #[serde(default)]
    cells: Vec<Value>,
}

/// Decode a `{headings, rows}` report, unwrapping the `{data: "<json>"}` envelope when
/// present. Missing trailing cells become null.
pub fn parse_report(payload: Value) -> Result<Vec<RawCandidate>, SourceError> {
    let payload = match payload.get("data") {
        Some(Value::String(inner)) => {
            serde_json::from_str(inner).map_err(|err| SourceError::Format(err.to_string()))?
        }
        _ => payload,
    };
    let report: Report =
        serde_json::from_value(payload).map_err(|err| SourceError::Format(err.to_string()))?;

    report
        .rows
        .into_iter()
        .map(|row| {
            let record: Map<String, Value> = report
                .headings
                .iter()
                .enumerate()
                .map(|(index, heading)| {
                    let cell = row.cells.get(index).cloned().unwrap_or(Value::Null);
                    (heading.name.clone(), cell)
                })
                .collect();
            serde_json::from_value(Value::Object(record))
                .map_err(|err| SourceError::Format(err.to_string()))
        })
        .collect()
}
