use serde::{Deserialize, Serialize};

use super::domain::{CallType, LegacyDate, RawCandidate, SelectionReason};
use super::selection::JobSelection;

const HONORIFICS: &[&str] = &["mr", "mrs", "ms", "dr", "prof", "sir", "dame"];
const FALLBACK_FIRST_NAME: &str = "there";

/// Normalized contact record for one candidate and the job chosen for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormattedCandidate {
    pub candidate_id: String,
    pub candidate_name: String,
    pub first_name: String,
    pub email: String,
    pub phone: String,
    pub phone_formatted: String,
    pub job_id: String,
    pub job_title: String,
    pub company: String,
    pub request_date: Option<LegacyDate>,
    pub stage_name: String,
    pub call_type: CallType,
    pub call_number: u32,
    pub selection_reason: SelectionReason,
}

/// Display name for greetings: honorific dropped, letters/apostrophes/hyphens kept,
/// capitalised. Falls back to "there".
pub fn extract_first_name(full_name: &str) -> String {
    let parts: Vec<&str> = full_name.split_whitespace().collect();
    let Some(first) = parts.first() else {
        return FALLBACK_FIRST_NAME.to_string();
    };

    let candidate = if parts.len() > 1 && is_honorific(first) {
        parts[1]
    } else {
        first
    };

    let cleaned: String = candidate
        .chars()
        .filter(|c| c.is_ascii_alphabetic() || *c == '\'' || *c == '-')
        .collect();

    let mut chars = cleaned.chars();
    match chars.next() {
        Some(head) => head
            .to_uppercase()
            .chain(chars.as_str().to_lowercase().chars())
            .collect(),
        None => FALLBACK_FIRST_NAME.to_string(),
    }
}

fn is_honorific(token: &str) -> bool {
    let lowered = token.to_lowercase().replacen('.', "", 1);
    HONORIFICS.contains(&lowered.as_str())
}

/// Ensure a leading `+`; blank input stays blank.
pub fn format_phone(phone: &str) -> String {
    let trimmed = phone.trim();
    if trimmed.is_empty() || trimmed.starts_with('+') {
        trimmed.to_string()
    } else {
        format!("+{trimmed}")
    }
}

/// Combine a record with its job selection. `None` when nothing was selected, which the
/// orchestrator treats as "not callable".
pub fn format_candidate(
    record: &RawCandidate,
    selection: Option<&JobSelection>,
) -> Option<FormattedCandidate> {
    let selection = selection?;
    if selection.job_id.is_empty() {
        return None;
    }

    Some(FormattedCandidate {
        candidate_id: record.candidate_id.clone(),
        candidate_name: record.full_name.clone(),
        first_name: extract_first_name(&record.full_name),
        email: record.email.clone(),
        phone: record.phone.clone(),
        phone_formatted: format_phone(&record.phone),
        job_id: selection.job_id.clone(),
        job_title: selection.job_title.clone(),
        company: selection.company.clone(),
        request_date: record.request_date.clone(),
        stage_name: record.stage_name.clone(),
        call_type: selection.call_type,
        call_number: selection.call_number,
        selection_reason: selection.reason,
    })
}
