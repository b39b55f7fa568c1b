use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::dates::parse_legacy_date;

/// One open job request for one candidate, exactly as exported by the reporting source.
///
/// Many records may share a `candidate_id` (one per open job). Field names follow the
/// report's column headings so the record can be stored verbatim as `source_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCandidate {
    #[serde(rename = "CANDIDATE_ID", default, deserialize_with = "lenient_string")]
    pub candidate_id: String,
    #[serde(rename = "FULL_NAME", default, deserialize_with = "lenient_string")]
    pub full_name: String,
    #[serde(rename = "EMAIL", default, deserialize_with = "lenient_string")]
    pub email: String,
    #[serde(rename = "PHONE", default, deserialize_with = "lenient_string")]
    pub phone: String,
    #[serde(rename = "JOB_ID", default, deserialize_with = "lenient_string")]
    pub job_id: String,
    #[serde(rename = "JOB_TITLE", default, deserialize_with = "lenient_string")]
    pub job_title: String,
    #[serde(rename = "COMPANY_REQUESTED", default, deserialize_with = "lenient_string")]
    pub company_requested: String,
    #[serde(rename = "REQUEST_DATE", default, deserialize_with = "nullable")]
    pub request_date: Option<LegacyDate>,
    #[serde(rename = "STAGE_NAME", default, deserialize_with = "lenient_string")]
    pub stage_name: String,
    #[serde(rename = "OPT_OUT_STATUS", default, deserialize_with = "nullable")]
    pub opt_out_status: OptOutFlag,
}

impl RawCandidate {
    pub fn requested_at(&self) -> Option<DateTime<Utc>> {
        self.request_date.as_ref().and_then(parse_legacy_date)
    }
}

/// Append-only record of one contact attempt. Only entries with a non-empty call id count
/// as a call that actually happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallLogEntry {
    #[serde(rename = "JOB_ID", default, deserialize_with = "lenient_string")]
    pub job_id: String,
    #[serde(rename = "CANDIDATE_ID", default, deserialize_with = "lenient_string")]
    pub candidate_id: String,
    #[serde(rename = "FULL_NAME", default, deserialize_with = "lenient_string")]
    pub full_name: String,
    #[serde(rename = "JOB_TITLE", default, deserialize_with = "lenient_string")]
    pub job_title: String,
    #[serde(rename = "COMPANY_REQUESTED", default, deserialize_with = "lenient_string")]
    pub company_requested: String,
    #[serde(rename = "CALL_ID", default, deserialize_with = "lenient_optional_string")]
    pub call_id: Option<String>,
    #[serde(rename = "CALL_TIMESTAMP", default, deserialize_with = "nullable")]
    pub call_timestamp: Option<LegacyDate>,
    #[serde(rename = "CHASE_STAGE", default, deserialize_with = "nullable")]
    pub chase_stage: u32,
    #[serde(rename = "SMS", default, deserialize_with = "lenient_string")]
    pub sms: String,
    #[serde(rename = "CALL_TYPE", default, deserialize_with = "lenient_string")]
    pub call_type: String,
    #[serde(rename = "Email", default, deserialize_with = "lenient_string")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub request_type: String,
    #[serde(rename = "Country", default, deserialize_with = "lenient_string")]
    pub country: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone_number: String,
}

impl CallLogEntry {
    pub fn is_completed(&self) -> bool {
        self.call_id
            .as_deref()
            .map(|id| !id.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn called_at(&self) -> Option<DateTime<Utc>> {
        self.call_timestamp.as_ref().and_then(parse_legacy_date)
    }
}

/// Dates arrive either as a spreadsheet serial day count or as a timestamp string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LegacyDate {
    Serial(f64),
    Text(String),
}

impl LegacyDate {
    pub fn from_instant(instant: DateTime<Utc>) -> Self {
        Self::Text(instant.to_rfc3339())
    }
}

/// Opt-out marker as exported: a boolean, the strings "true"/"false", or anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptOutFlag {
    Flag(bool),
    Text(String),
    Other(serde_json::Value),
}

impl OptOutFlag {
    pub fn is_opted_out(&self) -> bool {
        match self {
            OptOutFlag::Flag(flag) => *flag,
            OptOutFlag::Text(text) => text == "true",
            OptOutFlag::Other(_) => false,
        }
    }
}

impl Default for OptOutFlag {
    fn default() -> Self {
        OptOutFlag::Flag(false)
    }
}

/// First contact about a job versus a follow-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    Initial,
    Chase,
}

impl CallType {
    pub const fn label(self) -> &'static str {
        match self {
            CallType::Initial => "initial",
            CallType::Chase => "chase",
        }
    }
}

/// Why the job selector picked a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    NeverCalled,
    ChaseEligible,
}

impl SelectionReason {
    pub const fn label(self) -> &'static str {
        match self {
            SelectionReason::NeverCalled => "never_called",
            SelectionReason::ChaseEligible => "chase_eligible",
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LenientScalar {
    Text(String),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Flag(bool),
}

impl LenientScalar {
    fn into_string(self) -> String {
        match self {
            LenientScalar::Text(text) => text,
            LenientScalar::Unsigned(value) => value.to_string(),
            LenientScalar::Signed(value) => value.to_string(),
            LenientScalar::Float(value) => value.to_string(),
            LenientScalar::Flag(value) => value.to_string(),
        }
    }
}

/// Report cells hold identifiers and phone numbers as strings or numbers; null becomes "".
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<LenientScalar>::deserialize(deserializer)?;
    Ok(value.map(LenientScalar::into_string).unwrap_or_default())
}

fn lenient_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<LenientScalar>::deserialize(deserializer)?;
    Ok(value
        .map(LenientScalar::into_string)
        .filter(|text| !text.trim().is_empty()))
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
