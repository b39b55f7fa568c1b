use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::domain::{CallLogEntry, CallType, RawCandidate, SelectionReason};
use super::gates::GateDetails;
use super::phone::PhoneValidationReason;
use super::scoring::ScoreBreakdown;
use super::settings::PipelineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionId(pub Uuid);

impl DecisionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DecisionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Fetching,
    Processing,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Fetching => "fetching",
            RunStatus::Processing => "processing",
            RunStatus::Executing => "executing",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Scheduled,
    Manual,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub total_fetched: usize,
    pub total_passed_gates: usize,
    pub total_phone_valid: usize,
    pub total_selected: usize,
    pub total_called: usize,
    pub total_errors: usize,
    pub total_whatsapp_sent: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: RunId,
    pub status: RunStatus,
    pub trigger_type: TriggerType,
    pub triggered_by: Option<String>,
    pub config_snapshot: PipelineConfig,
    pub stats: RunStats,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Partial run mutation. The config snapshot is deliberately absent: it is write-once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunUpdate {
    pub status: Option<RunStatus>,
    pub stats: Option<RunStats>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunUpdate {
    pub fn status(status: RunStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_stats(mut self, stats: RunStats) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn started(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn completed(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }
}

impl PipelineRun {
    pub fn apply(&mut self, update: RunUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(stats) = update.stats {
            self.stats = stats;
        }
        if let Some(message) = update.error_message {
            self.error_message = Some(message);
        }
        if let Some(started_at) = update.started_at {
            self.started_at = Some(started_at);
        }
        if let Some(completed_at) = update.completed_at {
            self.completed_at = Some(completed_at);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Calling,
    Completed,
    Error,
    Skipped,
}

impl ExecutionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Calling => "calling",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Error => "error",
            ExecutionStatus::Skipped => "skipped",
        }
    }
}

/// Persisted trail of one candidate's journey through one run.
///
/// Fields after the gates are only filled in as far as the candidate got: a row skipped at
/// the gates carries no job selection, phone verdict or score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateDecision {
    pub id: DecisionId,
    pub run_id: RunId,
    pub candidate_id: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub phone_formatted: String,
    pub source_data: RawCandidate,
    pub gate_compliance: bool,
    pub gate_buffer: bool,
    pub gate_volume: bool,
    pub gate_details: GateDetails,
    pub selected_job_id: Option<String>,
    pub selected_job_title: Option<String>,
    pub selected_company: Option<String>,
    pub job_selection_reason: Option<SelectionReason>,
    pub call_type: Option<CallType>,
    pub call_number: u32,
    pub phone_valid: bool,
    pub phone_validation_reason: Option<PhoneValidationReason>,
    pub priority_score: u32,
    pub score_breakdown: Option<ScoreBreakdown>,
    pub execution_status: ExecutionStatus,
    pub execution_error: Option<String>,
    pub executed_at: Option<DateTime<Utc>>,
    pub call_id: Option<String>,
    pub whatsapp_sent: bool,
    pub crm_synced: bool,
    pub analytics_tracked: bool,
    pub manually_included: bool,
    pub manually_excluded: bool,
    pub override_by: Option<String>,
    pub override_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CandidateDecision {
    pub fn gates_passed(&self) -> bool {
        self.gate_compliance && self.gate_buffer && self.gate_volume
    }

    /// Has a call target: a selected job and a valid phone.
    pub fn is_callable(&self) -> bool {
        self.selected_job_id.is_some() && self.phone_valid
    }
}

/// Conjunctive filter over decision rows; `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecisionFilter {
    pub run_id: Option<RunId>,
    pub status: Option<ExecutionStatus>,
    pub phone_valid: Option<bool>,
    pub has_selected_job: Option<bool>,
    pub manually_included: Option<bool>,
    pub manually_excluded: Option<bool>,
}

impl DecisionFilter {
    pub fn for_run(run_id: RunId) -> Self {
        Self {
            run_id: Some(run_id),
            ..Self::default()
        }
    }

    /// Pending, callable, not excluded rows: the default execution list.
    pub fn execution_ready(run_id: RunId) -> Self {
        Self {
            run_id: Some(run_id),
            status: Some(ExecutionStatus::Pending),
            phone_valid: Some(true),
            has_selected_job: Some(true),
            manually_excluded: Some(false),
            ..Self::default()
        }
    }

    pub fn manual_inclusions(run_id: RunId) -> Self {
        Self {
            run_id: Some(run_id),
            status: Some(ExecutionStatus::Pending),
            manually_included: Some(true),
            ..Self::default()
        }
    }

    pub fn matches(&self, decision: &CandidateDecision) -> bool {
        self.run_id.map_or(true, |id| decision.run_id == id)
            && self.status.map_or(true, |s| decision.execution_status == s)
            && self.phone_valid.map_or(true, |v| decision.phone_valid == v)
            && self
                .has_selected_job
                .map_or(true, |v| decision.selected_job_id.is_some() == v)
            && self
                .manually_included
                .map_or(true, |v| decision.manually_included == v)
            && self
                .manually_excluded
                .map_or(true, |v| decision.manually_excluded == v)
    }
}

/// Run and decision storage.
pub trait PipelineRepository: Send + Sync {
    fn insert_run(&self, run: PipelineRun) -> Result<PipelineRun, RepositoryError>;
    fn fetch_run(&self, id: &RunId) -> Result<Option<PipelineRun>, RepositoryError>;
    /// Apply a partial update, returning the stored result. `NotFound` for unknown runs.
    fn update_run(&self, id: &RunId, update: RunUpdate) -> Result<PipelineRun, RepositoryError>;
    /// Most recent first.
    fn list_runs(&self, limit: usize) -> Result<Vec<PipelineRun>, RepositoryError>;
    /// Insert one batch. A second row for the same (run, candidate) is a `Conflict`.
    fn insert_decisions(&self, decisions: Vec<CandidateDecision>) -> Result<(), RepositoryError>;
    fn update_decision(&self, decision: CandidateDecision) -> Result<(), RepositoryError>;
    fn fetch_decision(&self, id: &DecisionId) -> Result<Option<CandidateDecision>, RepositoryError>;
    /// Matching rows ordered by priority score, highest first.
    fn query_decisions(
        &self,
        filter: &DecisionFilter,
    ) -> Result<Vec<CandidateDecision>, RepositoryError>;
}

/// Append-only contact log shared across runs.
pub trait CallHistoryStore: Send + Sync {
    fn since(&self, since: DateTime<Utc>) -> Result<Vec<CallLogEntry>, RepositoryError>;
    fn append(&self, entry: CallLogEntry) -> Result<(), RepositoryError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: Value,
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

pub trait ConfigStore: Send + Sync {
    fn entries(&self) -> Result<Vec<ConfigEntry>, RepositoryError>;
    /// Write a setting, returning the value it replaced.
    fn upsert(&self, entry: ConfigEntry) -> Result<Option<Value>, RepositoryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    ConfigChange,
    ManualInclude,
    ManualExclude,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor: Option<String>,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: String,
    pub old_value: Option<Value>,
    pub new_value: Value,
    pub recorded_at: DateTime<Utc>,
}

pub trait AuditLog: Send + Sync {
    fn record(&self, entry: AuditEntry) -> Result<(), RepositoryError>;
    /// Most recent first.
    fn entries(&self, limit: usize) -> Result<Vec<AuditEntry>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
