use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use super::collaborators::{
    AlertMessage, AlertNotifier, AnalyticsTracker, CallPacer, CallRequest, CandidateSource, Clock,
    CrmContact, CrmSync, MessagingProvider, PlacedCall, ScreeningMessage, SourceError, SystemClock,
    TokioPacer, VoiceCallProvider,
};
use super::domain::{CallLogEntry, CallType, LegacyDate, RawCandidate};
use super::formatter::{extract_first_name, format_candidate, format_phone};
use super::gates::{apply_gates, VOLUME_WINDOW_DAYS};
use super::phone::validate_phone;
use super::quota::apply_quota;
use super::repository::{
    AuditAction, AuditEntry, AuditLog, CallHistoryStore, CandidateDecision, ConfigStore,
    DecisionFilter, DecisionId, ExecutionStatus, PipelineRepository, PipelineRun,
    RepositoryError, RunId, RunStats, RunStatus, RunUpdate, TriggerType,
};
use super::scoring::{score_candidate, ScoredCandidate};
use super::selection::select_job;
use super::settings::{
    load_pipeline_config, update_pipeline_setting, ConfigUpdateError, PipelineConfig,
};

const CALL_LOG_COUNTRY: &str = "United Kingdom";
const DEFAULT_CALL_SPACING: Duration = Duration::from_secs(15);
const DEFAULT_PERSIST_BATCH_SIZE: usize = 500;

/// Storage the orchestrator reads and writes.
#[derive(Clone)]
pub struct PipelineStores {
    pub runs: Arc<dyn PipelineRepository>,
    pub history: Arc<dyn CallHistoryStore>,
    pub config: Arc<dyn ConfigStore>,
    pub audit: Arc<dyn AuditLog>,
}

/// Outbound services driven during a run.
#[derive(Clone)]
pub struct PipelineCollaborators {
    pub source: Arc<dyn CandidateSource>,
    pub voice: Arc<dyn VoiceCallProvider>,
    pub messaging: Arc<dyn MessagingProvider>,
    pub crm: Arc<dyn CrmSync>,
    pub analytics: Arc<dyn AnalyticsTracker>,
    pub alerts: Arc<dyn AlertNotifier>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionSettings {
    /// Wait inserted before every call except the first of a run.
    pub call_spacing: Duration,
    /// Maximum decision rows per insert.
    pub persist_batch_size: usize,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            call_spacing: DEFAULT_CALL_SPACING,
            persist_batch_size: DEFAULT_PERSIST_BATCH_SIZE,
        }
    }
}

impl From<&crate::config::PipelineRuntimeConfig> for ExecutionSettings {
    fn from(config: &crate::config::PipelineRuntimeConfig) -> Self {
        Self {
            call_spacing: config.call_spacing(),
            persist_batch_size: config.persist_batch_size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideAction {
    Include,
    Exclude,
}

/// Two-phase run coordinator: prepare (fetch through quota) and execute (calls and
/// follow-up integrations).
pub struct PipelineOrchestrator {
    stores: PipelineStores,
    collaborators: PipelineCollaborators,
    clock: Arc<dyn Clock>,
    pacer: Arc<dyn CallPacer>,
    settings: ExecutionSettings,
}

impl PipelineOrchestrator {
    pub fn new(stores: PipelineStores, collaborators: PipelineCollaborators) -> Self {
        Self {
            stores,
            collaborators,
            clock: Arc::new(SystemClock),
            pacer: Arc::new(TokioPacer),
            settings: ExecutionSettings::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_pacer(mut self, pacer: Arc<dyn CallPacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_settings(mut self, settings: ExecutionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Freeze the current campaign settings into a new `pending` run.
    pub fn create_run(
        &self,
        trigger_type: TriggerType,
        triggered_by: Option<String>,
    ) -> Result<RunId, PipelineError> {
        let config = load_pipeline_config(self.stores.config.as_ref());
        let run = PipelineRun {
            id: RunId::new(),
            status: RunStatus::Pending,
            trigger_type,
            triggered_by,
            config_snapshot: config,
            stats: RunStats::default(),
            error_message: None,
            created_at: self.clock.now(),
            started_at: None,
            completed_at: None,
        };

        let stored = self.stores.runs.insert_run(run)?;
        info!(run_id = %stored.id, ?trigger_type, "pipeline run created");
        Ok(stored.id)
    }

    /// Fetch, gate, select, format, validate, score and apply the quota, persisting one
    /// decision row per candidate. The run stays `processing` for review.
    pub async fn prepare(&self, run_id: RunId) -> Result<RunStats, PipelineError> {
        let run = self.require_run(run_id)?;
        if run.status != RunStatus::Pending {
            return Err(PipelineError::InvalidTransition {
                run_id,
                status: run.status,
                action: "prepare",
            });
        }

        let result = self.prepare_pending(run).await;
        self.fail_unfinished(run_id, result)
    }

    async fn prepare_pending(&self, run: PipelineRun) -> Result<RunStats, PipelineError> {
        let run_id = run.id;
        let config = run.config_snapshot;
        let now = self.clock.now();

        self.stores.runs.update_run(
            &run_id,
            RunUpdate::status(RunStatus::Fetching).started(now),
        )?;
        info!(run_id = %run_id, "fetching candidates");

        let raw_candidates = match self.collaborators.source.fetch().await {
            Ok(candidates) => candidates,
            Err(err) => {
                error!(run_id = %run_id, error = %err, "candidate fetch failed");
                self.stores.runs.update_run(
                    &run_id,
                    RunUpdate::status(RunStatus::Failed)
                        .with_error(err.to_string())
                        .completed(self.clock.now()),
                )?;
                self.alert(AlertMessage::FetchFailed {
                    error: err.to_string(),
                })
                .await;
                return Err(PipelineError::Fetch {
                    run_id,
                    source: err,
                });
            }
        };

        self.stores
            .runs
            .update_run(&run_id, RunUpdate::status(RunStatus::Processing))?;

        let history_since = now - ChronoDuration::days(VOLUME_WINDOW_DAYS);
        let call_history = self
            .stores
            .history
            .since(history_since)
            .unwrap_or_else(|err| {
                warn!(run_id = %run_id, error = %err, "call history unavailable, assuming none");
                Vec::new()
            });

        let groups = group_by_candidate(&raw_candidates);
        info!(
            run_id = %run_id,
            records = raw_candidates.len(),
            candidates = groups.len(),
            history = call_history.len(),
            "processing candidates"
        );

        let mut decisions = Vec::with_capacity(groups.len());
        let mut scored = Vec::new();
        for records in &groups {
            let Some(first) = records.first() else {
                continue;
            };
            let (decision, candidate) =
                evaluate_candidate(run_id, first, records, &call_history, &config, now);
            decisions.push(decision);
            scored.extend(candidate);
        }

        let selected = apply_quota(scored, &config);
        let selected_ids: HashSet<&str> = selected
            .iter()
            .map(|candidate| candidate.candidate.candidate_id.as_str())
            .collect();
        for decision in &mut decisions {
            if decision.execution_status == ExecutionStatus::Pending
                && !selected_ids.contains(decision.candidate_id.as_str())
            {
                debug!(run_id = %run_id, candidate_id = %decision.candidate_id, "lost on quota");
                decision.execution_status = ExecutionStatus::Skipped;
            }
        }

        let stats = RunStats {
            total_fetched: raw_candidates.len(),
            total_passed_gates: decisions.iter().filter(|d| d.gates_passed()).count(),
            total_phone_valid: decisions.iter().filter(|d| d.phone_valid).count(),
            total_selected: selected.len(),
            ..RunStats::default()
        };

        self.persist_decisions(run_id, decisions);

        self.stores.runs.update_run(
            &run_id,
            RunUpdate::status(RunStatus::Processing).with_stats(stats),
        )?;
        info!(
            run_id = %run_id,
            fetched = stats.total_fetched,
            passed_gates = stats.total_passed_gates,
            phone_valid = stats.total_phone_valid,
            selected = stats.total_selected,
            "prepare complete"
        );

        Ok(stats)
    }

    /// Call every pending, callable row of a prepared run in score order, then any manual
    /// inclusions, pacing between calls.
    pub async fn execute(&self, run_id: RunId) -> Result<RunStats, PipelineError> {
        let run = self.require_run(run_id)?;
        if run.status != RunStatus::Processing {
            return Err(PipelineError::InvalidTransition {
                run_id,
                status: run.status,
                action: "execute",
            });
        }

        let result = self.execute_processing(run_id).await;
        self.fail_unfinished(run_id, result)
    }

    async fn execute_processing(&self, run_id: RunId) -> Result<RunStats, PipelineError> {
        self.stores
            .runs
            .update_run(&run_id, RunUpdate::status(RunStatus::Executing))?;
        self.alert(AlertMessage::RunStarted).await;

        let mut queue = match self
            .stores
            .runs
            .query_decisions(&DecisionFilter::execution_ready(run_id))
        {
            Ok(rows) => rows,
            Err(err) => {
                error!(run_id = %run_id, error = %err, "failed to load candidates for execution");
                self.stores.runs.update_run(
                    &run_id,
                    RunUpdate::status(RunStatus::Failed)
                        .with_error(format!("Failed to load candidates: {err}"))
                        .completed(self.clock.now()),
                )?;
                return Err(PipelineError::ExecutionLoad {
                    run_id,
                    source: err,
                });
            }
        };

        match self
            .stores
            .runs
            .query_decisions(&DecisionFilter::manual_inclusions(run_id))
        {
            Ok(inclusions) => {
                let queued: HashSet<DecisionId> = queue.iter().map(|row| row.id).collect();
                queue.extend(inclusions.into_iter().filter(|row| {
                    !queued.contains(&row.id) && row.selected_job_id.is_some()
                }));
            }
            Err(err) => {
                warn!(run_id = %run_id, error = %err, "failed to load manual inclusions");
            }
        }

        info!(run_id = %run_id, queued = queue.len(), "executing calls");

        let mut outcome = ExecutionTally::default();
        for (position, decision) in queue.into_iter().enumerate() {
            self.call_candidate(run_id, position, decision, &mut outcome).await;
        }

        let mut stats = self.require_run(run_id)?.stats;
        stats.total_called = outcome.called;
        stats.total_errors = outcome.errors;
        stats.total_whatsapp_sent = outcome.whatsapp_sent;

        self.stores.runs.update_run(
            &run_id,
            RunUpdate::status(RunStatus::Completed)
                .with_stats(stats)
                .completed(self.clock.now()),
        )?;
        info!(
            run_id = %run_id,
            called = stats.total_called,
            errors = stats.total_errors,
            whatsapp_sent = stats.total_whatsapp_sent,
            "run completed"
        );
        self.alert(AlertMessage::RunCompleted {
            total_called: outcome.called,
            total_errors: outcome.errors,
        })
        .await;

        Ok(stats)
    }

    /// Prepare and execute back to back, for unattended runs.
    pub async fn run_full(&self, run_id: RunId) -> Result<RunStats, PipelineError> {
        self.prepare(run_id).await?;
        self.execute(run_id).await
    }

    pub fn cancel_run(&self, run_id: RunId) -> Result<PipelineRun, PipelineError> {
        let run = self.require_run(run_id)?;
        if !matches!(run.status, RunStatus::Pending | RunStatus::Processing) {
            return Err(PipelineError::InvalidTransition {
                run_id,
                status: run.status,
                action: "cancel",
            });
        }

        let cancelled = self.stores.runs.update_run(
            &run_id,
            RunUpdate::status(RunStatus::Cancelled).completed(self.clock.now()),
        )?;
        info!(run_id = %run_id, "run cancelled");
        Ok(cancelled)
    }

    /// Force a candidate in or out of execution while the run is still under review.
    pub fn override_candidate(
        &self,
        decision_id: DecisionId,
        action: OverrideAction,
        actor: Option<String>,
        reason: Option<String>,
    ) -> Result<CandidateDecision, PipelineError> {
        let mut decision = self
            .stores
            .runs
            .fetch_decision(&decision_id)?
            .ok_or(PipelineError::DecisionNotFound(decision_id))?;

        let run = self.require_run(decision.run_id)?;
        if !matches!(run.status, RunStatus::Pending | RunStatus::Processing) {
            return Err(PipelineError::OverrideLocked {
                run_id: run.id,
                status: run.status,
            });
        }

        let old_value = override_snapshot(&decision);
        match action {
            OverrideAction::Include => {
                decision.manually_included = true;
                decision.manually_excluded = false;
                if decision.execution_status == ExecutionStatus::Skipped && decision.is_callable()
                {
                    decision.execution_status = ExecutionStatus::Pending;
                }
            }
            OverrideAction::Exclude => {
                decision.manually_included = false;
                decision.manually_excluded = true;
            }
        }
        decision.override_by = actor.clone();
        decision.override_reason = reason;

        self.stores.runs.update_decision(decision.clone())?;

        let audit_action = match action {
            OverrideAction::Include => AuditAction::ManualInclude,
            OverrideAction::Exclude => AuditAction::ManualExclude,
        };
        let entry = AuditEntry {
            actor,
            action: audit_action,
            entity_type: "pipeline_candidate".to_string(),
            entity_id: decision.id.to_string(),
            old_value: Some(old_value),
            new_value: override_snapshot(&decision),
            recorded_at: self.clock.now(),
        };
        if let Err(err) = self.stores.audit.record(entry) {
            warn!(decision_id = %decision.id, error = %err, "failed to write override audit entry");
        }

        info!(
            run_id = %decision.run_id,
            decision_id = %decision.id,
            candidate_id = %decision.candidate_id,
            ?action,
            "manual override applied"
        );
        Ok(decision)
    }

    pub fn get_run(&self, run_id: RunId) -> Result<PipelineRun, PipelineError> {
        self.require_run(run_id)
    }

    pub fn list_runs(&self, limit: usize) -> Result<Vec<PipelineRun>, PipelineError> {
        Ok(self.stores.runs.list_runs(limit)?)
    }

    pub fn run_decisions(&self, run_id: RunId) -> Result<Vec<CandidateDecision>, PipelineError> {
        self.require_run(run_id)?;
        Ok(self
            .stores
            .runs
            .query_decisions(&DecisionFilter::for_run(run_id))?)
    }

    pub fn current_config(&self) -> PipelineConfig {
        load_pipeline_config(self.stores.config.as_ref())
    }

    pub fn update_config(
        &self,
        key: &str,
        value: Value,
        actor: Option<&str>,
    ) -> Result<AuditEntry, PipelineError> {
        let entry = update_pipeline_setting(
            self.stores.config.as_ref(),
            self.stores.audit.as_ref(),
            key,
            value,
            actor,
            self.clock.now(),
        )?;
        info!(%key, actor = actor.unwrap_or("unknown"), "pipeline setting updated");
        Ok(entry)
    }

    pub fn audit_entries(&self, limit: usize) -> Result<Vec<AuditEntry>, PipelineError> {
        Ok(self.stores.audit.entries(limit)?)
    }

    fn require_run(&self, run_id: RunId) -> Result<PipelineRun, PipelineError> {
        self.stores
            .runs
            .fetch_run(&run_id)?
            .ok_or(PipelineError::RunNotFound(run_id))
    }

    /// A phase that errors after leaving `pending` or `processing` must not strand the run
    /// in a working state: anything not yet terminal is moved to `failed`.
    fn fail_unfinished<T>(
        &self,
        run_id: RunId,
        result: Result<T, PipelineError>,
    ) -> Result<T, PipelineError> {
        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        match self.stores.runs.fetch_run(&run_id) {
            Ok(Some(run)) if run.status.is_terminal() => return Err(err),
            Ok(None) => return Err(err),
            Ok(Some(_)) | Err(_) => {}
        }

        let update = RunUpdate::status(RunStatus::Failed)
            .with_error(err.to_string())
            .completed(self.clock.now());
        match self.stores.runs.update_run(&run_id, update) {
            Ok(_) => error!(run_id = %run_id, error = %err, "run failed"),
            Err(update_err) => error!(
                run_id = %run_id,
                error = %err,
                update_error = %update_err,
                "failed to mark run as failed"
            ),
        }
        Err(err)
    }

    fn persist_decisions(&self, run_id: RunId, decisions: Vec<CandidateDecision>) {
        let batch_size = self.settings.persist_batch_size.max(1);
        for (index, batch) in decisions.chunks(batch_size).enumerate() {
            if let Err(err) = self.stores.runs.insert_decisions(batch.to_vec()) {
                error!(
                    run_id = %run_id,
                    batch = index,
                    rows = batch.len(),
                    error = %err,
                    "failed to insert candidate batch"
                );
            }
        }
    }

    fn save_decision(&self, decision: &CandidateDecision) {
        if let Err(err) = self.stores.runs.update_decision(decision.clone()) {
            error!(
                decision_id = %decision.id,
                status = decision.execution_status.label(),
                error = %err,
                "failed to persist decision row"
            );
        }
    }

    async fn alert(&self, message: AlertMessage) {
        if let Err(err) = self.collaborators.alerts.notify(&message).await {
            warn!(error = %err, "alert notification failed");
        }
    }

    async fn call_candidate(
        &self,
        run_id: RunId,
        position: usize,
        mut decision: CandidateDecision,
        tally: &mut ExecutionTally,
    ) {
        decision.execution_status = ExecutionStatus::Calling;
        self.save_decision(&decision);
        if position > 0 {
            self.pacer.pause(self.settings.call_spacing).await;
        }

        let request = call_request(&decision);
        let placed = match self.collaborators.voice.place_call(&request).await {
            Ok(placed) => placed,
            Err(err) => {
                tally.errors += 1;
                warn!(
                    run_id = %run_id,
                    decision_id = %decision.id,
                    candidate_id = %decision.candidate_id,
                    error = %err,
                    "call failed"
                );
                decision.execution_status = ExecutionStatus::Error;
                decision.execution_error = Some(err.to_string());
                decision.executed_at = Some(self.clock.now());
                self.save_decision(&decision);
                self.alert(AlertMessage::CallFailed {
                    candidate_name: decision.full_name.clone(),
                    error: err.to_string(),
                })
                .await;
                return;
            }
        };
        tally.called += 1;

        if request.call_type == CallType::Initial {
            let message = ScreeningMessage {
                phone: request.phone.clone(),
                first_name: request.first_name.clone(),
                company_name: request.company_name.clone(),
                job_title: request.job_title.clone(),
            };
            decision.whatsapp_sent = self.observe(
                &decision,
                "messaging",
                self.collaborators.messaging.send_template(&message).await,
            );
            if decision.whatsapp_sent {
                tally.whatsapp_sent += 1;
            }
        }

        if !decision.email.trim().is_empty() {
            let contact = CrmContact {
                email: decision.email.clone(),
                job_title: request.job_title.clone(),
                company_name: request.company_name.clone(),
            };
            decision.crm_synced = self.observe(
                &decision,
                "crm",
                self.collaborators.crm.sync_contact(&contact).await,
            );
            decision.analytics_tracked = self.observe(
                &decision,
                "analytics",
                self.collaborators.analytics.track_called(&decision.email).await,
            );
        }

        let now = self.clock.now();
        let entry = call_log_entry(&decision, &request, &placed, now);
        if let Err(err) = self.stores.history.append(entry) {
            error!(decision_id = %decision.id, error = %err, "failed to append call log entry");
        }

        decision.execution_status = ExecutionStatus::Completed;
        decision.call_id = Some(placed.call_id);
        decision.executed_at = Some(now);
        self.save_decision(&decision);
        debug!(run_id = %run_id, decision_id = %decision.id, "call completed");
    }

    fn observe<E: std::fmt::Display>(
        &self,
        decision: &CandidateDecision,
        integration: &'static str,
        result: Result<(), E>,
    ) -> bool {
        match result {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    decision_id = %decision.id,
                    integration,
                    error = %err,
                    "follow-up integration failed"
                );
                false
            }
        }
    }
}

#[derive(Debug, Default)]
struct ExecutionTally {
    called: usize,
    errors: usize,
    whatsapp_sent: usize,
}

/// Group records by candidate id, keeping first-seen order.
fn group_by_candidate(records: &[RawCandidate]) -> Vec<Vec<RawCandidate>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Vec<RawCandidate>> = Vec::new();
    for record in records {
        match index.get(record.candidate_id.as_str()) {
            Some(position) => groups[*position].push(record.clone()),
            None => {
                index.insert(record.candidate_id.as_str(), groups.len());
                groups.push(vec![record.clone()]);
            }
        }
    }
    groups
}

/// Run one candidate through gates, selection, formatting, phone validation and scoring.
/// The first failing stage marks the row `skipped` and leaves later fields unset.
fn evaluate_candidate(
    run_id: RunId,
    first: &RawCandidate,
    records: &[RawCandidate],
    call_history: &[CallLogEntry],
    config: &PipelineConfig,
    now: DateTime<Utc>,
) -> (CandidateDecision, Option<ScoredCandidate>) {
    let gates = apply_gates(first, call_history, config, now);
    let mut decision = CandidateDecision {
        id: DecisionId::new(),
        run_id,
        candidate_id: first.candidate_id.clone(),
        full_name: first.full_name.clone(),
        email: first.email.clone(),
        phone: first.phone.clone(),
        phone_formatted: format_phone(&first.phone),
        source_data: first.clone(),
        gate_compliance: gates.compliance,
        gate_buffer: gates.buffer,
        gate_volume: gates.volume,
        gate_details: gates.details,
        selected_job_id: None,
        selected_job_title: None,
        selected_company: None,
        job_selection_reason: None,
        call_type: None,
        call_number: 0,
        phone_valid: false,
        phone_validation_reason: None,
        priority_score: 0,
        score_breakdown: None,
        execution_status: ExecutionStatus::Pending,
        execution_error: None,
        executed_at: None,
        call_id: None,
        whatsapp_sent: false,
        crm_synced: false,
        analytics_tracked: false,
        manually_included: false,
        manually_excluded: false,
        override_by: None,
        override_reason: None,
        created_at: now,
    };

    if !decision.gates_passed() {
        debug!(
            run_id = %run_id,
            candidate_id = %decision.candidate_id,
            reasons = ?decision.gate_details.failure_reasons,
            "candidate blocked by gates"
        );
        decision.execution_status = ExecutionStatus::Skipped;
        return (decision, None);
    }

    let Some(selection) = select_job(records, call_history, config, now) else {
        debug!(run_id = %run_id, candidate_id = %decision.candidate_id, "no job due");
        decision.execution_status = ExecutionStatus::Skipped;
        return (decision, None);
    };
    decision.selected_job_id = Some(selection.job_id.clone());
    decision.selected_job_title = Some(selection.job_title.clone());
    decision.selected_company = Some(selection.company.clone());
    decision.job_selection_reason = Some(selection.reason);
    decision.call_type = Some(selection.call_type);
    decision.call_number = selection.call_number;

    let job_record = records
        .iter()
        .find(|record| record.job_id == selection.job_id)
        .unwrap_or(first);
    let Some(formatted) = format_candidate(job_record, Some(&selection)) else {
        decision.execution_status = ExecutionStatus::Skipped;
        return (decision, None);
    };

    let phone = validate_phone(Some(&formatted.phone_formatted));
    decision.phone_valid = phone.valid;
    decision.phone_validation_reason = Some(phone.reason);
    if !phone.valid {
        debug!(
            run_id = %run_id,
            candidate_id = %decision.candidate_id,
            reason = phone.reason.label(),
            "phone not callable"
        );
        decision.execution_status = ExecutionStatus::Skipped;
        return (decision, None);
    }

    let scored = score_candidate(formatted, config, now);
    decision.priority_score = scored.priority_score;
    decision.score_breakdown = Some(scored.breakdown);
    (decision, Some(scored))
}

fn call_request(decision: &CandidateDecision) -> CallRequest {
    let phone = if decision.phone_formatted.is_empty() {
        decision.phone.clone()
    } else {
        decision.phone_formatted.clone()
    };

    CallRequest {
        phone,
        first_name: extract_first_name(&decision.full_name),
        full_name: decision.full_name.clone(),
        job_title: decision.selected_job_title.clone().unwrap_or_default(),
        company_name: decision.selected_company.clone().unwrap_or_default(),
        candidate_id: decision.candidate_id.clone(),
        job_id: decision.selected_job_id.clone().unwrap_or_default(),
        call_type: decision.call_type.unwrap_or(CallType::Initial),
        call_number: decision.call_number.max(1),
        email: decision.email.clone(),
    }
}

fn call_log_entry(
    decision: &CandidateDecision,
    request: &CallRequest,
    placed: &PlacedCall,
    now: DateTime<Utc>,
) -> CallLogEntry {
    let sms = match request.call_type {
        CallType::Initial => "SENT",
        CallType::Chase => "NOT_SENT",
    };

    CallLogEntry {
        job_id: request.job_id.clone(),
        candidate_id: request.candidate_id.clone(),
        full_name: request.full_name.clone(),
        job_title: request.job_title.clone(),
        company_requested: request.company_name.clone(),
        call_id: Some(placed.call_id.clone()),
        call_timestamp: Some(LegacyDate::from_instant(placed.created_at.unwrap_or(now))),
        chase_stage: decision.call_number + 1,
        sms: sms.to_string(),
        call_type: request.call_type.label().to_string(),
        email: decision.email.clone(),
        request_type: decision.source_data.stage_name.clone(),
        country: CALL_LOG_COUNTRY.to_string(),
        phone_number: request.phone.clone(),
    }
}

fn override_snapshot(decision: &CandidateDecision) -> Value {
    json!({
        "manually_included": decision.manually_included,
        "manually_excluded": decision.manually_excluded,
        "execution_status": decision.execution_status.label(),
        "override_reason": decision.override_reason,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("pipeline run {0} not found")]
    RunNotFound(RunId),
    #[error("candidate decision {0} not found")]
    DecisionNotFound(DecisionId),
    #[error("cannot {action} run {run_id} while it is {status}")]
    InvalidTransition {
        run_id: RunId,
        status: RunStatus,
        action: &'static str,
    },
    #[error("overrides are locked for run {run_id} while it is {status}")]
    OverrideLocked { run_id: RunId, status: RunStatus },
    #[error("candidate fetch failed for run {run_id}: {source}")]
    Fetch {
        run_id: RunId,
        #[source]
        source: SourceError,
    },
    #[error("failed to load candidates for run {run_id}: {source}")]
    ExecutionLoad {
        run_id: RunId,
        #[source]
        source: RepositoryError,
    },
    #[error(transparent)]
    Config(#[from] ConfigUpdateError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
