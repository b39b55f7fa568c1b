use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::screening::collaborators::{
    AlertMessage, AlertNotifier, AnalyticsTracker, CallPacer, CallRequest, CandidateSource, Clock,
    CrmContact, CrmSync, IntegrationError, MessagingProvider, PlacedCall, ScreeningMessage,
    SourceError, VoiceCallProvider,
};
use crate::workflows::screening::domain::{CallLogEntry, LegacyDate, OptOutFlag, RawCandidate};
use crate::workflows::screening::orchestrator::{
    ExecutionSettings, PipelineCollaborators, PipelineOrchestrator, PipelineStores,
};
use crate::workflows::screening::repository::{
    AuditEntry, AuditLog, CallHistoryStore, CandidateDecision, ConfigEntry, ConfigStore,
    DecisionFilter, DecisionId, ExecutionStatus, PipelineRepository, PipelineRun,
    RepositoryError, RunId, RunStatus, RunUpdate,
};

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0)
        .single()
        .expect("valid now")
}

pub(super) fn hours_ago(hours: i64) -> LegacyDate {
    LegacyDate::from_instant(now() - ChronoDuration::hours(hours))
}

/// One open job request, screening stage, valid UK mobile, not opted out.
pub(super) fn candidate(candidate_id: &str, job_id: &str, requested_hours_ago: i64) -> RawCandidate {
    RawCandidate {
        candidate_id: candidate_id.to_string(),
        full_name: format!("Test {candidate_id}"),
        email: format!("{candidate_id}@example.com"),
        phone: "447700900123".to_string(),
        job_id: job_id.to_string(),
        job_title: "Care Assistant".to_string(),
        company_requested: format!("Company {job_id}"),
        request_date: Some(hours_ago(requested_hours_ago)),
        stage_name: "Technical Screening".to_string(),
        opt_out_status: OptOutFlag::default(),
    }
}

pub(super) fn completed_call(candidate_id: &str, job_id: &str, called_hours_ago: i64) -> CallLogEntry {
    CallLogEntry {
        job_id: job_id.to_string(),
        candidate_id: candidate_id.to_string(),
        full_name: String::new(),
        job_title: String::new(),
        company_requested: String::new(),
        call_id: Some(format!("prior-{candidate_id}-{job_id}")),
        call_timestamp: Some(hours_ago(called_hours_ago)),
        chase_stage: 2,
        sms: "SENT".to_string(),
        call_type: "initial".to_string(),
        email: String::new(),
        request_type: String::new(),
        country: "United Kingdom".to_string(),
        phone_number: String::new(),
    }
}

/// Ordered record of calls and pauses, shared by the voice and pacer doubles.
#[derive(Default, Clone)]
pub(super) struct Timeline {
    events: Arc<Mutex<Vec<String>>>,
}

impl Timeline {
    fn push(&self, event: String) {
        self.events.lock().expect("timeline mutex poisoned").push(event);
    }

    pub(super) fn events(&self) -> Vec<String> {
        self.events.lock().expect("timeline mutex poisoned").clone()
    }
}

#[derive(Default)]
pub(super) struct MemoryRuns {
    runs: Mutex<HashMap<RunId, PipelineRun>>,
    decisions: Mutex<Vec<CandidateDecision>>,
    timeline: Timeline,
    pub(super) fail_queries: AtomicBool,
    /// Run updates moving to this status are rejected.
    fail_status: Mutex<Option<RunStatus>>,
    /// Zero-based `insert_decisions` call that is rejected.
    fail_batch: Mutex<Option<usize>>,
    batch_sizes: Mutex<Vec<usize>>,
}

impl MemoryRuns {
    pub(super) fn fail_updates_to(&self, status: RunStatus) {
        *self.fail_status.lock().expect("runs mutex poisoned") = Some(status);
    }

    pub(super) fn fail_insert_batch(&self, index: usize) {
        *self.fail_batch.lock().expect("decisions mutex poisoned") = Some(index);
    }

    /// Row count of every `insert_decisions` call, rejected ones included.
    pub(super) fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().expect("decisions mutex poisoned").clone()
    }

    pub(super) fn decisions_for(&self, run_id: RunId) -> Vec<CandidateDecision> {
        self.query_decisions(&DecisionFilter::for_run(run_id))
            .expect("memory query")
    }

    pub(super) fn decision(&self, run_id: RunId, candidate_id: &str) -> CandidateDecision {
        self.decisions_for(run_id)
            .into_iter()
            .find(|decision| decision.candidate_id == candidate_id)
            .unwrap_or_else(|| panic!("no decision for {candidate_id}"))
    }

    pub(super) fn run(&self, run_id: RunId) -> PipelineRun {
        self.fetch_run(&run_id)
            .expect("memory fetch")
            .expect("run exists")
    }
}

impl PipelineRepository for MemoryRuns {
    fn insert_run(&self, run: PipelineRun) -> Result<PipelineRun, RepositoryError> {
        let mut guard = self.runs.lock().expect("runs mutex poisoned");
        if guard.contains_key(&run.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(run.id, run.clone());
        Ok(run)
    }

    fn fetch_run(&self, id: &RunId) -> Result<Option<PipelineRun>, RepositoryError> {
        Ok(self.runs.lock().expect("runs mutex poisoned").get(id).cloned())
    }

    fn update_run(&self, id: &RunId, update: RunUpdate) -> Result<PipelineRun, RepositoryError> {
        let failing = *self.fail_status.lock().expect("runs mutex poisoned");
        if failing.is_some() && update.status == failing {
            return Err(RepositoryError::Unavailable("run store offline".to_string()));
        }
        let mut guard = self.runs.lock().expect("runs mutex poisoned");
        let run = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        run.apply(update);
        Ok(run.clone())
    }

    fn list_runs(&self, limit: usize) -> Result<Vec<PipelineRun>, RepositoryError> {
        let mut runs: Vec<PipelineRun> = self
            .runs
            .lock()
            .expect("runs mutex poisoned")
            .values()
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs.truncate(limit);
        Ok(runs)
    }

    fn insert_decisions(&self, decisions: Vec<CandidateDecision>) -> Result<(), RepositoryError> {
        let attempt = {
            let mut sizes = self.batch_sizes.lock().expect("decisions mutex poisoned");
            sizes.push(decisions.len());
            sizes.len() - 1
        };
        if *self.fail_batch.lock().expect("decisions mutex poisoned") == Some(attempt) {
            return Err(RepositoryError::Unavailable("batch rejected".to_string()));
        }
        let mut guard = self.decisions.lock().expect("decisions mutex poisoned");
        let mut seen: HashSet<(RunId, String)> = guard
            .iter()
            .map(|d| (d.run_id, d.candidate_id.clone()))
            .collect();
        for decision in &decisions {
            if !seen.insert((decision.run_id, decision.candidate_id.clone())) {
                return Err(RepositoryError::Conflict);
            }
        }
        guard.extend(decisions);
        Ok(())
    }

    fn update_decision(&self, decision: CandidateDecision) -> Result<(), RepositoryError> {
        if decision.execution_status == ExecutionStatus::Calling {
            self.timeline.push(format!("calling:{}", decision.candidate_id));
        }
        let mut guard = self.decisions.lock().expect("decisions mutex poisoned");
        let slot = guard
            .iter_mut()
            .find(|existing| existing.id == decision.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = decision;
        Ok(())
    }

    fn fetch_decision(&self, id: &DecisionId) -> Result<Option<CandidateDecision>, RepositoryError> {
        Ok(self
            .decisions
            .lock()
            .expect("decisions mutex poisoned")
            .iter()
            .find(|decision| decision.id == *id)
            .cloned())
    }

    fn query_decisions(
        &self,
        filter: &DecisionFilter,
    ) -> Result<Vec<CandidateDecision>, RepositoryError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("decision store offline".to_string()));
        }
        let mut rows: Vec<CandidateDecision> = self
            .decisions
            .lock()
            .expect("decisions mutex poisoned")
            .iter()
            .filter(|decision| filter.matches(decision))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.priority_score.cmp(&a.priority_score));
        Ok(rows)
    }
}

#[derive(Default)]
pub(super) struct MemoryHistory {
    entries: Mutex<Vec<CallLogEntry>>,
    pub(super) unavailable: AtomicBool,
}

impl MemoryHistory {
    pub(super) fn seed(&self, entries: Vec<CallLogEntry>) {
        self.entries.lock().expect("history mutex poisoned").extend(entries);
    }

    pub(super) fn entries(&self) -> Vec<CallLogEntry> {
        self.entries.lock().expect("history mutex poisoned").clone()
    }
}

impl CallHistoryStore for MemoryHistory {
    fn since(&self, since: DateTime<Utc>) -> Result<Vec<CallLogEntry>, RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("call log offline".to_string()));
        }
        Ok(self
            .entries
            .lock()
            .expect("history mutex poisoned")
            .iter()
            .filter(|entry| entry.called_at().map_or(false, |at| at >= since))
            .cloned()
            .collect())
    }

    fn append(&self, entry: CallLogEntry) -> Result<(), RepositoryError> {
        self.entries.lock().expect("history mutex poisoned").push(entry);
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct MemoryConfig {
    entries: Mutex<BTreeMap<String, ConfigEntry>>,
}

impl MemoryConfig {
    pub(super) fn set(&self, key: &str, value: Value) {
        self.upsert(ConfigEntry {
            key: key.to_string(),
            value,
            updated_by: Some("fixture".to_string()),
            updated_at: now(),
        })
        .expect("memory upsert");
    }
}

impl ConfigStore for MemoryConfig {
    fn entries(&self) -> Result<Vec<ConfigEntry>, RepositoryError> {
        Ok(self
            .entries
            .lock()
            .expect("config mutex poisoned")
            .values()
            .cloned()
            .collect())
    }

    fn upsert(&self, entry: ConfigEntry) -> Result<Option<Value>, RepositoryError> {
        Ok(self
            .entries
            .lock()
            .expect("config mutex poisoned")
            .insert(entry.key.clone(), entry)
            .map(|previous| previous.value))
    }
}

#[derive(Default)]
pub(super) struct MemoryAudit {
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditLog for MemoryAudit {
    fn record(&self, entry: AuditEntry) -> Result<(), RepositoryError> {
        self.entries.lock().expect("audit mutex poisoned").push(entry);
        Ok(())
    }

    fn entries(&self, limit: usize) -> Result<Vec<AuditEntry>, RepositoryError> {
        Ok(self
            .entries
            .lock()
            .expect("audit mutex poisoned")
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(super) struct StaticSource {
    records: Mutex<Vec<RawCandidate>>,
    pub(super) failure: Mutex<Option<String>>,
}

impl StaticSource {
    pub(super) fn set(&self, records: Vec<RawCandidate>) {
        *self.records.lock().expect("source mutex poisoned") = records;
    }
}

#[async_trait]
impl CandidateSource for StaticSource {
    async fn fetch(&self) -> Result<Vec<RawCandidate>, SourceError> {
        if let Some(message) = self.failure.lock().expect("source mutex poisoned").clone() {
            return Err(SourceError::Transport(message));
        }
        Ok(self.records.lock().expect("source mutex poisoned").clone())
    }
}

pub(super) struct RecordingVoice {
    timeline: Timeline,
    requests: Mutex<Vec<CallRequest>>,
    pub(super) failing_candidates: Mutex<HashSet<String>>,
}

impl RecordingVoice {
    pub(super) fn requests(&self) -> Vec<CallRequest> {
        self.requests.lock().expect("voice mutex poisoned").clone()
    }

    pub(super) fn fail_for(&self, candidate_id: &str) {
        self.failing_candidates
            .lock()
            .expect("voice mutex poisoned")
            .insert(candidate_id.to_string());
    }
}

#[async_trait]
impl VoiceCallProvider for RecordingVoice {
    async fn place_call(&self, request: &CallRequest) -> Result<PlacedCall, IntegrationError> {
        self.timeline.push(format!("call:{}", request.candidate_id));
        self.requests
            .lock()
            .expect("voice mutex poisoned")
            .push(request.clone());

        let failing = self
            .failing_candidates
            .lock()
            .expect("voice mutex poisoned")
            .contains(&request.candidate_id);
        if failing {
            return Err(IntegrationError::new("vapi", "Vapi 500: line busy"));
        }
        Ok(PlacedCall {
            call_id: format!("call-{}", request.candidate_id),
            created_at: Some(now()),
        })
    }
}

pub(super) struct RecordingPacer {
    timeline: Timeline,
    pub(super) intervals: Mutex<Vec<Duration>>,
}

#[async_trait]
impl CallPacer for RecordingPacer {
    async fn pause(&self, interval: Duration) {
        self.timeline.push("pause".to_string());
        self.intervals
            .lock()
            .expect("pacer mutex poisoned")
            .push(interval);
    }
}

/// Messaging, CRM and analytics double; records every payload and can be told to fail.
#[derive(Default)]
pub(super) struct RecordingFollowUps {
    pub(super) messages: Mutex<Vec<ScreeningMessage>>,
    pub(super) contacts: Mutex<Vec<CrmContact>>,
    pub(super) tracked: Mutex<Vec<String>>,
    pub(super) fail_messaging: AtomicBool,
    pub(super) fail_crm: AtomicBool,
}

#[async_trait]
impl MessagingProvider for RecordingFollowUps {
    async fn send_template(&self, message: &ScreeningMessage) -> Result<(), IntegrationError> {
        if self.fail_messaging.load(Ordering::SeqCst) {
            return Err(IntegrationError::new("whatsapp", "template rejected"));
        }
        self.messages
            .lock()
            .expect("follow-up mutex poisoned")
            .push(message.clone());
        Ok(())
    }
}

#[async_trait]
impl CrmSync for RecordingFollowUps {
    async fn sync_contact(&self, contact: &CrmContact) -> Result<(), IntegrationError> {
        if self.fail_crm.load(Ordering::SeqCst) {
            return Err(IntegrationError::not_configured("activecampaign", "ACTIVECAMPAIGN_API_KEY"));
        }
        self.contacts
            .lock()
            .expect("follow-up mutex poisoned")
            .push(contact.clone());
        Ok(())
    }
}

#[async_trait]
impl AnalyticsTracker for RecordingFollowUps {
    async fn track_called(&self, email: &str) -> Result<(), IntegrationError> {
        self.tracked
            .lock()
            .expect("follow-up mutex poisoned")
            .push(email.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct RecordingAlerts {
    alerts: Mutex<Vec<AlertMessage>>,
}

impl RecordingAlerts {
    pub(super) fn alerts(&self) -> Vec<AlertMessage> {
        self.alerts.lock().expect("alert mutex poisoned").clone()
    }
}

#[async_trait]
impl AlertNotifier for RecordingAlerts {
    async fn notify(&self, alert: &AlertMessage) -> Result<(), IntegrationError> {
        self.alerts
            .lock()
            .expect("alert mutex poisoned")
            .push(alert.clone());
        Ok(())
    }
}

pub(super) struct FixedClock;

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        now()
    }
}

pub(super) struct Harness {
    pub(super) orchestrator: Arc<PipelineOrchestrator>,
    pub(super) runs: Arc<MemoryRuns>,
    pub(super) history: Arc<MemoryHistory>,
    pub(super) config: Arc<MemoryConfig>,
    pub(super) audit: Arc<MemoryAudit>,
    pub(super) source: Arc<StaticSource>,
    pub(super) voice: Arc<RecordingVoice>,
    pub(super) pacer: Arc<RecordingPacer>,
    pub(super) follow_ups: Arc<RecordingFollowUps>,
    pub(super) alerts: Arc<RecordingAlerts>,
    pub(super) timeline: Timeline,
}

pub(super) fn harness(records: Vec<RawCandidate>) -> Harness {
    let timeline = Timeline::default();
    let runs = Arc::new(MemoryRuns {
        timeline: timeline.clone(),
        ..MemoryRuns::default()
    });
    let history = Arc::new(MemoryHistory::default());
    let config = Arc::new(MemoryConfig::default());
    let audit = Arc::new(MemoryAudit::default());
    let source = Arc::new(StaticSource::default());
    source.set(records);
    let voice = Arc::new(RecordingVoice {
        timeline: timeline.clone(),
        requests: Mutex::new(Vec::new()),
        failing_candidates: Mutex::new(HashSet::new()),
    });
    let pacer = Arc::new(RecordingPacer {
        timeline: timeline.clone(),
        intervals: Mutex::new(Vec::new()),
    });
    let follow_ups = Arc::new(RecordingFollowUps::default());
    let alerts = Arc::new(RecordingAlerts::default());

    let stores = PipelineStores {
        runs: runs.clone(),
        history: history.clone(),
        config: config.clone(),
        audit: audit.clone(),
    };
    let collaborators = PipelineCollaborators {
        source: source.clone(),
        voice: voice.clone(),
        messaging: follow_ups.clone(),
        crm: follow_ups.clone(),
        analytics: follow_ups.clone(),
        alerts: alerts.clone(),
    };
    let orchestrator = PipelineOrchestrator::new(stores, collaborators)
        .with_clock(Arc::new(FixedClock))
        .with_pacer(pacer.clone())
        .with_settings(ExecutionSettings {
            call_spacing: Duration::from_secs(15),
            persist_batch_size: 2,
        });

    Harness {
        orchestrator: Arc::new(orchestrator),
        runs,
        history,
        config,
        audit,
        source,
        voice,
        pacer,
        follow_ups,
        alerts,
        timeline,
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
