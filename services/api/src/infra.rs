use metrics_exporter_prometheus::PrometheusHandle;
use screening_pipeline::config::AppConfig;
use screening_pipeline::error::AppError;
use screening_pipeline::integrations::{
    http_client, ActiveCampaignSync, HeapTracker, SlackNotifier, TrevorReportSource,
    VapiCallProvider, WhatsAppMessenger,
};
use screening_pipeline::workflows::screening::{
    AuditEntry, AuditLog, CallHistoryStore, CallLogEntry, CandidateDecision, CandidateSource,
    ConfigEntry, ConfigStore, DecisionFilter, DecisionId, ExecutionSettings,
    PipelineCollaborators, PipelineOrchestrator, PipelineRepository, PipelineRun, PipelineStores,
    RepositoryError, RunId, RunUpdate,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryPipelineRepository {
    runs: Arc<Mutex<HashMap<RunId, PipelineRun>>>,
    decisions: Arc<Mutex<Vec<CandidateDecision>>>,
}

impl PipelineRepository for InMemoryPipelineRepository {
    fn insert_run(&self, run: PipelineRun) -> Result<PipelineRun, RepositoryError> {
        let mut guard = self.runs.lock().expect("run mutex poisoned");
        if guard.contains_key(&run.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(run.id, run.clone());
        Ok(run)
    }

    fn fetch_run(&self, id: &RunId) -> Result<Option<PipelineRun>, RepositoryError> {
        let guard = self.runs.lock().expect("run mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn update_run(&self, id: &RunId, update: RunUpdate) -> Result<PipelineRun, RepositoryError> {
        let mut guard = self.runs.lock().expect("run mutex poisoned");
        let run = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        run.apply(update);
        Ok(run.clone())
    }

    fn list_runs(&self, limit: usize) -> Result<Vec<PipelineRun>, RepositoryError> {
        let guard = self.runs.lock().expect("run mutex poisoned");
        let mut runs: Vec<PipelineRun> = guard.values().cloned().collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs.truncate(limit);
        Ok(runs)
    }

    fn insert_decisions(&self, decisions: Vec<CandidateDecision>) -> Result<(), RepositoryError> {
        let mut guard = self.decisions.lock().expect("decision mutex poisoned");
        let duplicate = decisions.iter().enumerate().any(|(index, decision)| {
            guard
                .iter()
                .chain(decisions[..index].iter())
                .any(|existing| {
                    existing.run_id == decision.run_id
                        && existing.candidate_id == decision.candidate_id
                })
        });
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        guard.extend(decisions);
        Ok(())
    }

    fn update_decision(&self, decision: CandidateDecision) -> Result<(), RepositoryError> {
        let mut guard = self.decisions.lock().expect("decision mutex poisoned");
        match guard.iter_mut().find(|existing| existing.id == decision.id) {
            Some(slot) => {
                *slot = decision;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch_decision(&self, id: &DecisionId) -> Result<Option<CandidateDecision>, RepositoryError> {
        let guard = self.decisions.lock().expect("decision mutex poisoned");
        Ok(guard.iter().find(|decision| decision.id == *id).cloned())
    }

    fn query_decisions(
        &self,
        filter: &DecisionFilter,
    ) -> Result<Vec<CandidateDecision>, RepositoryError> {
        let guard = self.decisions.lock().expect("decision mutex poisoned");
        let mut rows: Vec<CandidateDecision> = guard
            .iter()
            .filter(|decision| filter.matches(decision))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.priority_score.cmp(&a.priority_score));
        Ok(rows)
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryCallHistory {
    entries: Arc<Mutex<Vec<CallLogEntry>>>,
}

impl CallHistoryStore for InMemoryCallHistory {
    fn since(
        &self,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<CallLogEntry>, RepositoryError> {
        let guard = self.entries.lock().expect("call log mutex poisoned");
        Ok(guard
            .iter()
            .filter(|entry| entry.called_at().map_or(false, |at| at >= since))
            .cloned()
            .collect())
    }

    fn append(&self, entry: CallLogEntry) -> Result<(), RepositoryError> {
        self.entries
            .lock()
            .expect("call log mutex poisoned")
            .push(entry);
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryConfigStore {
    entries: Arc<Mutex<BTreeMap<String, ConfigEntry>>>,
}

impl ConfigStore for InMemoryConfigStore {
    fn entries(&self) -> Result<Vec<ConfigEntry>, RepositoryError> {
        let guard = self.entries.lock().expect("config mutex poisoned");
        Ok(guard.values().cloned().collect())
    }

    fn upsert(&self, entry: ConfigEntry) -> Result<Option<Value>, RepositoryError> {
        let mut guard = self.entries.lock().expect("config mutex poisoned");
        Ok(guard
            .insert(entry.key.clone(), entry)
            .map(|previous| previous.value))
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryAuditLog {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl AuditLog for InMemoryAuditLog {
    fn record(&self, entry: AuditEntry) -> Result<(), RepositoryError> {
        self.entries.lock().expect("audit mutex poisoned").push(entry);
        Ok(())
    }

    fn entries(&self, limit: usize) -> Result<Vec<AuditEntry>, RepositoryError> {
        let guard = self.entries.lock().expect("audit mutex poisoned");
        Ok(guard.iter().rev().take(limit).cloned().collect())
    }
}

pub(crate) fn in_memory_stores() -> PipelineStores {
    PipelineStores {
        runs: Arc::new(InMemoryPipelineRepository::default()),
        history: Arc::new(InMemoryCallHistory::default()),
        config: Arc::new(InMemoryConfigStore::default()),
        audit: Arc::new(InMemoryAuditLog::default()),
    }
}

/// Wire the HTTP provider adapters from the process configuration. `source` overrides the
/// reporting service, e.g. with a CSV export.
pub(crate) fn build_orchestrator(
    config: &AppConfig,
    stores: PipelineStores,
    source: Option<Arc<dyn CandidateSource>>,
) -> Result<PipelineOrchestrator, AppError> {
    let client = http_client().map_err(std::io::Error::other)?;
    let settings = &config.integrations;

    let source: Arc<dyn CandidateSource> = match source {
        Some(source) => source,
        None => Arc::new(TrevorReportSource::new(client.clone(), settings)),
    };
    let collaborators = PipelineCollaborators {
        source,
        voice: Arc::new(VapiCallProvider::new(client.clone(), settings)),
        messaging: Arc::new(WhatsAppMessenger::new(client.clone(), settings)),
        crm: Arc::new(ActiveCampaignSync::new(client.clone(), settings)),
        analytics: Arc::new(HeapTracker::new(client.clone(), settings)),
        alerts: Arc::new(SlackNotifier::new(client, settings)),
    };

    Ok(PipelineOrchestrator::new(stores, collaborators)
        .with_settings(ExecutionSettings::from(&config.pipeline)))
}
