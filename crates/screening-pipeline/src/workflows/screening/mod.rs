//! Candidate screening pipeline core.
//!
//! Pure stages run leaf-first for each candidate: [`gates`], [`selection`], [`formatter`],
//! [`phone`] and [`scoring`], then [`quota`] ranks the scored set. The [`orchestrator`]
//! sequences them into a persisted two-phase run (prepare, then execute) against the
//! storage contracts in [`repository`] and the outbound services in [`collaborators`].

pub mod collaborators;
pub mod dates;
pub mod domain;
pub mod formatter;
pub mod gates;
pub mod orchestrator;
pub mod phone;
pub mod quota;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod selection;
pub mod settings;

#[cfg(test)]
mod tests;

pub use collaborators::{
    AlertMessage, AlertNotifier, AnalyticsTracker, CallPacer, CallRequest, CandidateSource, Clock,
    CrmContact, CrmSync, IntegrationError, MessagingProvider, PlacedCall, ScreeningMessage,
    SourceError, SystemClock, TokioPacer, VoiceCallProvider,
};
pub use domain::{CallLogEntry, CallType, LegacyDate, OptOutFlag, RawCandidate, SelectionReason};
pub use gates::{apply_gates, GateDetails, GateOutcome};
pub use orchestrator::{
    ExecutionSettings, OverrideAction, PipelineCollaborators, PipelineError,
    PipelineOrchestrator, PipelineStores,
};
pub use phone::{validate_phone, PhoneValidation, PhoneValidationReason};
pub use quota::apply_quota;
pub use repository::{
    AuditAction, AuditEntry, AuditLog, CallHistoryStore, CandidateDecision, ConfigEntry,
    ConfigStore, DecisionFilter, DecisionId, ExecutionStatus, PipelineRepository, PipelineRun,
    RepositoryError, RunId, RunStats, RunStatus, RunUpdate, TriggerType,
};
pub use router::{pipeline_router, PipelineApiState, TriggerMode};
pub use scoring::{score_candidate, ScoreBreakdown, ScoredCandidate};
pub use selection::{select_job, JobSelection};
pub use settings::{ConfigKey, ConfigUpdateError, PipelineConfig};
