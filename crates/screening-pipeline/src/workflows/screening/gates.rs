use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::dates::hours_between;
use super::domain::{CallLogEntry, OptOutFlag, RawCandidate};
use super::settings::PipelineConfig;

/// Trailing window used by the volume gate and by the history query.
pub const VOLUME_WINDOW_DAYS: i64 = 30;

/// Independent verdicts of the three compliance rules. The caller combines them, so a
/// reviewer can see exactly which rule blocked a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateOutcome {
    pub compliance: bool,
    pub buffer: bool,
    pub volume: bool,
    pub details: GateDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDetails {
    pub opt_out_status: OptOutFlag,
    pub last_call_at: Option<DateTime<Utc>>,
    pub hours_since_last_call: Option<f64>,
    pub calls_in_30d: usize,
    pub failure_reasons: Vec<String>,
}

/// Evaluate the compliance, buffer and volume gates for one candidate.
pub fn apply_gates(
    candidate: &RawCandidate,
    call_history: &[CallLogEntry],
    config: &PipelineConfig,
    now: DateTime<Utc>,
) -> GateOutcome {
    let mut failure_reasons = Vec::new();

    let completed_calls: Vec<DateTime<Utc>> = call_history
        .iter()
        .filter(|entry| entry.candidate_id == candidate.candidate_id && entry.is_completed())
        .filter_map(CallLogEntry::called_at)
        .collect();

    let compliance = !(config.gates_enabled.compliance && candidate.opt_out_status.is_opted_out());
    if !compliance {
        failure_reasons.push("Opted out".to_string());
    }

    let mut buffer = true;
    let mut last_call_at = None;
    let mut hours_since_last_call = None;
    if config.gates_enabled.buffer {
        if let Some(latest) = completed_calls.iter().max().copied() {
            let hours = hours_between(latest, now);
            last_call_at = Some(latest);
            hours_since_last_call = Some(hours);

            if hours < config.buffer_hours {
                buffer = false;
                failure_reasons.push(format!(
                    "Called {}h ago (need {}h+)",
                    hours.round(),
                    config.buffer_hours
                ));
            }
        }
    }

    let window_start = now - Duration::days(VOLUME_WINDOW_DAYS);
    let calls_in_30d = completed_calls
        .iter()
        .filter(|called_at| **called_at >= window_start)
        .count();
    let volume = !(config.gates_enabled.volume && calls_in_30d >= config.max_monthly_calls);
    if !volume {
        failure_reasons.push(format!(
            "{} calls in 30 days (limit: {})",
            calls_in_30d, config.max_monthly_calls
        ));
    }

    GateOutcome {
        compliance,
        buffer,
        volume,
        details: GateDetails {
            opt_out_status: candidate.opt_out_status.clone(),
            last_call_at,
            hours_since_last_call,
            calls_in_30d,
            failure_reasons,
        },
    }
}
