use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dates::{days_between, hours_between};
use super::domain::{CallLogEntry, CallType, RawCandidate, SelectionReason};
use super::settings::PipelineConfig;

/// The job a candidate will be called about, and how the call is classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSelection {
    pub job_id: String,
    pub job_title: String,
    pub company: String,
    pub reason: SelectionReason,
    pub call_type: CallType,
    pub call_number: u32,
}

/// Completed-call history of one open job request.
struct JobSummary<'a> {
    record: &'a RawCandidate,
    requested_at: DateTime<Utc>,
    last_call_at: Option<DateTime<Utc>>,
    total_calls: usize,
}

/// Verdict for one job in the newest-first walk.
enum ScanStep {
    Select(JobSelection),
    SkipAndContinue,
    /// A newer job already has a relationship that is not yet due; older jobs must not be
    /// picked in its place.
    SkipAndStop,
}

/// Pick at most one job to call a candidate about. `records` are all open job requests
/// sharing one candidate id. `None` means the candidate has nothing callable today.
pub fn select_job(
    records: &[RawCandidate],
    call_history: &[CallLogEntry],
    config: &PipelineConfig,
    now: DateTime<Utc>,
) -> Option<JobSelection> {
    let candidate_id = &records.first()?.candidate_id;

    let candidate_calls: Vec<&CallLogEntry> = call_history
        .iter()
        .filter(|entry| &entry.candidate_id == candidate_id && entry.is_completed())
        .collect();

    let mut calls_by_job: HashMap<&str, Vec<&CallLogEntry>> = HashMap::new();
    for entry in &candidate_calls {
        calls_by_job.entry(entry.job_id.as_str()).or_default().push(entry);
    }

    let last_call_any_job = latest_call(candidate_calls.iter().copied());

    let mut jobs: Vec<JobSummary<'_>> = records
        .iter()
        .filter_map(|record| {
            let requested_at = record.requested_at()?;
            let job_calls = calls_by_job
                .get(record.job_id.as_str())
                .map(Vec::as_slice)
                .unwrap_or_default();
            Some(JobSummary {
                record,
                requested_at,
                last_call_at: latest_call(job_calls.iter().copied()),
                total_calls: job_calls.len(),
            })
        })
        .collect();
    jobs.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));

    for job in &jobs {
        match assess_job(job, candidate_calls.len(), last_call_any_job, config, now) {
            ScanStep::Select(selection) => return Some(selection),
            ScanStep::SkipAndContinue => continue,
            ScanStep::SkipAndStop => return None,
        }
    }

    None
}

fn assess_job(
    job: &JobSummary<'_>,
    candidate_call_count: usize,
    last_call_any_job: Option<DateTime<Utc>>,
    config: &PipelineConfig,
    now: DateTime<Utc>,
) -> ScanStep {
    if hours_between(job.requested_at, now) < config.job_age_minimum_hours {
        return ScanStep::SkipAndContinue;
    }
    if job.total_calls >= config.max_calls_per_job {
        return ScanStep::SkipAndContinue;
    }

    if job.total_calls == 0 {
        if candidate_call_count > 0 {
            // Called about another job; treat a usable timestamp as the chase clock.
            if let Some(last_call) = last_call_any_job {
                return if days_between(last_call, now) >= config.chase_interval_days {
                    ScanStep::Select(selection(job, SelectionReason::ChaseEligible, 1))
                } else {
                    ScanStep::SkipAndContinue
                };
            }
        }
        return ScanStep::Select(selection(job, SelectionReason::NeverCalled, 1));
    }

    match job.last_call_at {
        Some(last_call) if days_between(last_call, now) >= config.chase_interval_days => {
            let call_number = u32::try_from(job.total_calls + 1).unwrap_or(u32::MAX);
            ScanStep::Select(selection(job, SelectionReason::ChaseEligible, call_number))
        }
        Some(_) => ScanStep::SkipAndStop,
        None => ScanStep::SkipAndContinue,
    }
}

fn selection(job: &JobSummary<'_>, reason: SelectionReason, call_number: u32) -> JobSelection {
    let call_type = match reason {
        SelectionReason::NeverCalled => CallType::Initial,
        SelectionReason::ChaseEligible => CallType::Chase,
    };

    JobSelection {
        job_id: job.record.job_id.clone(),
        job_title: job.record.job_title.clone(),
        company: job.record.company_requested.clone(),
        reason,
        call_type,
        call_number,
    }
}

fn latest_call<'a, I>(calls: I) -> Option<DateTime<Utc>>
where
    I: IntoIterator<Item = &'a CallLogEntry>,
{
    calls.into_iter().filter_map(CallLogEntry::called_at).max()
}
