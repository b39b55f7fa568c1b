use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dates::{hours_between, parse_legacy_date};
use super::domain::CallType;
use super::formatter::FormattedCandidate;
use super::settings::PipelineConfig;

const INITIAL_TYPE_BONUS: u32 = 100;
const CHASE_TYPE_BONUS: u32 = 50;
const INITIAL_CALL_BONUS: u32 = 25;

/// Freshness bands as (exclusive upper bound in hours, bonus), narrowest first.
/// The middle band closes at 96h, not the earlier 120h, so a 100h request earns 10.
const FRESHNESS_BANDS: [(f64, u32); 3] = [(72.0, 30), (96.0, 20), (168.0, 10)];

/// Additive components of a priority score, kept for audit display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub stage_bonus: u32,
    pub type_bonus: u32,
    pub freshness_bonus: u32,
    pub initial_bonus: u32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u32 {
        self.stage_bonus
            .saturating_add(self.type_bonus)
            .saturating_add(self.freshness_bonus)
            .saturating_add(self.initial_bonus)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: FormattedCandidate,
    pub priority_score: u32,
    pub breakdown: ScoreBreakdown,
}

pub fn score_candidate(
    candidate: FormattedCandidate,
    config: &PipelineConfig,
    now: DateTime<Utc>,
) -> ScoredCandidate {
    let stage_bonus = if candidate.stage_name.to_lowercase().contains("screening") {
        config.screening_stage_bonus
    } else {
        0
    };

    let (type_bonus, initial_bonus) = match candidate.call_type {
        CallType::Initial => (INITIAL_TYPE_BONUS, INITIAL_CALL_BONUS),
        CallType::Chase => (CHASE_TYPE_BONUS, 0),
    };

    let freshness_bonus = candidate
        .request_date
        .as_ref()
        .and_then(parse_legacy_date)
        .map(|requested_at| freshness_bonus(hours_between(requested_at, now)))
        .unwrap_or(0);

    let breakdown = ScoreBreakdown {
        stage_bonus,
        type_bonus,
        freshness_bonus,
        initial_bonus,
    };

    ScoredCandidate {
        priority_score: breakdown.total(),
        candidate,
        breakdown,
    }
}

fn freshness_bonus(hours_old: f64) -> u32 {
    FRESHNESS_BANDS
        .iter()
        .find(|(limit, _)| hours_old < *limit)
        .map(|(_, bonus)| *bonus)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::screening::domain::{LegacyDate, SelectionReason};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).single().expect("valid now")
    }

    fn formatted(stage: &str, call_type: CallType, hours_old: i64) -> FormattedCandidate {
        FormattedCandidate {
            candidate_id: "cand-1".to_string(),
            candidate_name: "Ada Lovelace".to_string(),
            first_name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            phone: "447700900123".to_string(),
            phone_formatted: "+447700900123".to_string(),
            job_id: "job-1".to_string(),
            job_title: "Analyst".to_string(),
            company: "Acme".to_string(),
            request_date: Some(LegacyDate::from_instant(now() - Duration::hours(hours_old))),
            stage_name: stage.to_string(),
            call_type,
            call_number: 1,
            selection_reason: SelectionReason::NeverCalled,
        }
    }

    #[test]
    fn screening_initial_request_at_one_hundred_hours_scores_335() {
        let scored = score_candidate(
            formatted("Technical Screening", CallType::Initial, 100),
            &PipelineConfig::default(),
            now(),
        );
        assert_eq!(
            scored.breakdown,
            ScoreBreakdown {
                stage_bonus: 200,
                type_bonus: 100,
                freshness_bonus: 10,
                initial_bonus: 25,
            }
        );
        assert_eq!(scored.priority_score, 335);
    }

    #[test]
    fn chase_outside_screening_gets_type_bonus_only() {
        let scored = score_candidate(
            formatted("Interview", CallType::Chase, 400),
            &PipelineConfig::default(),
            now(),
        );
        assert_eq!(scored.priority_score, 50);
        assert_eq!(scored.breakdown.initial_bonus, 0);
        assert_eq!(scored.breakdown.stage_bonus, 0);
    }

    #[test]
    fn freshness_bands_decrease_with_age() {
        assert_eq!(freshness_bonus(0.0), 30);
        assert_eq!(freshness_bonus(71.9), 30);
        assert_eq!(freshness_bonus(72.0), 20);
        assert_eq!(freshness_bonus(95.9), 20);
        assert_eq!(freshness_bonus(96.0), 10);
        assert_eq!(freshness_bonus(167.9), 10);
        assert_eq!(freshness_bonus(168.0), 0);
    }

    #[test]
    fn score_always_equals_breakdown_sum() {
        for stage in ["screening", "SCREENING CALL", "offer", ""] {
            for call_type in [CallType::Initial, CallType::Chase] {
                for hours in [1, 80, 120, 500] {
                    let mut config = PipelineConfig::default();
                    config.screening_stage_bonus = 17;
                    let scored = score_candidate(formatted(stage, call_type, hours), &config, now());
                    assert_eq!(scored.priority_score, scored.breakdown.total());
                }
            }
        }
    }

    #[test]
    fn oversized_stage_bonus_saturates_instead_of_overflowing() {
        let mut config = PipelineConfig::default();
        config.screening_stage_bonus = u32::MAX;
        let scored = score_candidate(formatted("screening", CallType::Initial, 1), &config, now());
        assert_eq!(scored.breakdown.stage_bonus, u32::MAX);
        assert_eq!(scored.priority_score, u32::MAX);
    }

    #[test]
    fn unparsable_request_date_earns_no_freshness() {
        let mut candidate = formatted("screening", CallType::Initial, 1);
        candidate.request_date = Some(LegacyDate::Text("whenever".to_string()));
        let scored = score_candidate(candidate, &PipelineConfig::default(), now());
        assert_eq!(scored.breakdown.freshness_bonus, 0);
    }
}
