use std::collections::HashMap;

use super::scoring::ScoredCandidate;
use super::settings::PipelineConfig;

const UNKNOWN_COMPANY: &str = "Unknown";

/// Rank by score (stable, highest first) and keep at most `daily_quota` candidates,
/// skipping any whose company already reached its cap when caps are enabled.
pub fn apply_quota(
    mut candidates: Vec<ScoredCandidate>,
    config: &PipelineConfig,
) -> Vec<ScoredCandidate> {
    candidates.sort_by(|a, b| b.priority_score.cmp(&a.priority_score));

    if !config.company_limits.enabled {
        candidates.truncate(config.daily_quota);
        return candidates;
    }

    let mut admitted_per_company: HashMap<String, usize> = HashMap::new();
    let mut selected = Vec::with_capacity(config.daily_quota.min(candidates.len()));

    for candidate in candidates {
        if selected.len() >= config.daily_quota {
            break;
        }

        let company = if candidate.candidate.company.is_empty() {
            UNKNOWN_COMPANY.to_string()
        } else {
            candidate.candidate.company.clone()
        };
        let admitted = admitted_per_company.entry(company).or_insert(0);
        if *admitted < config.company_limits.max_per_company {
            *admitted += 1;
            selected.push(candidate);
        }
    }

    selected
}
