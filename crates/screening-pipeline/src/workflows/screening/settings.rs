use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::repository::{AuditAction, AuditEntry, AuditLog, ConfigEntry, ConfigStore, RepositoryError};

/// Largest accepted `screening_stage_bonus`.
pub const MAX_SCREENING_STAGE_BONUS: u32 = 100_000;

/// Campaign settings consumed by every pipeline stage. A run freezes a copy at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub daily_quota: usize,
    pub buffer_hours: f64,
    pub max_monthly_calls: usize,
    pub max_calls_per_job: usize,
    pub chase_interval_days: f64,
    pub job_age_minimum_hours: f64,
    pub screening_stage_bonus: u32,
    pub company_limits: CompanyLimits,
    pub gates_enabled: GateToggles,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            daily_quota: 10_000,
            buffer_hours: 48.0,
            max_monthly_calls: 6,
            max_calls_per_job: 6,
            chase_interval_days: 2.0,
            job_age_minimum_hours: 12.0,
            screening_stage_bonus: 200,
            company_limits: CompanyLimits::default(),
            gates_enabled: GateToggles::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyLimits {
    pub enabled: bool,
    pub max_per_company: usize,
}

impl Default for CompanyLimits {
    fn default() -> Self {
        Self {
            enabled: false,
            max_per_company: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateToggles {
    pub compliance: bool,
    pub buffer: bool,
    pub volume: bool,
}

impl Default for GateToggles {
    fn default() -> Self {
        Self {
            compliance: true,
            buffer: true,
            volume: true,
        }
    }
}

/// Names under which each setting is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    DailyQuota,
    BufferHours,
    MaxMonthlyCalls,
    MaxCallsPerJob,
    ChaseIntervalDays,
    JobAgeMinimumHours,
    ScreeningStageBonus,
    CompanyLimits,
    GatesEnabled,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 9] = [
        ConfigKey::DailyQuota,
        ConfigKey::BufferHours,
        ConfigKey::MaxMonthlyCalls,
        ConfigKey::MaxCallsPerJob,
        ConfigKey::ChaseIntervalDays,
        ConfigKey::JobAgeMinimumHours,
        ConfigKey::ScreeningStageBonus,
        ConfigKey::CompanyLimits,
        ConfigKey::GatesEnabled,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ConfigKey::DailyQuota => "daily_quota",
            ConfigKey::BufferHours => "buffer_hours",
            ConfigKey::MaxMonthlyCalls => "max_monthly_calls",
            ConfigKey::MaxCallsPerJob => "max_calls_per_job",
            ConfigKey::ChaseIntervalDays => "chase_interval_days",
            ConfigKey::JobAgeMinimumHours => "job_age_minimum_hours",
            ConfigKey::ScreeningStageBonus => "screening_stage_bonus",
            ConfigKey::CompanyLimits => "company_limits",
            ConfigKey::GatesEnabled => "gates_enabled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == raw)
    }
}

/// Validation failure for a single setting write.
#[derive(Debug, thiserror::Error)]
pub enum ConfigUpdateError {
    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
    #[error("invalid value for '{key}': {source}")]
    InvalidValue {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("'{key}' must not be negative")]
    Negative { key: &'static str },
    #[error("'{key}' must not exceed {max}")]
    TooLarge { key: &'static str, max: u64 },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl PipelineConfig {
    /// Overlay stored entries onto the defaults. Unknown keys and malformed values are
    /// skipped so one bad row cannot take the whole campaign down.
    pub fn merged<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        let mut config = Self::default();
        for (key, value) in entries {
            if let Err(err) = config.apply(key, value) {
                warn!(%key, error = %err, "ignoring stored pipeline setting");
            }
        }
        config
    }

    /// Set one named value, validating its shape.
    pub fn apply(&mut self, key: &str, value: &Value) -> Result<ConfigKey, ConfigUpdateError> {
        let parsed = ConfigKey::parse(key).ok_or_else(|| ConfigUpdateError::UnknownKey(key.to_string()))?;
        let name = parsed.as_str();
        let invalid = |source| ConfigUpdateError::InvalidValue { key: name, source };

        match parsed {
            ConfigKey::DailyQuota => self.daily_quota = from_value(value).map_err(invalid)?,
            ConfigKey::BufferHours => self.buffer_hours = non_negative(name, value)?,
            ConfigKey::MaxMonthlyCalls => {
                self.max_monthly_calls = from_value(value).map_err(invalid)?
            }
            ConfigKey::MaxCallsPerJob => {
                self.max_calls_per_job = from_value(value).map_err(invalid)?
            }
            ConfigKey::ChaseIntervalDays => self.chase_interval_days = non_negative(name, value)?,
            ConfigKey::JobAgeMinimumHours => {
                self.job_age_minimum_hours = non_negative(name, value)?
            }
            ConfigKey::ScreeningStageBonus => {
                let bonus: u32 = from_value(value).map_err(invalid)?;
                if bonus > MAX_SCREENING_STAGE_BONUS {
                    return Err(ConfigUpdateError::TooLarge {
                        key: name,
                        max: u64::from(MAX_SCREENING_STAGE_BONUS),
                    });
                }
                self.screening_stage_bonus = bonus;
            }
            ConfigKey::CompanyLimits => self.company_limits = from_value(value).map_err(invalid)?,
            ConfigKey::GatesEnabled => self.gates_enabled = from_value(value).map_err(invalid)?,
        }

        Ok(parsed)
    }
}

fn from_value<T: for<'de> Deserialize<'de>>(value: &Value) -> Result<T, serde_json::Error> {
    T::deserialize(value)
}

fn non_negative(key: &'static str, value: &Value) -> Result<f64, ConfigUpdateError> {
    let parsed: f64 =
        from_value(value).map_err(|source| ConfigUpdateError::InvalidValue { key, source })?;
    if !parsed.is_finite() || parsed < 0.0 {
        return Err(ConfigUpdateError::Negative { key });
    }
    Ok(parsed)
}

/// Current settings merged over defaults. A store outage degrades to the defaults.
pub fn load_pipeline_config(store: &dyn ConfigStore) -> PipelineConfig {
    match store.entries() {
        Ok(entries) => {
            PipelineConfig::merged(entries.iter().map(|entry| (entry.key.as_str(), &entry.value)))
        }
        Err(err) => {
            warn!(error = %err, "failed to load pipeline config, using defaults");
            PipelineConfig::default()
        }
    }
}

/// Validate and persist one setting, then record the change in the audit log.
pub fn update_pipeline_setting(
    store: &dyn ConfigStore,
    audit: &dyn AuditLog,
    key: &str,
    value: Value,
    actor: Option<&str>,
    now: DateTime<Utc>,
) -> Result<AuditEntry, ConfigUpdateError> {
    let mut scratch = PipelineConfig::default();
    let parsed = scratch.apply(key, &value)?;

    let previous = store.upsert(ConfigEntry {
        key: parsed.as_str().to_string(),
        value: value.clone(),
        updated_by: actor.map(str::to_string),
        updated_at: now,
    })?;

    let entry = AuditEntry {
        actor: actor.map(str::to_string),
        action: AuditAction::ConfigChange,
        entity_type: "pipeline_config".to_string(),
        entity_id: parsed.as_str().to_string(),
        old_value: previous,
        new_value: value,
        recorded_at: now,
    };
    if let Err(err) = audit.record(entry.clone()) {
        warn!(key = parsed.as_str(), error = %err, "failed to write config audit entry");
    }

    Ok(entry)
}
