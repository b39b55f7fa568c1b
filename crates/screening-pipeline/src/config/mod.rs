use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub pipeline: PipelineRuntimeConfig,
    pub integrations: IntegrationSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let pipeline = PipelineRuntimeConfig {
            cron_secret: optional_var("CRON_SECRET"),
            call_spacing_secs: numeric_var("PIPELINE_CALL_SPACING_SECS", 15)?,
            persist_batch_size: numeric_var("PIPELINE_PERSIST_BATCH_SIZE", 500)?,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            pipeline,
            integrations: IntegrationSettings::from_env(),
        })
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn numeric_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional_var(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
        None => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Process-level knobs for the run orchestrator. Campaign settings such as the daily quota
/// live in the config store instead, see `PipelineConfig`.
#[derive(Debug, Clone)]
pub struct PipelineRuntimeConfig {
    pub cron_secret: Option<String>,
    pub call_spacing_secs: u64,
    pub persist_batch_size: usize,
}

impl PipelineRuntimeConfig {
    pub fn call_spacing(&self) -> Duration {
        Duration::from_secs(self.call_spacing_secs)
    }
}

impl Default for PipelineRuntimeConfig {
    fn default() -> Self {
        Self {
            cron_secret: None,
            call_spacing_secs: 15,
            persist_batch_size: 500,
        }
    }
}

/// Credentials and identifiers for the external providers. Every field is optional; an
/// adapter without its credentials reports "not configured" instead of failing at startup.
#[derive(Debug, Clone, Default)]
pub struct IntegrationSettings {
    pub trevor_report_url: Option<String>,
    pub vapi_api_key: Option<String>,
    pub vapi_assistant_id: Option<String>,
    pub vapi_phone_number_id: Option<String>,
    pub whatsapp_access_token: Option<String>,
    pub whatsapp_phone_number_id: Option<String>,
    pub whatsapp_template_name: Option<String>,
    pub activecampaign_api_url: Option<String>,
    pub activecampaign_api_key: Option<String>,
    pub activecampaign_list_id: Option<String>,
    pub heap_app_id: Option<String>,
    pub slack_bot_token: Option<String>,
    pub slack_channel_id: Option<String>,
}

impl IntegrationSettings {
    pub fn from_env() -> Self {
        Self {
            trevor_report_url: optional_var("TREVOR_REPORT_URL"),
            vapi_api_key: optional_var("VAPI_API_KEY"),
            vapi_assistant_id: optional_var("VAPI_ASSISTANT_ID"),
            vapi_phone_number_id: optional_var("VAPI_PHONE_NUMBER_ID"),
            whatsapp_access_token: optional_var("WHATSAPP_ACCESS_TOKEN"),
            whatsapp_phone_number_id: optional_var("WHATSAPP_PHONE_NUMBER_ID"),
            whatsapp_template_name: optional_var("WHATSAPP_TEMPLATE_NAME"),
            activecampaign_api_url: optional_var("ACTIVECAMPAIGN_API_URL"),
            activecampaign_api_key: optional_var("ACTIVECAMPAIGN_API_KEY"),
            activecampaign_list_id: optional_var("ACTIVECAMPAIGN_LIST_ID"),
            heap_app_id: optional_var("HEAP_APP_ID"),
            slack_bot_token: optional_var("SLACK_BOT_TOKEN"),
            slack_channel_id: optional_var("SLACK_CHANNEL_ID"),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be a non-negative integer (found '{value}')")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
