//! Configuration loading for the alerting service.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `ALERTING_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::approvers::AuthorizedApprover;

const ENV_PREFIX: &str = "ALERTING_";
const REDACTED: &str = "[REDACTED]";

/// Application configuration derived from `ALERTING_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Organisation name printed in alert headers
    #[serde(default = "default_org_name")]
    pub org_name: String,
    /// Emergency room number printed in every alert footer
    #[serde(default = "default_emergency_room_phone")]
    pub emergency_room_phone: String,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub sms: SmsConfig,
    #[serde(default)]
    pub contacts: ContactDirectoryConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    /// Normalized location key -> facility layout URL overrides
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub location_layout_urls: BTreeMap<String, String>,
    /// Replaces the built-in approver registry when non-empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub approvers: Vec<AuthorizedApprover>,
}

/// Notification dispatch timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct DispatchConfig {
    /// Delay before role/duty follow-up messages are sent (default: 3000)
    #[serde(default = "default_role_followup_delay_ms")]
    pub role_followup_delay_ms: u64,
    /// Timeout applied to the contact and weather lookups (default: 10000)
    #[serde(default = "default_upstream_timeout_ms")]
    pub upstream_timeout_ms: u64,
}

impl DispatchConfig {
    pub fn role_followup_delay(&self) -> Duration {
        Duration::from_millis(self.role_followup_delay_ms)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    /// Validate dispatch timing bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream_timeout_ms == 0 {
            return Err(ConfigError::InvalidUpstreamTimeout {
                value: self.upstream_timeout_ms,
            });
        }

        if self.role_followup_delay_ms > 60_000 {
            return Err(ConfigError::InvalidFollowupDelay {
                value: self.role_followup_delay_ms,
            });
        }

        Ok(())
    }
}

/// SOLAPI messaging credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SmsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_number: Option<String>,
    #[serde(default = "default_solapi_api_base")]
    pub api_base: String,
}

impl SmsConfig {
    pub fn is_configured(&self) -> bool {
        [&self.api_key, &self.api_secret, &self.sender_number]
            .iter()
            .all(|value| value.as_deref().is_some_and(|v| !v.is_empty()))
    }
}

/// Spreadsheet-backed employee directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ContactDirectoryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheets_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_spreadsheet_id: Option<String>,
    #[serde(default = "default_sheets_api_base")]
    pub sheets_api_base: String,
}

/// KMA surface observation source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct WeatherConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kma_api_key: Option<String>,
    #[serde(default = "default_kma_api_base")]
    pub kma_api_base: String,
    /// Observation station number (106 is Donghae)
    #[serde(default = "default_kma_station")]
    pub station: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            org_name: default_org_name(),
            emergency_room_phone: default_emergency_room_phone(),
            dispatch: DispatchConfig::default(),
            sms: SmsConfig::default(),
            contacts: ContactDirectoryConfig::default(),
            weather: WeatherConfig::default(),
            location_layout_urls: BTreeMap::new(),
            approvers: Vec::new(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            role_followup_delay_ms: default_role_followup_delay_ms(),
            upstream_timeout_ms: default_upstream_timeout_ms(),
        }
    }
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_secret: None,
            sender_number: None,
            api_base: default_solapi_api_base(),
        }
    }
}

impl Default for ContactDirectoryConfig {
    fn default() -> Self {
        Self {
            sheets_api_key: None,
            employee_spreadsheet_id: None,
            sheets_api_base: default_sheets_api_base(),
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            kma_api_key: None,
            kma_api_base: default_kma_api_base(),
            station: default_kma_station(),
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    fn is_dev_profile(&self) -> bool {
        matches!(self.profile.as_str(), "local" | "test")
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        for secret in [
            &mut config.sms.api_key,
            &mut config.sms.api_secret,
            &mut config.contacts.sheets_api_key,
            &mut config.weather.kma_api_key,
        ] {
            if secret.is_some() {
                *secret = Some(REDACTED.to_string());
            }
        }
        for approver in &mut config.approvers {
            approver.phone = REDACTED.to_string();
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidLogFormat {
                value: self.log_format.clone(),
            });
        }

        self.dispatch.validate()?;

        for (field, value) in [
            ("ALERTING_SOLAPI_API_BASE", &self.sms.api_base),
            ("ALERTING_SHEETS_API_BASE", &self.contacts.sheets_api_base),
            ("ALERTING_KMA_API_BASE", &self.weather.kma_api_base),
        ] {
            Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
                field,
                value: value.clone(),
                source,
            })?;
        }

        // Alerts must actually go out outside of local development
        if !self.is_dev_profile() && !self.sms.is_configured() {
            return Err(ConfigError::MissingSmsCredentials);
        }

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_org_name() -> String {
    "GS동해전력".to_string()
}

fn default_emergency_room_phone() -> String {
    "033-820-1411".to_string()
}

fn default_role_followup_delay_ms() -> u64 {
    3000
}

fn default_upstream_timeout_ms() -> u64 {
    10_000
}

fn default_solapi_api_base() -> String {
    "https://api.solapi.com".to_string()
}

fn default_sheets_api_base() -> String {
    "https://sheets.googleapis.com".to_string()
}

fn default_kma_api_base() -> String {
    "https://apihub.kma.go.kr".to_string()
}

fn default_kma_station() -> u32 {
    106
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("log format must be 'json' or 'pretty', got '{value}'")]
    InvalidLogFormat { value: String },
    #[error("{field} is not a valid URL '{value}': {source}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        source: url::ParseError,
    },
    #[error("ALERTING_{key} must be a non-negative integer, got '{value}': {source}")]
    InvalidNumber {
        key: &'static str,
        value: String,
        source: std::num::ParseIntError,
    },
    #[error("upstream timeout must be positive, got {value}ms")]
    InvalidUpstreamTimeout { value: u64 },
    #[error("role follow-up delay must not exceed 60000ms, got {value}ms")]
    InvalidFollowupDelay { value: u64 },
    #[error(
        "SMS credentials are missing; set ALERTING_SOLAPI_API_KEY, ALERTING_SOLAPI_API_SECRET and ALERTING_SOLAPI_SENDER_NUMBER"
    )]
    MissingSmsCredentials,
    #[error("ALERTING_LOCATION_LAYOUT_URLS must be a JSON object of strings: {source}")]
    InvalidLayoutUrls { source: serde_json::Error },
    #[error("ALERTING_APPROVERS must be a JSON array of approvers: {source}")]
    InvalidApprovers { source: serde_json::Error },
}

fn parse_number<T>(
    key: &'static str,
    raw: Option<String>,
    default: fn() -> T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr<Err = std::num::ParseIntError>,
{
    let Some(value) = raw else {
        return Ok(default());
    };
    match value.trim().parse() {
        Ok(parsed) => Ok(parsed),
        Err(source) => Err(ConfigError::InvalidNumber { key, value, source }),
    }
}

/// Loads configuration using layered `.env` files and `ALERTING_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads `.env`, `.env.local`, `.env.{profile}`, `.env.{profile}.local`
    /// and finally the process environment, later sources winning.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let mut take = |key: &str| layered.remove(key).filter(|v| !v.trim().is_empty());

        let profile = take("PROFILE").unwrap_or(profile_hint);
        let api_bind_addr = take("API_BIND_ADDR").unwrap_or_else(default_api_bind_addr);
        let log_level = take("LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format = take("LOG_FORMAT").unwrap_or_else(default_log_format);
        let org_name = take("ORG_NAME").unwrap_or_else(default_org_name);
        let emergency_room_phone =
            take("EMERGENCY_ROOM_PHONE").unwrap_or_else(default_emergency_room_phone);

        let dispatch = DispatchConfig {
            role_followup_delay_ms: parse_number(
                "ROLE_FOLLOWUP_DELAY_MS",
                take("ROLE_FOLLOWUP_DELAY_MS"),
                default_role_followup_delay_ms,
            )?,
            upstream_timeout_ms: parse_number(
                "UPSTREAM_TIMEOUT_MS",
                take("UPSTREAM_TIMEOUT_MS"),
                default_upstream_timeout_ms,
            )?,
        };

        let sms = SmsConfig {
            api_key: take("SOLAPI_API_KEY"),
            api_secret: take("SOLAPI_API_SECRET"),
            sender_number: take("SOLAPI_SENDER_NUMBER"),
            api_base: take("SOLAPI_API_BASE").unwrap_or_else(default_solapi_api_base),
        };

        let contacts = ContactDirectoryConfig {
            sheets_api_key: take("SHEETS_API_KEY"),
            employee_spreadsheet_id: take("EMPLOYEE_SPREADSHEET_ID"),
            sheets_api_base: take("SHEETS_API_BASE").unwrap_or_else(default_sheets_api_base),
        };

        let weather = WeatherConfig {
            kma_api_key: take("KMA_API_KEY"),
            kma_api_base: take("KMA_API_BASE").unwrap_or_else(default_kma_api_base),
            station: parse_number("KMA_STATION", take("KMA_STATION"), default_kma_station)?,
        };

        let location_layout_urls = match take("LOCATION_LAYOUT_URLS") {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|source| ConfigError::InvalidLayoutUrls { source })?,
            None => BTreeMap::new(),
        };

        let approvers = match take("APPROVERS") {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|source| ConfigError::InvalidApprovers { source })?,
            None => Vec::new(),
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            org_name,
            emergency_room_phone,
            dispatch,
            sms,
            contacts,
            weather,
            location_layout_urls,
            approvers,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
