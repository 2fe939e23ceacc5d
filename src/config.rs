use std::collections::HashMap;
use std::fs;
use std::net::IpAddr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_RUN_MODE: &str = "api";
pub const DEFAULT_PROVIDER: &str = "cohere";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_DB_LOCATION: &str = "./data";
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;

/// Every key the service reads. `check` reports on exactly these.
pub const KNOWN_KEYS: [&str; 10] = [
    "RUN_MODE",
    "BIND_ADDR",
    "PORT",
    "DB_LOCATION",
    "AI_PROVIDER",
    "OPENAI_API_KEY",
    "COHERE_API_KEY",
    "PROVIDER_TIMEOUT_SECS",
    "LOG_FORMAT",
    "RUST_LOG",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("invalid config line {line}: {content}")]
    Syntax { line: usize, content: String },
    #[error("invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
}

/// Raw `KEY=VALUE` pairs read from a dotenv-style file.
#[derive(Debug, Default, Clone)]
pub struct AppConfig {
    values: HashMap<String, String>,
}

impl AppConfig {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        for (idx, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(ConfigError::Syntax {
                    line: idx + 1,
                    content: line.to_string(),
                });
            };
            let key = key.trim();
            let mut value = value.trim().to_string();
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = value[1..value.len() - 1].to_string();
            }
            values.insert(key.to_string(), value);
        }
        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone)]
pub struct ProviderSettings {
    pub selector: String,
    pub openai_api_key: Option<String>,
    pub cohere_api_key: Option<String>,
    pub timeout: Duration,
}

// Hand-written so credentials can never end up in a log line.
impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("selector", &self.selector)
            .field("openai_api_key_present", &self.openai_api_key.is_some())
            .field("cohere_api_key_present", &self.cohere_api_key.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub run_mode: String,
    pub bind_addr: IpAddr,
    pub port: u16,
    pub db_location: String,
    pub log_format: LogFormat,
    pub provider: ProviderSettings,
}

impl Settings {
    /// Builds settings from a key lookup (config file first, then the
    /// process environment in `main`).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = parse_or(&get, "BIND_ADDR", DEFAULT_BIND_ADDR.parse().ok())?;
        let port = parse_or(&get, "PORT", Some(DEFAULT_PORT))?;
        let timeout_secs = parse_or(&get, "PROVIDER_TIMEOUT_SECS", Some(DEFAULT_PROVIDER_TIMEOUT_SECS))?;
        let log_format = match get("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT".to_string(),
                    value: other.to_string(),
                });
            }
        };

        Ok(Self {
            run_mode: get("RUN_MODE").unwrap_or_else(|| DEFAULT_RUN_MODE.to_string()),
            bind_addr,
            port,
            db_location: get("DB_LOCATION").unwrap_or_else(|| DEFAULT_DB_LOCATION.to_string()),
            log_format,
            provider: ProviderSettings {
                selector: get("AI_PROVIDER").unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
                openai_api_key: get("OPENAI_API_KEY"),
                cohere_api_key: get("COHERE_API_KEY"),
                timeout: Duration::from_secs(timeout_secs),
            },
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: Option<T>) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value: raw,
        }),
        None => default.ok_or_else(|| ConfigError::Invalid {
            key: key.to_string(),
            value: String::new(),
        }),
    }
}
