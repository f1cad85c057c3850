//! Application configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file if present).

use serde::Deserialize;
use std::env;
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app: AppSettings,
    pub server: ServerConfig,
    pub hub: HubSettings,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for Environment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            "development" => Ok(Self::Development),
            _ => Err(()),
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// What the hub does when a CID connects while another consumer holds it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Refuse the new connection, leave the live one alone
    #[default]
    Reject,
    /// Cancel the live consumer and register the new one in its place
    Evict,
}

impl FromStr for DuplicatePolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "evict" => Ok(Self::Evict),
            _ => Err(()),
        }
    }
}

/// Raw hub settings as read from the environment
#[derive(Debug, Clone, Deserialize)]
pub struct HubSettings {
    /// Reconnect delay announced to clients, in milliseconds
    #[serde(default = "default_retry_ms")]
    pub retry_ms: u64,
    /// Extra response headers applied to every stream
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Capacity of the hub inbound event queue
    #[serde(default = "default_buffer")]
    pub event_buffer: usize,
    /// Capacity of each consumer queue (main and recovery)
    #[serde(default = "default_buffer")]
    pub consumer_buffer: usize,
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            retry_ms: default_retry_ms(),
            headers: Vec::new(),
            event_buffer: default_buffer(),
            consumer_buffer: default_buffer(),
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "sse-hub".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_retry_ms() -> u64 {
    3000
}

fn default_buffer() -> usize {
    50
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if a variable is present but malformed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = match lookup("APP_ENV") {
            Some(raw) => raw
                .parse()
                .map_err(|()| ConfigError::InvalidValue("APP_ENV", raw))?,
            None => default_env(),
        };

        Ok(Self {
            app: AppSettings {
                name: lookup("APP_NAME").unwrap_or_else(default_app_name),
                env,
            },
            server: ServerConfig {
                host: lookup("SSE_HOST").unwrap_or_else(default_host),
                port: parse_or(&lookup, "SSE_PORT", default_port)?,
            },
            hub: HubSettings {
                retry_ms: parse_or(&lookup, "SSE_RETRY_MS", default_retry_ms)?,
                headers: match lookup("SSE_HEADERS") {
                    Some(raw) => parse_headers(&raw)?,
                    None => Vec::new(),
                },
                event_buffer: parse_buffer(&lookup, "SSE_EVENT_BUFFER")?,
                consumer_buffer: parse_buffer(&lookup, "SSE_CONSUMER_BUFFER")?,
                duplicate_policy: match lookup("SSE_DUPLICATE_POLICY") {
                    Some(raw) => raw
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("SSE_DUPLICATE_POLICY", raw))?,
                    None => DuplicatePolicy::default(),
                },
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: fn() -> T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key, raw)),
        None => Ok(default()),
    }
}

fn parse_buffer<F>(lookup: &F, key: &'static str) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or(lookup, key, default_buffer)?;
    // tokio channels panic on a zero capacity
    if value == 0 {
        return Err(ConfigError::InvalidValue(key, "0".to_string()));
    }
    Ok(value)
}

/// Parse `Name:Value,Name2:Value2`
fn parse_headers(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            pair.split_once(':')
                .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
                .filter(|(name, _)| !name.is_empty())
                .ok_or_else(|| ConfigError::InvalidValue("SSE_HEADERS", pair.to_string()))
        })
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
