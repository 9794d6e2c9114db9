//! Configuration management for CLI, environment variables, and config files.

use crate::error::{ValidationIssue, VisitCounterError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for visit-counter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub counter: CounterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration for the counter store connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub circuit_failure_threshold: u32,
    pub circuit_cooldown_secs: u64,
}

/// Configuration for buffering, caching and flushing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    pub cache_ttl_secs: u64,
    pub flush_interval_secs: u64,
    pub store_timeout_ms: u64,
    pub flush_concurrency: usize,
}

/// Configuration for logging output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Seconds between periodic metrics summaries, 0 disables them
    pub metrics_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:6380".to_string(),
            username: None,
            password: None,
            request_timeout_ms: 5000,
            max_retries: 3,
            retry_delay_ms: 200,
            circuit_failure_threshold: 5,
            circuit_cooldown_secs: 30,
        }
    }
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 5,
            flush_interval_secs: 30,
            store_timeout_ms: 2000,
            flush_concurrency: 8,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            metrics_interval_secs: 0,
        }
    }
}

impl CounterConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, VisitCounterError> {
    match std::env::var(name) {
        Ok(val) => val
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| VisitCounterError::InvalidArgument(format!("{} has invalid format", name))),
        Err(_) => Ok(None),
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &PathBuf) -> Result<Self, VisitCounterError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| VisitCounterError::Io(e.to_string()))?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        match ext.as_deref() {
            Some("json") => Ok(serde_json::from_str(&content)?),
            _ => Ok(toml::from_str(&content)?),
        }
    }

    pub fn from_default_locations() -> Result<Self, VisitCounterError> {
        let config_paths = [
            dirs::config_dir().map(|d| d.join("visit-counter/config.toml")),
            Some(PathBuf::from("/etc/visit-counter/config.toml")),
            Some(PathBuf::from("./visit-counter.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        Ok(Self::default())
    }

    pub fn merge_from_env(mut self) -> Result<Self, VisitCounterError> {
        if let Ok(val) = std::env::var("VISIT_COUNTER_STORE_URL") {
            self.store.url = val;
        }
        if let Some(val) = parse_env("VISIT_COUNTER_STORE_TIMEOUT_MS")? {
            self.counter.store_timeout_ms = val;
        }
        if let Some(val) = parse_env("VISIT_COUNTER_CACHE_TTL")? {
            self.counter.cache_ttl_secs = val;
        }
        if let Some(val) = parse_env("VISIT_COUNTER_FLUSH_INTERVAL")? {
            self.counter.flush_interval_secs = val;
        }
        if let Some(val) = parse_env("VISIT_COUNTER_FLUSH_CONCURRENCY")? {
            self.counter.flush_concurrency = val;
        }
        if let Ok(val) = std::env::var("VISIT_COUNTER_LOG_LEVEL") {
            self.logging.level = val;
        }

        // Auth credentials - support both individual fields and combined format
        if let Ok(auth_str) = std::env::var("VISIT_COUNTER_AUTH_USERPASS") {
            if let Some((username, password)) = auth_str.split_once(':') {
                self.store.username = Some(username.to_string());
                self.store.password = Some(password.to_string());
            }
        } else {
            if let Ok(val) = std::env::var("VISIT_COUNTER_AUTH_USERNAME") {
                self.store.username = Some(val);
            }
            if let Ok(val) = std::env::var("VISIT_COUNTER_AUTH_PASSWORD") {
                self.store.password = Some(val);
            }
        }

        Ok(self)
    }

    pub fn merge_from_cli(mut self, cli: &CliArgs) -> Self {
        if let Some(ref url) = cli.store_url {
            self.store.url = url.clone();
        }
        if let Some(ttl) = cli.cache_ttl_secs {
            self.counter.cache_ttl_secs = ttl;
        }
        if let Some(interval) = cli.flush_interval_secs {
            self.counter.flush_interval_secs = interval;
        }
        if cli.verbose {
            self.logging.level = "debug".to_string();
        }

        self
    }

    pub fn load() -> Result<Self, VisitCounterError> {
        Self::from_default_locations()?.merge_from_env()
    }

    pub fn load_with_cli(cli: &CliArgs) -> Result<Self, VisitCounterError> {
        let base = match cli.config_file {
            Some(ref path) => Self::from_file(path)?,
            None => Self::from_default_locations()?,
        };
        Ok(base.merge_from_env()?.merge_from_cli(cli))
    }

    pub fn validate(&self) -> Result<(), VisitCounterError> {
        let mut issues = Vec::new();
        let mut issue = |field: &str, message: String| {
            issues.push(ValidationIssue {
                field: field.to_string(),
                message,
            })
        };

        if self.store.url.is_empty() {
            issue("store.url", "URL cannot be empty".to_string());
        } else if let Err(e) = reqwest::Url::parse(&self.store.url) {
            issue("store.url", format!("Invalid URL format: {}", e));
        }

        if self.store.request_timeout_ms == 0 {
            issue("store.request_timeout_ms", "must be positive".to_string());
        }

        if self.counter.cache_ttl_secs == 0 {
            issue("counter.cache_ttl_secs", "must be positive".to_string());
        }

        if self.counter.flush_interval_secs == 0 {
            issue("counter.flush_interval_secs", "must be positive".to_string());
        } else if self.counter.flush_interval_secs > 86_400 {
            issue(
                "counter.flush_interval_secs",
                "must not exceed one day".to_string(),
            );
        }

        if self.counter.store_timeout_ms == 0 {
            issue("counter.store_timeout_ms", "must be positive".to_string());
        }

        if self.counter.flush_concurrency == 0 {
            issue("counter.flush_concurrency", "must be positive".to_string());
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            issue(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Valid levels: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            );
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(VisitCounterError::Validation(issues))
        }
    }
}

/// Command-line arguments that override configuration values.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub store_url: Option<String>,
    pub config_file: Option<PathBuf>,
    pub cache_ttl_secs: Option<u64>,
    pub flush_interval_secs: Option<u64>,
    pub verbose: bool,
}
