use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

/// Environment variable consulted for the API token when none is configured.
pub const API_TOKEN_ENV: &str = "ISSUEDESK_API_TOKEN";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// All errors joined into one line
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding config.toml
    pub config_dir: PathBuf,

    /// Tracker connection
    pub server: ServerConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    /// Offline cache and draft ledger locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Transport retry policy
    #[serde(default)]
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the tracker REST API
    pub base_url: String,

    /// Bearer token (optional, can be set via ISSUEDESK_API_TOKEN)
    #[serde(default)]
    pub api_token: Option<String>,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Allow invalid/self-signed certificates (DEVELOPMENT ONLY)
    ///
    /// Only takes effect in debug builds.
    #[serde(default)]
    pub allow_invalid_certs: bool,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Start with syncing switched off (debug)
    #[serde(default)]
    pub syncing_disabled: bool,

    /// Capacity of the queue activity stream
    #[serde(default = "default_activity_buffer")]
    pub activity_buffer: usize,

    /// Capacity of the conflict notice stream
    #[serde(default = "default_conflict_buffer")]
    pub conflict_buffer: usize,

    /// Issues requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_activity_buffer() -> usize {
    64
}

fn default_conflict_buffer() -> usize {
    16
}

fn default_page_size() -> u32 {
    50
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            syncing_disabled: false,
            activity_buffer: default_activity_buffer(),
            conflict_buffer: default_conflict_buffer(),
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for the cache database and the draft ledger
    #[serde(default = "default_data_dir_str")]
    pub data_dir: String,

    #[serde(default = "default_cache_file")]
    pub cache_file: String,

    #[serde(default = "default_drafts_file")]
    pub drafts_file: String,
}

fn default_data_dir_str() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("issuedesk")
        .to_string_lossy()
        .into_owned()
}

fn default_cache_file() -> String {
    "issue_cache.db".to_string()
}

fn default_drafts_file() -> String {
    "issue_drafts.json".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir_str(),
            cache_file: default_cache_file(),
            drafts_file: default_drafts_file(),
        }
    }
}

impl StorageConfig {
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.data_dir().join(&self.cache_file)
    }

    pub fn drafts_path(&self) -> PathBuf {
        self.data_dir().join(&self.drafts_file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay, doubled on every retry
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    5000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("issuedesk");

        Self {
            config_dir,
            server: ServerConfig {
                base_url: "http://localhost:8080".to_string(),
                api_token: std::env::var(API_TOKEN_ENV).ok(),
                timeout_secs: default_timeout_secs(),
                allow_invalid_certs: false,
            },
            sync: SyncConfig::default(),
            storage: StorageConfig::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, writing defaults there if it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path).context("Failed to read config file")?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;

        if config.server.api_token.is_none() {
            config.server.api_token = std::env::var(API_TOKEN_ENV).ok();
        }

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        Self::load()?.into_validated()
    }

    /// [`Config::load_validated`] for an explicit path
    pub fn load_validated_from(path: &Path) -> Result<(Self, ValidationResult)> {
        Self::load_from(path)?.into_validated()
    }

    fn into_validated(self) -> Result<(Self, ValidationResult)> {
        let validation = self.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((self, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.server.base_url, "server.base_url", &mut result);

        if self.server.timeout_secs == 0 {
            result.add_error("server.timeout_secs", "Timeout must be greater than 0");
        } else if self.server.timeout_secs > 300 {
            result.add_warning("server.timeout_secs", "Timeout is unusually long (>300s)");
        }

        if self.server.api_token.as_deref().map_or(true, str::is_empty) {
            result.add_warning(
                "server.api_token",
                format!("No API token configured (set {})", API_TOKEN_ENV),
            );
        }

        if self.server.allow_invalid_certs {
            result.add_warning(
                "server.allow_invalid_certs",
                "Certificate validation is disabled in debug builds",
            );
        }

        if self.sync.syncing_disabled {
            result.add_warning("sync.syncing_disabled", "Syncing is disabled");
        }

        if self.sync.activity_buffer == 0 {
            result.add_error("sync.activity_buffer", "Buffer must be greater than 0");
        }

        if self.sync.conflict_buffer == 0 {
            result.add_error("sync.conflict_buffer", "Buffer must be greater than 0");
        }

        if self.sync.page_size == 0 {
            result.add_error("sync.page_size", "Page size must be greater than 0");
        } else if self.sync.page_size > 500 {
            result.add_warning("sync.page_size", "Page size is unusually large (>500)");
        }

        if self.storage.cache_file.trim().is_empty() {
            result.add_error("storage.cache_file", "File name cannot be empty");
        }

        if self.storage.drafts_file.trim().is_empty() {
            result.add_error("storage.drafts_file", "File name cannot be empty");
        } else if self.storage.drafts_file == self.storage.cache_file {
            result.add_error(
                "storage.drafts_file",
                "Draft ledger and cache cannot share a file",
            );
        }

        let data_dir = self.storage.data_dir();
        if data_dir.exists() && !data_dir.is_dir() {
            result.add_error(
                "storage.data_dir",
                format!("Path is not a directory: {}", data_dir.display()),
            );
        }

        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            result.add_error(
                "retry.max_delay_ms",
                "Maximum delay must not be shorter than the initial delay",
            );
        }

        if self.retry.max_retries > 10 {
            result.add_warning("retry.max_retries", "More than 10 retries per request");
        }

        result
    }

    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }

                if url.port() == Some(0) {
                    result.add_error(field_name, "Port cannot be 0");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("issuedesk");

        Ok(config_dir.join("config.toml"))
    }
}
