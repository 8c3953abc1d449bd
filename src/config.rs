use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ExportError, Result};
use crate::models::{MAX_YEAR, MIN_YEAR};

/// Gmail's per-user quota: 15,000 units per minute
pub const SERVICE_UNITS_PER_MINUTE: u32 = 15_000;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Local ceiling per window, kept below the service limit
    #[serde(default = "default_ceiling_units")]
    pub ceiling_units: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_safety_margin_ms")]
    pub safety_margin_ms: u64,
    #[serde(default = "default_call_cost")]
    pub list_cost: u32,
    #[serde(default = "default_call_cost")]
    pub get_cost: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            ceiling_units: default_ceiling_units(),
            window_secs: default_window_secs(),
            safety_margin_ms: default_safety_margin_ms(),
            list_cost: default_call_cost(),
            get_cost: default_call_cost(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_start_year")]
    pub start_year: i32,
    /// Last year to scan (inclusive); the current year when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_year: Option<i32>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_sub_batch_size")]
    pub sub_batch_size: usize,
    #[serde(default = "default_sub_batch_pause_ms")]
    pub sub_batch_pause_ms: u64,
    #[serde(default)]
    pub include_spam_trash: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            start_year: default_start_year(),
            end_year: None,
            page_size: default_page_size(),
            sub_batch_size: default_sub_batch_size(),
            sub_batch_pause_ms: default_sub_batch_pause_ms(),
            include_spam_trash: false,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ExtractionConfig {
    /// End year with the current year filled in
    pub fn resolved_end_year(&self) -> i32 {
        self.end_year.unwrap_or_else(|| Utc::now().year())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: PathBuf,
    /// Collapse rows sharing an email into one row
    #[serde(default = "default_true")]
    pub one_row_per_email: bool,
    /// Write what was gathered to `<path>.partial.csv` when a run fails
    #[serde(default = "default_true")]
    pub write_partial_on_failure: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            one_row_per_email: true,
            write_partial_on_failure: true,
        }
    }
}

fn default_ceiling_units() -> u32 {
    14_000
}

fn default_window_secs() -> u64 {
    60
}

fn default_safety_margin_ms() -> u64 {
    1_000
}

fn default_call_cost() -> u32 {
    5
}

fn default_start_year() -> i32 {
    2005
}

fn default_page_size() -> u32 {
    100
}

fn default_sub_batch_size() -> usize {
    50
}

fn default_sub_batch_pause_ms() -> u64 {
    200
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_output_path() -> PathBuf {
    PathBuf::from("emails.csv")
}

fn default_true() -> bool {
    true
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ExportError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ExportError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ExportError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ExportError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| ExportError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let quota = &self.quota;
        if quota.ceiling_units == 0 {
            return Err(ExportError::ConfigError(
                "quota.ceiling_units must be greater than 0".to_string(),
            ));
        }
        if quota.ceiling_units > SERVICE_UNITS_PER_MINUTE {
            return Err(ExportError::ConfigError(format!(
                "quota.ceiling_units cannot exceed {} (Gmail's per-user limit per minute)",
                SERVICE_UNITS_PER_MINUTE
            )));
        }
        if quota.window_secs == 0 {
            return Err(ExportError::ConfigError(
                "quota.window_secs must be greater than 0".to_string(),
            ));
        }
        for (name, cost) in [("list_cost", quota.list_cost), ("get_cost", quota.get_cost)] {
            if cost == 0 || cost > quota.ceiling_units {
                return Err(ExportError::ConfigError(format!(
                    "quota.{} must be between 1 and quota.ceiling_units ({})",
                    name, quota.ceiling_units
                )));
            }
        }

        let extraction = &self.extraction;
        for (name, year) in [
            ("start_year", extraction.start_year),
            ("end_year", extraction.resolved_end_year()),
        ] {
            if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
                return Err(ExportError::ConfigError(format!(
                    "extraction.{} must be between {} and {}",
                    name, MIN_YEAR, MAX_YEAR
                )));
            }
        }
        if extraction.start_year > extraction.resolved_end_year() {
            return Err(ExportError::ConfigError(format!(
                "extraction.start_year ({}) is after the end year ({})",
                extraction.start_year,
                extraction.resolved_end_year()
            )));
        }
        if extraction.page_size == 0 || extraction.page_size > 500 {
            return Err(ExportError::ConfigError(
                "extraction.page_size must be between 1 and 500".to_string(),
            ));
        }
        if extraction.sub_batch_size == 0 {
            return Err(ExportError::ConfigError(
                "extraction.sub_batch_size must be greater than 0".to_string(),
            ));
        }
        if extraction.request_timeout_secs == 0 {
            return Err(ExportError::ConfigError(
                "extraction.request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.output.path.as_os_str().is_empty() {
            return Err(ExportError::ConfigError(
                "output.path cannot be empty".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}
