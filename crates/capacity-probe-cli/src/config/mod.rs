//! Configuration and job-file loading and resolution.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use capacity_probe::prober::DEFAULT_CEILING;
use capacity_probe::{BatchConfig, BatchJob, CabinClass, OfferQuery, TargetIdentity, TripType};

const DEFAULT_SETTLE_MS: u64 = 3_000;
const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 90_000;
const DEFAULT_INTERACTION_TIMEOUT_MS: u64 = 120_000;
const DEFAULT_SELECTOR_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const DEFAULT_ACCEPT_LANGUAGE: &str = "pt-BR,pt;q=0.9,en-US;q=0.8,en;q=0.7";

/// Errors raised while loading configuration or job files.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// How to drive the browser against the operator's search site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Search URL with `{origin}`, `{destination}`, `{date}`,
    /// `{return_date}`, `{cabin}`, `{trip_type}` and `{demand}` placeholders.
    pub url_template: String,
    /// CSS selector matching one element per rendered offer.
    pub block_selector: String,
    /// Extra wait after each load before reading the listing.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,
    /// How long to wait for the first `block_selector` match after a load.
    #[serde(default = "default_selector_timeout_ms")]
    pub selector_timeout_ms: u64,
    /// Bound applied by the prober to every source call.
    #[serde(default = "default_interaction_timeout_ms")]
    pub interaction_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chromium_path: Option<PathBuf>,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: Option<String>,
    #[serde(default = "default_accept_language")]
    pub accept_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    #[serde(default)]
    pub viewport: ViewportConfig,
}

/// Browser window and page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
        }
    }
}

impl SourceConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.url_template.contains("{demand}") {
            return Err(ConfigError::Invalid(
                "url_template must contain a {demand} placeholder".to_string(),
            ));
        }
        if self.block_selector.trim().is_empty() {
            return Err(ConfigError::Invalid("block_selector is empty".to_string()));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(ConfigError::Invalid("viewport must be non-empty".to_string()));
        }
        if self.navigation_timeout_ms == 0 || self.interaction_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".to_string()));
        }
        Ok(())
    }
}

fn default_settle_ms() -> u64 {
    DEFAULT_SETTLE_MS
}

fn default_navigation_timeout_ms() -> u64 {
    DEFAULT_NAVIGATION_TIMEOUT_MS
}

fn default_interaction_timeout_ms() -> u64 {
    DEFAULT_INTERACTION_TIMEOUT_MS
}

fn default_selector_timeout_ms() -> u64 {
    DEFAULT_SELECTOR_TIMEOUT_MS
}

fn default_headless() -> bool {
    true
}

fn default_user_agent() -> Option<String> {
    Some(DEFAULT_USER_AGENT.to_string())
}

fn default_accept_language() -> Option<String> {
    Some(DEFAULT_ACCEPT_LANGUAGE.to_string())
}

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub source: SourceConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Configured snapshot directory, or `~/.capacity-probe/snapshots`.
    pub fn snapshot_dir(&self) -> PathBuf {
        self.snapshot_dir
            .clone()
            .unwrap_or_else(|| home_dir().join(".capacity-probe").join("snapshots"))
    }
}

/// Resolve the configuration file path.
pub fn resolve_config_path(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Ok(env_path) = std::env::var("CAPACITY_PROBE_CONFIG") {
        return PathBuf::from(env_path);
    }

    let cwd_config = PathBuf::from(".capacity-probe/config.json");
    if cwd_config.exists() {
        return cwd_config;
    }

    home_dir().join(".capacity-probe").join("config.json")
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn load_config(path: &Path) -> ConfigResult<AppConfig> {
    let config: AppConfig = read_json(path)?;
    config.source.validate()?;
    Ok(config)
}

/// Target given either as text (`"AA954"`, `"10:35"`) or as a tagged object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetSpec {
    Text(String),
    Identity(TargetIdentity),
}

impl TargetSpec {
    pub fn to_identity(&self) -> TargetIdentity {
        match self {
            Self::Text(text) => TargetIdentity::parse(text),
            Self::Identity(identity) => identity.clone(),
        }
    }
}

/// One line of a job file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobItem {
    pub origin: String,
    pub destination: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_date: Option<NaiveDate>,
    #[serde(default)]
    pub cabin: CabinClass,
    #[serde(default)]
    pub trip_type: TripType,
    pub target: TargetSpec,
}

/// A batch as written by an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFile {
    #[serde(default = "default_ceiling")]
    pub ceiling: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cabin: Option<CabinClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_type: Option<TripType>,
    pub items: Vec<JobItem>,
}

fn default_ceiling() -> u32 {
    DEFAULT_CEILING
}

impl JobFile {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.ceiling == 0 {
            return Err(ConfigError::Invalid("ceiling must be at least 1".to_string()));
        }
        if self.items.is_empty() {
            return Err(ConfigError::Invalid("job has no items".to_string()));
        }
        Ok(())
    }

    pub fn into_job(self) -> BatchJob {
        let mut job = BatchJob::new(BatchConfig {
            ceiling: self.ceiling,
            cabin: self.cabin,
            trip_type: self.trip_type,
        });
        for item in self.items {
            let target = item.target.to_identity();
            job.push(
                OfferQuery {
                    origin: item.origin,
                    destination: item.destination,
                    date: item.date,
                    cabin: item.cabin,
                    trip_type: item.trip_type,
                    return_date: item.return_date,
                },
                target,
            );
        }
        job
    }
}

pub fn load_job(path: &Path) -> ConfigResult<JobFile> {
    let job: JobFile = read_json(path)?;
    job.validate()?;
    Ok(job)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> ConfigResult<T> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins() {
        assert_eq!(resolve_config_path(Some("/tmp/x.json")), PathBuf::from("/tmp/x.json"));
    }

    #[test]
    fn test_source_defaults() {
        let json = r#"{"url_template": "https://example.test/?adults={demand}", "block_selector": "li.offer"}"#;
        let source: SourceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(source.settle_ms, DEFAULT_SETTLE_MS);
        assert_eq!(source.navigation_timeout_ms, DEFAULT_NAVIGATION_TIMEOUT_MS);
        assert!(source.headless);
        assert_eq!(source.selector_timeout_ms, DEFAULT_SELECTOR_TIMEOUT_MS);
        assert_eq!(source.viewport, ViewportConfig { width: 1280, height: 800 });
        assert!(source.user_agent.as_deref().is_some_and(|ua| ua.contains("Chrome/")));
        assert_eq!(source.accept_language.as_deref(), Some(DEFAULT_ACCEPT_LANGUAGE));
        assert!(source.referer.is_none());
        assert!(source.validate().is_ok());
    }

    #[test]
    fn test_template_needs_demand() {
        let json = r#"{"url_template": "https://example.test/?from={origin}", "block_selector": "li"}"#;
        let source: SourceConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(source.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_browser_identity_overrides() {
        let json = r#"{
            "url_template": "https://example.test/?adults={demand}",
            "block_selector": "li",
            "user_agent": null,
            "referer": "https://www.google.com/",
            "viewport": {"width": 1920, "height": 1080}
        }"#;
        let source: SourceConfig = serde_json::from_str(json).unwrap();
        assert!(source.user_agent.is_none());
        assert_eq!(source.referer.as_deref(), Some("https://www.google.com/"));
        assert_eq!(source.viewport, ViewportConfig { width: 1920, height: 1080 });
    }
}
