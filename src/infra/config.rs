//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! `PARKSYNC_*` environment variables override individual destination and
//! cache settings after the file is parsed.

use crate::error::SyncError;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "PARKSYNC";

/// Live data slots expire after six 30-day months
const DEFAULT_LIVEDATA_TTL_DAYS: u64 = 30 * 6;

/// Upper bound on any configured TTL (100 years)
const MAX_TTL_DAYS: u64 = 365 * 100;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct DestinationConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub timezone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Namespace for cache keys (defaults to the destination id)
    #[serde(default)]
    pub namespace: Option<String>,
    /// Cache format version; bumping it orphans every previously stored key
    #[serde(default = "default_cache_version")]
    pub version: u32,
    /// How long a built entity graph is served before rebuilding
    #[serde(default = "default_entities_ttl_secs")]
    pub entities_ttl_secs: u64,
    #[serde(default = "default_livedata_ttl_days")]
    pub livedata_ttl_days: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            version: default_cache_version(),
            entities_ttl_secs: default_entities_ttl_secs(),
            livedata_ttl_days: default_livedata_ttl_days(),
        }
    }
}

fn default_cache_version() -> u32 {
    1
}

fn default_entities_ttl_secs() -> u64 {
    5 * 60
}

fn default_livedata_ttl_days() -> u64 {
    DEFAULT_LIVEDATA_TTL_DAYS
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiveDataConfig {
    /// JSON fixture consumed by the file-backed producer
    #[serde(default = "default_fixture")]
    pub fixture: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Upper bound on a single producer poll
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LiveDataConfig {
    fn default() -> Self {
        Self {
            fixture: default_fixture(),
            poll_interval_secs: default_poll_interval_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_fixture() -> String {
    "fixtures/destination.json".to_string()
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    pub destination: DestinationConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub livedata: LiveDataConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    destination_id: String,
    destination_name: Option<String>,
    timezone: String,
    cache_namespace: Option<String>,
    cache_version: u32,
    entities_ttl_secs: u64,
    livedata_ttl_days: u64,
    fixture_file: String,
    poll_interval_secs: u64,
    poll_timeout_secs: u64,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            destination_id: "destination".to_string(),
            destination_name: None,
            timezone: "UTC".to_string(),
            cache_namespace: None,
            cache_version: default_cache_version(),
            entities_ttl_secs: default_entities_ttl_secs(),
            livedata_ttl_days: default_livedata_ttl_days(),
            fixture_file: default_fixture(),
            poll_interval_secs: default_poll_interval_secs(),
            poll_timeout_secs: default_timeout_secs(),
            metrics_interval_secs: default_metrics_interval(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine config file path from the CLI value or environment
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            destination_id: toml_config.destination.id,
            destination_name: toml_config.destination.name,
            timezone: toml_config.destination.timezone,
            cache_namespace: toml_config.cache.namespace,
            cache_version: toml_config.cache.version,
            entities_ttl_secs: toml_config.cache.entities_ttl_secs,
            livedata_ttl_days: toml_config.cache.livedata_ttl_days,
            fixture_file: toml_config.livedata.fixture,
            poll_interval_secs: toml_config.livedata.poll_interval_secs,
            poll_timeout_secs: toml_config.livedata.timeout_secs,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), path = %path, "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    /// Apply `PARKSYNC_*` overrides from the given variables.
    ///
    /// Unparseable numeric values are ignored.
    pub fn apply_env_overrides<I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX).and_then(|k| k.strip_prefix('_')) else {
                continue;
            };
            match name {
                "DESTINATION_ID" => self.destination_id = value,
                "TIMEZONE" => self.timezone = value,
                "CACHE_NAMESPACE" => self.cache_namespace = Some(value),
                "CACHE_VERSION" => {
                    if let Ok(version) = value.parse() {
                        self.cache_version = version;
                    }
                }
                "ENTITIES_TTL_SECS" => {
                    if let Ok(secs) = value.parse() {
                        self.entities_ttl_secs = secs;
                    }
                }
                _ => {}
            }
        }
        self
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.destination_id.trim().is_empty() {
            return Err(SyncError::Config("destination id is required".to_string()));
        }
        if self.timezone.trim().is_empty() {
            return Err(SyncError::Config(format!(
                "timezone is required for destination {}",
                self.destination_id
            )));
        }
        if self.livedata_ttl_days > MAX_TTL_DAYS {
            return Err(SyncError::Config(format!(
                "cache.livedata_ttl_days must be at most {MAX_TTL_DAYS}, got {}",
                self.livedata_ttl_days
            )));
        }
        if self.entities_ttl_secs > MAX_TTL_DAYS * SECS_PER_DAY {
            return Err(SyncError::Config(format!(
                "cache.entities_ttl_secs must be at most {}, got {}",
                MAX_TTL_DAYS * SECS_PER_DAY,
                self.entities_ttl_secs
            )));
        }
        Ok(())
    }

    // Getters for all config fields
    pub fn destination_id(&self) -> &str {
        &self.destination_id
    }

    pub fn destination_name(&self) -> &str {
        self.destination_name.as_deref().unwrap_or(&self.destination_id)
    }

    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    /// Cache namespace, falling back to the destination id
    pub fn cache_namespace(&self) -> &str {
        self.cache_namespace.as_deref().unwrap_or(&self.destination_id)
    }

    pub fn cache_version(&self) -> u32 {
        self.cache_version
    }

    pub fn entities_ttl(&self) -> Duration {
        Duration::from_secs(self.entities_ttl_secs)
    }

    pub fn livedata_ttl(&self) -> Duration {
        Duration::from_secs(self.livedata_ttl_days.saturating_mul(SECS_PER_DAY))
    }

    pub fn fixture_file(&self) -> &str {
        &self.fixture_file
    }

    pub fn poll_interval_secs(&self) -> u64 {
        self.poll_interval_secs
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method to set the destination id
    pub fn with_destination_id(mut self, id: &str) -> Self {
        self.destination_id = id.to_string();
        self
    }

    /// Builder method to set the timezone
    pub fn with_timezone(mut self, timezone: &str) -> Self {
        self.timezone = timezone.to_string();
        self
    }

    /// Builder method to set the entity graph TTL
    pub fn with_entities_ttl_secs(mut self, secs: u64) -> Self {
        self.entities_ttl_secs = secs;
        self
    }

    /// Builder method to set the fixture path
    pub fn with_fixture_file(mut self, path: &str) -> Self {
        self.fixture_file = path.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.destination_id(), "destination");
        assert_eq!(config.timezone(), "UTC");
        assert_eq!(config.cache_version(), 1);
        assert_eq!(config.entities_ttl(), Duration::from_secs(300));
        assert_eq!(config.livedata_ttl(), Duration::from_secs(180 * 86_400));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_namespace_falls_back_to_destination_id() {
        let config = Config::default().with_destination_id("wdw");
        assert_eq!(config.cache_namespace(), "wdw");
        assert_eq!(config.destination_name(), "wdw");
    }

    #[test]
    fn test_missing_timezone_is_fatal() {
        let config = Config::default().with_timezone("  ");
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_oversized_ttls_are_fatal() {
        let config = Config { livedata_ttl_days: 300_000_000_000_000, ..Config::default() };
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
        // Getter stays total even before validation
        assert_eq!(config.livedata_ttl(), Duration::from_secs(u64::MAX));

        let config = Config::default().with_entities_ttl_secs(u64::MAX);
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));

        let config = Config { livedata_ttl_days: MAX_TTL_DAYS, ..Config::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default().apply_env_overrides(vars(&[
            ("PARKSYNC_TIMEZONE", "Asia/Tokyo"),
            ("PARKSYNC_CACHE_VERSION", "4"),
            ("PARKSYNC_ENTITIES_TTL_SECS", "soon"),
            ("OTHER_TIMEZONE", "Europe/Paris"),
        ]));
        assert_eq!(config.timezone(), "Asia/Tokyo");
        assert_eq!(config.cache_version(), 4);
        assert_eq!(config.entities_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_resolve_config_path_from_cli() {
        assert_eq!(Config::resolve_config_path(Some("config/tdr.toml")), "config/tdr.toml");
    }
}
