//! repartitioner.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;
use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RepartitionerConfig {
    pub application: ApplicationConfig,
    pub stream: StreamConfig,
    pub table: TableConfig,
    pub cache: CacheConfig,
    pub health: HealthSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Prefix for derived instance identifiers (`{name}-topology-{n}`).
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Name of the input topic records are consumed from.
    pub input_topic: String,
    /// Runtime instances started in this process.
    pub instances: u32,
    pub threads_per_instance: u32,
    /// Bounded queue depth per worker thread.
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Logical name of the materialized table.
    pub name: String,
    /// Name of the backing state store.
    pub store: String,
    /// On-disk location; an in-memory store is used when absent.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    Memory,
    Resp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// `host:port` of the RESP server.
    pub address: String,
    pub connect_timeout: String,
    pub io_timeout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    /// Longest tolerated rebalance before an instance counts as down.
    pub rebalancing_max: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "repartitioner".to_string(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            input_topic: "uppercase".to_string(),
            instances: 1,
            threads_per_instance: 2,
            channel_capacity: 1024,
        }
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            name: "uppercase-table".to_string(),
            store: "uppercase-key-store".to_string(),
            path: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            address: "127.0.0.1:6379".to_string(),
            connect_timeout: "2s".to_string(),
            io_timeout: "2s".to_string(),
        }
    }
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            rebalancing_max: "PT3M".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn connect_timeout(&self) -> ConfigResult<Duration> {
        duration_field("cache.connect_timeout", &self.connect_timeout)
    }

    pub fn io_timeout(&self) -> ConfigResult<Duration> {
        duration_field("cache.io_timeout", &self.io_timeout)
    }
}

impl HealthSettings {
    pub fn rebalancing_max(&self) -> ConfigResult<Duration> {
        duration_field("health.rebalancing_max", &self.rebalancing_max)
    }
}

impl RepartitionerConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: RepartitionerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, otherwise fall back to defaults.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.application.name.trim().is_empty() {
            return Err(ConfigError::Invalid("application.name must not be empty".into()));
        }
        if self.stream.input_topic.trim().is_empty() {
            return Err(ConfigError::Invalid("stream.input_topic must not be empty".into()));
        }
        if self.stream.instances == 0 {
            return Err(ConfigError::Invalid("stream.instances must be at least 1".into()));
        }
        if self.stream.threads_per_instance == 0 {
            return Err(ConfigError::Invalid(
                "stream.threads_per_instance must be at least 1".into(),
            ));
        }
        if self.stream.channel_capacity == 0 {
            return Err(ConfigError::Invalid("stream.channel_capacity must be at least 1".into()));
        }
        if self.table.store.trim().is_empty() {
            return Err(ConfigError::Invalid("table.store must not be empty".into()));
        }
        if self.health.rebalancing_max()?.is_zero() {
            return Err(ConfigError::Invalid("health.rebalancing_max must be positive".into()));
        }
        if self.cache.connect_timeout()?.is_zero() {
            return Err(ConfigError::Invalid("cache.connect_timeout must be positive".into()));
        }
        if self.cache.io_timeout()?.is_zero() {
            return Err(ConfigError::Invalid("cache.io_timeout must be positive".into()));
        }
        Ok(())
    }
}

fn duration_field(field: &'static str, value: &str) -> ConfigResult<Duration> {
    parse_duration(value).ok_or_else(|| ConfigError::Duration {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RepartitionerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.health.rebalancing_max().unwrap(), Duration::from_secs(180));
        assert_eq!(config.stream.input_topic, "uppercase");
        assert_eq!(config.cache.backend, CacheBackend::Memory);
    }

    #[test]
    fn test_parse_minimal() {
        let config = RepartitionerConfig::from_toml_str("").unwrap();
        assert_eq!(config.application.name, "repartitioner");
        assert!(config.table.path.is_none());
    }

    #[test]
    fn test_parse_full() {
        let toml_str = r#"
[application]
name = "Repartitioner"

[stream]
input_topic = "orders"
instances = 2
threads_per_instance = 4

[table]
path = "/tmp/table.redb"

[cache]
backend = "resp"
address = "cache:6379"
io_timeout = "500ms"

[health]
rebalancing_max = "90s"
"#;
        let config = RepartitionerConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.application.name, "Repartitioner");
        assert_eq!(config.stream.instances, 2);
        assert_eq!(config.stream.channel_capacity, 1024);
        assert_eq!(config.cache.backend, CacheBackend::Resp);
        assert_eq!(config.cache.io_timeout().unwrap(), Duration::from_millis(500));
        assert_eq!(config.health.rebalancing_max().unwrap(), Duration::from_secs(90));
        assert_eq!(config.table.store, "uppercase-key-store");
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let err = RepartitionerConfig::from_toml_str("[health]\nrebalancing_max = \"soon\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Duration { field: "health.rebalancing_max", .. }));

        let err = RepartitionerConfig::from_toml_str("[health]\nrebalancing_max = \"0s\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_overflowing_threshold() {
        let err = RepartitionerConfig::from_toml_str("[health]\nrebalancing_max = \"P999999999999999D\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Duration { field: "health.rebalancing_max", .. }));
    }

    #[test]
    fn test_rejects_zero_cache_timeouts() {
        let err = RepartitionerConfig::from_toml_str(
            "[cache]\nbackend = \"resp\"\nio_timeout = \"0s\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("cache.io_timeout")));

        let err = RepartitionerConfig::from_toml_str("[cache]\nconnect_timeout = \"0ms\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("cache.connect_timeout")));
    }

    #[test]
    fn test_rejects_zero_threads() {
        let err = RepartitionerConfig::from_toml_str("[stream]\nthreads_per_instance = 0\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_from_file_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repartitioner.toml");
        std::fs::write(&path, "[application]\nname = \"from-file\"\n").unwrap();

        let config = RepartitionerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.application.name, "from-file");

        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            RepartitionerConfig::load(Some(&missing)),
            Err(ConfigError::Read { .. })
        ));
        assert_eq!(RepartitionerConfig::load(None).unwrap().application.name, "repartitioner");
    }
}
