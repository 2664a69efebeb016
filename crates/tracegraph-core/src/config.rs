//! Configuration system for the graph engine
//!
//! Provides:
//! - Config file discovery (CLI flag, env var, standard paths)
//! - TOML parsing with serde
//! - Environment variable overrides
//! - Validation of analysis thresholds and sketch parameters

use crate::sketch::{DEFAULT_MAX_BUCKETS, DEFAULT_RELATIVE_ACCURACY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Longest accepted retention window (100 years)
pub const MAX_RETENTION_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine settings
    pub engine: EngineSettings,

    /// Analyzer thresholds
    pub analysis: AnalysisSettings,

    /// Ingestion settings
    pub ingest: IngestSettings,

    /// Latency sketch parameters
    pub sketch: SketchSettings,
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Analyzer thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Average latency above which a service is a latency bottleneck (ms)
    pub latency_threshold_ms: f64,

    /// Error percentage above which a service is an error bottleneck
    pub error_rate_threshold_pct: f64,

    /// Dependent count above which a service is a fan-in bottleneck
    pub fan_in_threshold: usize,

    /// Dependent count above which an affected service is critical in a blast radius
    pub critical_dependents_threshold: usize,

    /// Operations listed per edge in dependency reports
    pub top_operations: usize,

    /// Operations listed per edge in topology documents
    pub topology_top_operations: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            latency_threshold_ms: 1000.0,
            error_rate_threshold_pct: 5.0,
            fan_in_threshold: 5,
            critical_dependents_threshold: 3,
            top_operations: 5,
            topology_top_operations: 3,
        }
    }
}

/// Ingestion settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Queue depth of the async ingestion service
    pub channel_capacity: usize,

    /// Window after which an unseen service is reported stale (seconds)
    pub retention_secs: u64,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            retention_secs: 3600,
        }
    }
}

/// Latency sketch parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SketchSettings {
    /// Relative error bound of reported quantiles
    pub relative_accuracy: f64,

    /// Maximum number of buckets per sketch
    pub max_buckets: usize,
}

impl Default for SketchSettings {
    fn default() -> Self {
        Self {
            relative_accuracy: DEFAULT_RELATIVE_ACCURACY,
            max_buckets: DEFAULT_MAX_BUCKETS,
        }
    }
}

/// Configuration loader
pub struct ConfigLoader {
    /// Path to config file (if specified via CLI)
    cli_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self { cli_path: None }
    }

    /// Set the config path from CLI argument
    pub fn with_cli_path(mut self, path: Option<PathBuf>) -> Self {
        self.cli_path = path;
        self
    }

    /// Load configuration with the following precedence:
    /// 1. CLI --config flag
    /// 2. TRACEGRAPH_CONFIG environment variable
    /// 3. ~/.config/tracegraph/config.toml
    /// 4. /etc/tracegraph/config.toml
    /// 5. Default values
    pub fn load(&self) -> ConfigResult<EngineConfig> {
        let mut config = if let Some(path) = self.find_config_file() {
            info!("Loading configuration from: {}", path.display());
            Self::load_from_file(&path)?
        } else {
            debug!("No config file found, using defaults");
            EngineConfig::default()
        };

        self.apply_env_overrides(&mut config);
        self.validate(&config)?;

        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_path {
            if path.exists() {
                return Some(path.clone());
            }
            warn!("CLI config path does not exist: {}", path.display());
        }

        if let Ok(env_path) = std::env::var("TRACEGRAPH_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
            warn!("TRACEGRAPH_CONFIG path does not exist: {}", env_path);
        }

        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                return Some(path);
            }
        }

        #[cfg(unix)]
        {
            let path = PathBuf::from("/etc/tracegraph/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> ConfigResult<EngineConfig> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        Ok(config)
    }

    fn apply_env_overrides(&self, config: &mut EngineConfig) {
        if let Ok(val) = std::env::var("TRACEGRAPH_LOG_LEVEL") {
            config.engine.log_level = val;
        }

        if let Ok(val) = std::env::var("TRACEGRAPH_LATENCY_THRESHOLD_MS") {
            match val.parse() {
                Ok(ms) => config.analysis.latency_threshold_ms = ms,
                Err(_) => warn!("Ignoring invalid TRACEGRAPH_LATENCY_THRESHOLD_MS: {}", val),
            }
        }

        if let Ok(val) = std::env::var("TRACEGRAPH_CHANNEL_CAPACITY") {
            match val.parse() {
                Ok(capacity) => config.ingest.channel_capacity = capacity,
                Err(_) => warn!("Ignoring invalid TRACEGRAPH_CHANNEL_CAPACITY: {}", val),
            }
        }

        if let Ok(val) = std::env::var("TRACEGRAPH_RETENTION_SECS") {
            match val.parse() {
                Ok(secs) => config.ingest.retention_secs = secs,
                Err(_) => warn!("Ignoring invalid TRACEGRAPH_RETENTION_SECS: {}", val),
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self, config: &EngineConfig) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.engine.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                config.engine.log_level, valid_levels
            )));
        }

        let analysis = &config.analysis;
        if !(analysis.latency_threshold_ms > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "Latency threshold must be positive, got {}",
                analysis.latency_threshold_ms
            )));
        }
        if !(analysis.error_rate_threshold_pct > 0.0 && analysis.error_rate_threshold_pct <= 100.0)
        {
            return Err(ConfigError::ValidationError(format!(
                "Error rate threshold must be in (0, 100], got {}",
                analysis.error_rate_threshold_pct
            )));
        }

        if config.ingest.retention_secs > MAX_RETENTION_SECS {
            return Err(ConfigError::ValidationError(format!(
                "Retention must be at most {} seconds, got {}",
                MAX_RETENTION_SECS, config.ingest.retention_secs
            )));
        }

        if config.ingest.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "Channel capacity cannot be 0".to_string(),
            ));
        }

        let sketch = &config.sketch;
        if !(sketch.relative_accuracy > 0.0 && sketch.relative_accuracy < 1.0) {
            return Err(ConfigError::ValidationError(format!(
                "Sketch relative accuracy must be in (0, 1), got {}",
                sketch.relative_accuracy
            )));
        }
        if sketch.max_buckets < 16 {
            return Err(ConfigError::ValidationError(format!(
                "Sketch needs at least 16 buckets, got {}",
                sketch.max_buckets
            )));
        }

        Ok(())
    }

    /// Save configuration to a file
    pub fn save(&self, config: &EngineConfig, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(config).map_err(|e| {
            ConfigError::ValidationError(format!("Failed to serialize config: {}", e))
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        info!("Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Get the default config file path for the current platform
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("tracegraph").join("config.toml"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper module for platform-specific directories
mod dirs {
    use std::path::PathBuf;

    /// Get the user's config directory
    pub fn config_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        }

        #[cfg(not(target_os = "windows"))]
        {
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".config"))
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.engine.log_level, "info");
        assert_eq!(config.analysis.latency_threshold_ms, 1000.0);
        assert_eq!(config.analysis.error_rate_threshold_pct, 5.0);
        assert_eq!(config.analysis.fan_in_threshold, 5);
        assert_eq!(config.analysis.critical_dependents_threshold, 3);
        assert_eq!(config.ingest.channel_capacity, 1024);
        assert!(ConfigLoader::new().validate(&config).is_ok());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
            [engine]
            log_level = "debug"
        "#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.log_level, "debug");
        // Other fields should be default
        assert_eq!(config.analysis.top_operations, 5);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
            [engine]
            log_level = "trace"

            [analysis]
            latency_threshold_ms = 250.0
            error_rate_threshold_pct = 2.5
            fan_in_threshold = 10
            critical_dependents_threshold = 4
            top_operations = 3
            topology_top_operations = 1

            [ingest]
            channel_capacity = 64
            retention_secs = 600

            [sketch]
            relative_accuracy = 0.02
            max_buckets = 512
        "#;

        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.analysis.latency_threshold_ms, 250.0);
        assert_eq!(config.analysis.fan_in_threshold, 10);
        assert_eq!(config.analysis.topology_top_operations, 1);
        assert_eq!(config.ingest.retention_secs, 600);
        assert_eq!(config.sketch.max_buckets, 512);
        assert!(ConfigLoader::new().validate(&config).is_ok());
    }

    #[test]
    fn test_validation_invalid_log_level() {
        let config = EngineConfig {
            engine: EngineSettings {
                log_level: "invalid".to_string(),
            },
            ..Default::default()
        };
        assert!(ConfigLoader::new().validate(&config).is_err());
    }

    #[test]
    fn test_validation_invalid_thresholds() {
        let loader = ConfigLoader::new();

        let mut config = EngineConfig::default();
        config.analysis.latency_threshold_ms = 0.0;
        assert!(loader.validate(&config).is_err());

        let mut config = EngineConfig::default();
        config.analysis.error_rate_threshold_pct = 150.0;
        assert!(loader.validate(&config).is_err());

        let mut config = EngineConfig::default();
        config.ingest.channel_capacity = 0;
        assert!(loader.validate(&config).is_err());

        let mut config = EngineConfig::default();
        config.ingest.retention_secs = 10_000_000_000_000;
        assert!(loader.validate(&config).is_err());

        let mut config = EngineConfig::default();
        config.ingest.retention_secs = MAX_RETENTION_SECS;
        assert!(loader.validate(&config).is_ok());

        let mut config = EngineConfig::default();
        config.sketch.relative_accuracy = 1.5;
        assert!(loader.validate(&config).is_err());

        let mut config = EngineConfig::default();
        config.sketch.max_buckets = 4;
        assert!(loader.validate(&config).is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = EngineConfig::default();
        config.analysis.latency_threshold_ms = 42.0;

        let loader = ConfigLoader::new();
        loader.save(&config, &path).unwrap();

        let loaded = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let result = ConfigLoader::load_from_file(Path::new("/nonexistent/tracegraph.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_serialize_config() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[engine]"));
        assert!(toml_str.contains("latency_threshold_ms"));
    }
}
