//! Configuration management for WindowForge services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Context retrieval and expansion tuning
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum concurrent requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Chunk table (one table per knowledge collection)
    #[serde(default = "default_table")]
    pub table: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Seeds requested from the nearest-neighbour query when the caller gives no k
    #[serde(default = "default_k")]
    pub default_k: usize,

    /// Maximum characters in one assembled document
    #[serde(default = "default_budget")]
    pub default_budget: usize,

    /// Half-width of the first widening pass
    #[serde(default = "default_initial_half_width")]
    pub initial_half_width: i64,

    /// Growth of the half-width between passes
    #[serde(default = "default_width_step")]
    pub width_step: i64,

    /// Hard cap on widening passes per seed
    #[serde(default = "default_max_passes")]
    pub max_passes: u32,

    /// Whole-query deadline in milliseconds (0 disables)
    #[serde(default = "default_query_timeout")]
    pub query_timeout_ms: u64,

    /// Expand seeds into context windows; when false hits are returned as-is
    #[serde(default = "default_expand_context")]
    pub expand_context: bool,

    /// Seeds farther than this from the query are dropped
    #[serde(default)]
    pub max_distance: Option<f32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level / filter directive (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name reported in logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_max_concurrent() -> usize { 100 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_table() -> String { "langchain_document".to_string() }
fn default_k() -> usize { 6 }
fn default_budget() -> usize { 1000 }
fn default_initial_half_width() -> i64 { 10 }
fn default_width_step() -> i64 { 20 }
fn default_max_passes() -> u32 { 64 }
fn default_query_timeout() -> u64 { 5_000 }
fn default_expand_context() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "windowforge".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            max_concurrent_requests: default_max_concurrent(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            default_budget: default_budget(),
            initial_half_width: default_initial_half_width(),
            width_step: default_width_step(),
            max_passes: default_max_passes(),
            query_timeout_ms: default_query_timeout(),
            expand_context: default_expand_context(),
            max_distance: None,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl RetrievalConfig {
    /// Query deadline, `None` when disabled
    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query_timeout_ms > 0).then(|| Duration::from_millis(self.query_timeout_ms))
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .set_default("database.url", "postgres://localhost/windowforge")?
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__RETRIEVAL__DEFAULT_BUDGET=2000
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: "postgres://localhost/windowforge".to_string(),
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
                table: default_table(),
            },
            retrieval: RetrievalConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.retrieval.initial_half_width, 10);
        assert_eq!(config.retrieval.width_step, 20);
        assert_eq!(config.database.table, "langchain_document");
    }

    #[test]
    fn test_query_timeout_disabled_at_zero() {
        let mut retrieval = RetrievalConfig::default();
        assert_eq!(retrieval.query_timeout(), Some(Duration::from_millis(5_000)));

        retrieval.query_timeout_ms = 0;
        assert_eq!(retrieval.query_timeout(), None);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let raw = r#"
            [database]
            url = "postgres://db/kb"
            table = "handbook"

            [retrieval]
            default_budget = 2400
            max_distance = 0.8
        "#;

        let config: AppConfig = Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .unwrap();

        assert_eq!(config.database.table, "handbook");
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.retrieval.default_budget, 2400);
        assert_eq!(config.retrieval.default_k, 6);
        assert_eq!(config.retrieval.max_distance, Some(0.8));
        assert!(config.retrieval.expand_context);
        assert_eq!(config.observability.service_name, "windowforge");
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("windowforge-config-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[database]\nurl = \"postgres://file/kb\"\n[server]\nport = 9000\nrequest_timeout_secs = 3\n",
        )
        .unwrap();

        let config = AppConfig::from_file(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.database.url, "postgres://file/kb");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.retrieval.max_passes, 64);
    }
}
