//! Configuration management for litgraph services
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

    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,

    /// Generative service configuration
    #[serde(default)]
    pub generative: GenerativeConfig,

    /// Bibliographic index configuration
    #[serde(default)]
    pub bibliography: BibliographyConfig,

    /// Recommendation pipeline tuning
    #[serde(default)]
    pub recommender: RecommenderConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
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

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

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

    /// Apply bundled migrations on startup
    #[serde(default)]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    /// Enable the bibliographic lookup cache
    #[serde(default)]
    pub enabled: bool,

    /// Redis URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Default TTL in seconds
    #[serde(default = "default_redis_ttl")]
    pub default_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerativeConfig {
    /// Generative provider: gemini, offline
    #[serde(default = "default_generative_provider")]
    pub provider: String,

    /// API key for the generative service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_generative_model")]
    pub model: String,

    /// Sampling temperature for candidate proposals
    #[serde(default = "default_proposal_temperature")]
    pub proposal_temperature: f32,

    /// Sampling temperature for summaries
    #[serde(default = "default_summary_temperature")]
    pub summary_temperature: f32,

    /// Request timeout in seconds
    #[serde(default = "default_external_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BibliographyConfig {
    /// Index API base URL
    #[serde(default = "default_bibliography_base")]
    pub base_url: String,

    /// Contact address sent with every request
    #[serde(default = "default_mailto")]
    pub mailto: String,

    /// Request timeout in seconds
    #[serde(default = "default_external_timeout")]
    pub timeout_secs: u64,

    /// Outbound requests per second
    #[serde(default = "default_bibliography_rps")]
    pub requests_per_second: u32,

    /// Results requested per free-text search
    #[serde(default = "default_search_page_size")]
    pub search_page_size: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecommenderConfig {
    /// Maximum candidates requested from the generative service
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    /// Candidates resolved concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// First year of the recency window
    #[serde(default = "default_recency_start")]
    pub recency_start_year: i32,

    /// Last year of the recency window
    #[serde(default = "default_recency_end")]
    pub recency_end_year: i32,

    /// Maximum characters of the fallback summary
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 90 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_redis_url() -> String { "redis://localhost:6379".to_string() }
fn default_redis_ttl() -> u64 { 86_400 }
fn default_generative_provider() -> String { "gemini".to_string() }
fn default_generative_model() -> String { crate::DEFAULT_GENERATIVE_MODEL.to_string() }
fn default_proposal_temperature() -> f32 { 0.2 }
fn default_summary_temperature() -> f32 { 0.3 }
fn default_external_timeout() -> u64 { 20 }
fn default_bibliography_base() -> String { crate::DEFAULT_BIBLIOGRAPHY_BASE.to_string() }
fn default_mailto() -> String { "research-graph@example.org".to_string() }
fn default_bibliography_rps() -> u32 { 8 }
fn default_search_page_size() -> u32 { 5 }
fn default_max_candidates() -> usize { 12 }
fn default_concurrency() -> usize { 4 }
fn default_recency_start() -> i32 { 2015 }
fn default_recency_end() -> i32 { 2025 }
fn default_summary_max_chars() -> usize { 35 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "litgraph".to_string() }
fn default_rate_limit() -> u32 { 20 }
fn default_burst() -> u32 { 40 }
fn default_enabled() -> bool { true }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_redis_url(),
            default_ttl_secs: default_redis_ttl(),
        }
    }
}

impl Default for GenerativeConfig {
    fn default() -> Self {
        Self {
            provider: default_generative_provider(),
            api_key: None,
            api_base: None,
            model: default_generative_model(),
            proposal_temperature: default_proposal_temperature(),
            summary_temperature: default_summary_temperature(),
            timeout_secs: default_external_timeout(),
        }
    }
}

impl Default for BibliographyConfig {
    fn default() -> Self {
        Self {
            base_url: default_bibliography_base(),
            mailto: default_mailto(),
            timeout_secs: default_external_timeout(),
            requests_per_second: default_bibliography_rps(),
            search_page_size: default_search_page_size(),
        }
    }
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            max_candidates: default_max_candidates(),
            concurrency: default_concurrency(),
            recency_start_year: default_recency_start(),
            recency_end_year: default_recency_end(),
            summary_max_chars: default_summary_max_chars(),
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

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__BIBLIOGRAPHY__MAILTO=lab@example.org
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, secs) in [
            ("generative.timeout_secs", self.generative.timeout_secs),
            ("bibliography.timeout_secs", self.bibliography.timeout_secs),
        ] {
            if !(1..=60).contains(&secs) {
                return Err(ConfigError::Message(format!(
                    "{} must be between 1 and 60 seconds, got {}",
                    name, secs
                )));
            }
        }

        if self.recommender.max_candidates == 0 {
            return Err(ConfigError::Message(
                "recommender.max_candidates must be at least 1".to_string(),
            ));
        }

        if self.recommender.concurrency == 0
            || self.recommender.concurrency > self.recommender.max_candidates
        {
            return Err(ConfigError::Message(format!(
                "recommender.concurrency must be between 1 and {}",
                self.recommender.max_candidates
            )));
        }

        if self.recommender.recency_start_year >= self.recommender.recency_end_year {
            return Err(ConfigError::Message(
                "recommender recency window is empty".to_string(),
            ));
        }

        if self.bibliography.requests_per_second == 0 {
            return Err(ConfigError::Message(
                "bibliography.requests_per_second must be positive".to_string(),
            ));
        }

        if self.bibliography.mailto.trim().is_empty() {
            return Err(ConfigError::Message(
                "bibliography.mailto is required by the index".to_string(),
            ));
        }

        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Generative call timeout as Duration
    pub fn generative_timeout(&self) -> Duration {
        Duration::from_secs(self.generative.timeout_secs)
    }

    /// Bibliographic call timeout as Duration
    pub fn bibliography_timeout(&self) -> Duration {
        Duration::from_secs(self.bibliography.timeout_secs)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: "postgres://localhost/litgraph".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
                run_migrations: false,
            },
            redis: RedisConfig::default(),
            generative: GenerativeConfig::default(),
            bibliography: BibliographyConfig::default(),
            recommender: RecommenderConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}
