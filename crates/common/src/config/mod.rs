//! Configuration management for ResearchEase services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values
//!
//! Every field has a default, so `AppConfig::default()` describes a fully
//! in-memory deployment suitable for local development and tests.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Relational persistence configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Supabase project settings (REST, storage, and auth backends)
    #[serde(default)]
    pub supabase: SupabaseConfig,

    /// Session store configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Object storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// File intake limits
    #[serde(default)]
    pub intake: IntakeConfig,

    /// Analysis generator configuration
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Background reconciliation configuration
    #[serde(default)]
    pub reconciler: ReconcilerConfig,

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

    /// Route clients are sent to when a session is required
    #[serde(default = "default_auth_route")]
    pub auth_route: String,
}

/// Which relational backend holds the `papers` and `analyses` tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    /// Direct Postgres connection through SeaORM (transactional writes)
    Postgres,
    /// Supabase PostgREST endpoint
    Rest,
    /// Process-local tables
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_backend")]
    pub backend: DatabaseBackend,

    /// Postgres URL (postgres backend only)
    #[serde(default = "default_database_url")]
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

    /// Create tables on start-up if they are missing
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SupabaseConfig {
    /// Project URL, e.g. https://xyz.supabase.co
    pub url: Option<String>,

    /// Public anon key, sent as `apikey` on every request
    pub anon_key: Option<String>,

    /// Service-role key used by the server for table and storage access
    pub service_key: Option<String>,

    /// JWT secret used to validate access tokens locally
    pub jwt_secret: Option<String>,
}

/// Which backend issues and checks sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthBackendKind {
    /// Supabase GoTrue
    Supabase,
    /// Process-local accounts with locally signed tokens
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default = "default_auth_backend")]
    pub backend: AuthBackendKind,

    /// Lifetime of tokens issued by the memory backend
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    /// Seconds a resolved session is trusted before the token is checked again
    #[serde(default = "default_session_cache")]
    pub session_cache_secs: u64,
}

/// Which backend stores uploaded paper binaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    Supabase,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackendKind,

    /// Bucket holding uploaded papers
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Cache-Control max-age sent with each upload
    #[serde(default = "default_cache_control")]
    pub cache_control: String,

    /// Overwrite an existing object at the same path
    #[serde(default)]
    pub upsert: bool,

    /// Request timeout in seconds for storage, REST and auth calls
    #[serde(default = "default_storage_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IntakeConfig {
    /// Maximum accepted file size in megabytes
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: usize,

    /// Accepted declared media type prefix
    #[serde(default = "default_accepted_media")]
    pub accepted_media_prefix: String,

    /// An untouched intake (and its staged file) is dropped after this many seconds
    #[serde(default = "default_intake_idle")]
    pub idle_timeout_secs: u64,
}

/// Which analyzer produces analysis content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerKind {
    /// Fixed placeholder payload
    Fixed,
    /// Text extraction plus an OpenAI-compatible chat model
    Llm,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_analyzer")]
    pub provider: AnalyzerKind,

    /// Chat completions endpoint
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// API key; when absent the LLM analyzer falls back to the fixed payload
    pub api_key: Option<String>,

    /// Model to use
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Maximum elapsed time spent retrying, in seconds
    #[serde(default = "default_llm_retry_budget")]
    pub max_retry_secs: u64,

    /// Extracted text beyond this many characters is dropped from the prompt
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconcilerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between recovery passes
    #[serde(default = "default_reconcile_interval")]
    pub interval_secs: u64,

    /// A paper still `processing` after this many seconds is re-analyzed
    #[serde(default = "default_stuck_after")]
    pub stuck_after_secs: u64,

    /// Objects without a paper row older than this are deleted
    #[serde(default = "default_orphan_grace")]
    pub orphan_grace_secs: u64,
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

    /// Service name reported in logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Upload requests per second (whole service)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 120 }
fn default_auth_route() -> String { "/auth".to_string() }
fn default_database_backend() -> DatabaseBackend { DatabaseBackend::Memory }
fn default_database_url() -> String { "postgres://localhost/researchease".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_auth_backend() -> AuthBackendKind { AuthBackendKind::Memory }
fn default_token_ttl() -> u64 { 3600 }
fn default_session_cache() -> u64 { 60 }
fn default_storage_backend() -> StorageBackendKind { StorageBackendKind::Memory }
fn default_bucket() -> String { "papers".to_string() }
fn default_cache_control() -> String { "3600".to_string() }
fn default_storage_timeout() -> u64 { 60 }
fn default_max_size_mb() -> usize { 10 }
fn default_accepted_media() -> String { "application/pdf".to_string() }
fn default_intake_idle() -> u64 { 1800 }
fn default_analyzer() -> AnalyzerKind { AnalyzerKind::Fixed }
fn default_llm_endpoint() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_llm_timeout() -> u64 { 60 }
fn default_llm_retry_budget() -> u64 { 90 }
fn default_max_input_chars() -> usize { 48_000 }
fn default_reconcile_interval() -> u64 { 300 }
fn default_stuck_after() -> u64 { 600 }
fn default_orphan_grace() -> u64 { 3600 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "researchease".to_string() }
fn default_rate_limit() -> u32 { 5 }
fn default_burst() -> u32 { 20 }
fn default_true() -> bool { true }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            auth_route: default_auth_route(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_database_backend(),
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            run_migrations: true,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            backend: default_auth_backend(),
            token_ttl_secs: default_token_ttl(),
            session_cache_secs: default_session_cache(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            bucket: default_bucket(),
            cache_control: default_cache_control(),
            upsert: false,
            timeout_secs: default_storage_timeout(),
        }
    }
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_size_mb: default_max_size_mb(),
            accepted_media_prefix: default_accepted_media(),
            idle_timeout_secs: default_intake_idle(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            provider: default_analyzer(),
            endpoint: default_llm_endpoint(),
            api_key: None,
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
            max_retry_secs: default_llm_retry_budget(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_reconcile_interval(),
            stuck_after_secs: default_stuck_after(),
            orphan_grace_secs: default_orphan_grace(),
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
            enabled: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__SUPABASE__URL=https://xyz.supabase.co
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

    /// Idle time after which a user's intake is dropped
    pub fn intake_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.intake.idle_timeout_secs)
    }

    /// Maximum intake size in bytes
    pub fn max_upload_bytes(&self) -> usize {
        self.intake.max_size_mb * 1024 * 1024
    }

    /// Check that every remote backend selected has the settings it needs
    pub fn validate(&self) -> Result<(), String> {
        let needs_supabase = self.database.backend == DatabaseBackend::Rest
            || self.storage.backend == StorageBackendKind::Supabase
            || self.auth.backend == AuthBackendKind::Supabase;

        if needs_supabase {
            if self.supabase.url.is_none() {
                return Err("supabase.url is required for the rest/supabase backends".into());
            }
            if self.supabase.anon_key.is_none() {
                return Err("supabase.anon_key is required for the rest/supabase backends".into());
            }
        }

        if self.intake.max_size_mb == 0 {
            return Err("intake.max_size_mb must be greater than zero".into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.bucket, "papers");
        assert_eq!(config.storage.cache_control, "3600");
        assert!(!config.storage.upsert);
        assert_eq!(config.analysis.provider, AnalyzerKind::Fixed);
        assert_eq!(config.database.backend, DatabaseBackend::Memory);
    }

    #[test]
    fn test_max_upload_bytes() {
        let config = AppConfig::default();
        assert_eq!(config.max_upload_bytes(), 10 * 1024 * 1024);
    }

    #[test]
    fn test_validate_requires_supabase_settings() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_ok());

        config.auth.backend = AuthBackendKind::Supabase;
        assert!(config.validate().is_err());

        config.database.backend = DatabaseBackend::Rest;
        assert!(config.validate().is_err());

        config.supabase.url = Some("https://example.supabase.co".into());
        config.supabase.anon_key = Some("anon".into());
        assert!(config.validate().is_ok());
    }
}
