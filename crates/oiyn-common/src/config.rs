//! Application configuration loaded from environment variables and config files.
//!
//! Supports `.env` files for development and environment variables for production.
//! Config precedence: env vars > .env file > config.toml > defaults
//!
//! The loaded [`AppConfig`] is owned by the binary and handed to each component
//! that needs it.

use serde::Deserialize;
use std::time::Duration;

impl AppConfig {
    /// Load configuration from the environment.
    ///
    /// Should be called once at application startup.
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load .env file if present (development)
        let _ = dotenvy::dotenv();

        let cfg = config::Config::builder()
            // Defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("server.request_timeout_secs", 100)?
            .set_default("database.max_connections", 20)?
            .set_default("database.min_connections", 2)?
            .set_default("auth.jwt_secret", "")?
            .set_default("auth.access_token_ttl_secs", 3600)? // 1 hour
            .set_default("auth.refresh_token_ttl_secs", 604_800)? // 7 days
            .set_default("sweeper.enabled", true)?
            .set_default("sweeper.interval_secs", 60)?
            .set_default("limits.default_page_size", 10)?
            .set_default("limits.max_page_size", 100)?
            .set_default("limits.max_message_length", 2000)?
            .set_default("log.format", "pretty")?
            // Optional config file
            .add_source(config::File::with_name("config").required(false))
            // Environment variables (OIYN__SERVER__PORT, OIYN__DATABASE__URL, etc.)
            .add_source(
                config::Environment::with_prefix("OIYN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        cfg.try_deserialize()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub sweeper: SweeperConfig,
    pub limits: LimitsConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound for a single request, including its database round trips.
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL: optional; omit for lite / in-process-only mode.
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// JWT signing secret (HS256). Empty means "generate one at startup".
    pub jwt_secret: String,
    /// Access token TTL in seconds
    pub access_token_ttl_secs: u64,
    /// Refresh token TTL in seconds
    pub refresh_token_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SweeperConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl SweeperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub max_message_length: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 100,
            max_message_length: 2000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
}
