//! Application configuration

use std::env;
use std::time::Duration;

/// Routing-layer configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Platform base domain, e.g. "quillhost.com" for *.quillhost.com routing
    pub base_domain: String,
    /// Base URL of the external handle directory
    pub directory_url: String,
    pub redis_url: String,

    // Locales
    pub default_locale: String,
    pub supported_locales: Vec<String>,
    /// Whether the default locale must appear as a path prefix
    pub prefix_default_locale: bool,
    pub locale_cookie: String,

    // Cache discipline
    pub cache_ttl: Duration,
    /// TTL for domain-verification results. Bounded so a detached
    /// domain stops forwarding within this window.
    pub verify_ttl: Duration,
    pub max_refresh_jitter: Duration,
    pub refresh_queue_depth: usize,
    pub refresh_concurrency: usize,

    // Directory I/O
    pub directory_timeout: Duration,
    pub hostname_retry_count: usize,
}

impl Config {
    /// Load configuration from environment variables. A `.env` file is
    /// honored in development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let default_locale = env::var("DEFAULT_LOCALE")
            .unwrap_or_else(|_| "en".to_string())
            .to_lowercase();

        let supported_locales: Vec<String> = env::var("SUPPORTED_LOCALES")
            .unwrap_or_else(|_| "en,zh,ja,fr".to_string())
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        if !supported_locales.contains(&default_locale) {
            return Err(ConfigError::Invalid(
                "SUPPORTED_LOCALES must contain DEFAULT_LOCALE",
            ));
        }

        Ok(Self {
            base_domain: env::var("BASE_DOMAIN")
                .map_err(|_| ConfigError::Missing("BASE_DOMAIN"))?
                .to_lowercase(),
            directory_url: env::var("DIRECTORY_URL")
                .map_err(|_| ConfigError::Missing("DIRECTORY_URL"))?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),

            default_locale,
            supported_locales,
            prefix_default_locale: env::var("PREFIX_DEFAULT_LOCALE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            locale_cookie: env::var("LOCALE_COOKIE")
                .unwrap_or_else(|_| "preferred_locale".to_string()),

            cache_ttl: duration_secs("CACHE_TTL_SECONDS", 300),
            verify_ttl: duration_secs("VERIFY_TTL_SECONDS", 600),
            max_refresh_jitter: duration_millis("MAX_REFRESH_JITTER_MS", 2000),
            refresh_queue_depth: parse_env("REFRESH_QUEUE_DEPTH", 256),
            refresh_concurrency: parse_env("REFRESH_CONCURRENCY", 8),

            directory_timeout: duration_millis("DIRECTORY_TIMEOUT_MS", 5000),
            hostname_retry_count: parse_env("HOSTNAME_RETRY_COUNT", 3),
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn duration_secs(name: &str, default: u64) -> Duration {
    Duration::from_secs(parse_env(name, default))
}

fn duration_millis(name: &str, default: u64) -> Duration {
    Duration::from_millis(parse_env(name, default))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}
