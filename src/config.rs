use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_FETCH_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_MAX_REDIRECTS: usize = 5;
const DEFAULT_MAX_RESPONSE_SIZE: usize = 1024 * 1024;
const DEFAULT_RATE_LIMIT_PER_SECOND: u32 = 10;
const DEFAULT_RATE_LIMIT_BURST: u32 = 20;
const DEFAULT_DATABASE_URL: &str = "sqlite:favicon_cache.db";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub favicon_api_url: String,
    pub fetch_timeout_seconds: u64,
    pub max_redirects: usize,
    pub max_response_size: usize,
    pub rate_limit_per_second: u32,
    pub rate_limit_burst: u32,
    /// Empty selects the in-process store.
    pub database_url: String,
    pub user_agent: String,
    pub start_time: Instant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigData {
    pub port: u16,
    pub favicon_api_url: String,
    pub fetch_timeout_seconds: u64,
    pub max_redirects: usize,
    pub max_response_size: usize,
    pub rate_limit_per_second: u32,
    pub rate_limit_burst: u32,
    pub database_url: String,
    pub user_agent: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let mut settings = config::Config::builder()
            .set_default("port", Self::get_default_port())?
            .set_default("favicon_api_url", "")?
            .set_default("fetch_timeout_seconds", DEFAULT_FETCH_TIMEOUT_SECONDS)?
            .set_default("max_redirects", DEFAULT_MAX_REDIRECTS as i64)?
            .set_default("max_response_size", DEFAULT_MAX_RESPONSE_SIZE as i64)?
            .set_default("rate_limit_per_second", DEFAULT_RATE_LIMIT_PER_SECOND)?
            .set_default("rate_limit_burst", DEFAULT_RATE_LIMIT_BURST)?
            .set_default("database_url", DEFAULT_DATABASE_URL)?
            .set_default("user_agent", Self::default_user_agent())?;

        settings = Self::apply_env_overrides(settings)?;

        let config_data: ConfigData = settings.build()?.try_deserialize()?;
        let config = Self::from_data(config_data);
        config.validate()?;
        Ok(config)
    }

    /// Configuration for a given provider endpoint with every other value
    /// at its default. Useful for embedding and tests.
    pub fn with_api_url(favicon_api_url: impl Into<String>) -> Self {
        Self::from_data(ConfigData {
            port: DEFAULT_PORT,
            favicon_api_url: favicon_api_url.into(),
            fetch_timeout_seconds: DEFAULT_FETCH_TIMEOUT_SECONDS,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            rate_limit_per_second: DEFAULT_RATE_LIMIT_PER_SECOND,
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
            database_url: String::new(),
            user_agent: Self::default_user_agent(),
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        match url::Url::parse(&self.favicon_api_url) {
            Ok(u) if u.scheme() == "http" || u.scheme() == "https" => {}
            _ => {
                return Err(config::ConfigError::Message(format!(
                    "favicon_api_url must be an http(s) URL, got '{}'",
                    self.favicon_api_url
                )))
            }
        }

        if self.rate_limit_per_second == 0 || self.rate_limit_burst == 0 {
            return Err(config::ConfigError::Message(
                "rate_limit_per_second and rate_limit_burst must be greater than zero".to_string(),
            ));
        }

        if self.fetch_timeout_seconds == 0 {
            return Err(config::ConfigError::Message(
                "fetch_timeout_seconds must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    fn from_data(data: ConfigData) -> Self {
        Config {
            port: data.port,
            favicon_api_url: data.favicon_api_url,
            fetch_timeout_seconds: data.fetch_timeout_seconds,
            max_redirects: data.max_redirects,
            max_response_size: data.max_response_size,
            rate_limit_per_second: data.rate_limit_per_second,
            rate_limit_burst: data.rate_limit_burst,
            database_url: data.database_url,
            user_agent: data.user_agent,
            start_time: Instant::now(),
        }
    }

    fn default_user_agent() -> String {
        format!("favicon-service/{}", env!("CARGO_PKG_VERSION"))
    }

    fn get_default_port() -> u16 {
        std::env::var("PORT")
            .or_else(|_| std::env::var("HTTP_PORT"))
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    fn apply_env_overrides(mut settings: config::ConfigBuilder<config::builder::DefaultState>) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        let env_mappings = [
            ("FAVICON_API_URL", "favicon_api_url"),
            ("FAVICON_TIMEOUT_SECONDS", "fetch_timeout_seconds"),
            ("FAVICON_MAX_REDIRECTS", "max_redirects"),
            ("MAX_RESPONSE_SIZE", "max_response_size"),
            ("RATE_LIMIT_PER_SECOND", "rate_limit_per_second"),
            ("RATE_LIMIT_BURST", "rate_limit_burst"),
            ("DATABASE_URL", "database_url"),
            ("FAVICON_USER_AGENT", "user_agent"),
        ];

        for (env_var, config_key) in env_mappings {
            if let Ok(value) = std::env::var(env_var) {
                settings = settings.set_override(config_key, value)?;
            }
        }

        Ok(settings)
    }
}
