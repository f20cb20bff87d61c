//! # Settings
//!
//! Layered configuration: built-in defaults, then `config/default.toml`,
//! then `config/{TASTEMAP_ENV}.toml`, then `TASTEMAP__SECTION__KEY`
//! environment variables. A `.env` file is read first when present.

use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tm_core::filter::TagFilterMode;

pub const ENV_PREFIX: &str = "TASTEMAP";
pub const ENV_SELECTOR: &str = "TASTEMAP_ENV";
pub const DEFAULT_ENV: &str = "development";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting `{key}`: {message}")]
    Invalid { key: &'static str, message: String },
}

impl ConfigError {
    fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid { key, message: message.into() }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl ServerSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    pub url: SecretString,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl DatabaseSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthSettings {
    /// Keys the session token signatures
    pub session_secret: SecretString,
    pub session_ttl_hours: i64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SearchSettings {
    pub default_limit: u32,
    pub max_limit: u32,
    pub tag_filter: TagFilterMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub format: LogFormat,
    /// `EnvFilter` directives; `RUST_LOG` wins when set
    pub filter: String,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub search: SearchSettings,
    pub log: LogSettings,
    /// Value of `TASTEMAP_ENV` the settings were loaded for
    #[serde(skip)]
    pub environment: String,
}

impl Settings {
    /// Reads `.env`, the config files and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let env_name = std::env::var(ENV_SELECTOR).unwrap_or_else(|_| DEFAULT_ENV.into());

        let builder = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{env_name}")).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );
        let mut settings = Self::from_builder(builder)?;
        settings.environment = env_name;
        Ok(settings)
    }

    /// Built-in values every other layer overrides.
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Ok(Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.request_timeout_secs", 15)?
            .set_default("database.url", "postgres://localhost/tastemap")?
            .set_default("database.max_connections", 10)?
            .set_default("database.acquire_timeout_secs", 5)?
            .set_default("auth.session_secret", "")?
            .set_default("auth.session_ttl_hours", 168)?
            .set_default("search.default_limit", 10)?
            .set_default("search.max_limit", 100)?
            .set_default("search.tag_filter", "advisory")?
            .set_default("log.format", "pretty")?
            .set_default("log.filter", "info")?)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search.default_limit == 0 {
            return Err(ConfigError::invalid("search.default_limit", "must be at least 1"));
        }
        if self.search.max_limit < self.search.default_limit {
            return Err(ConfigError::invalid(
                "search.max_limit",
                format!("must be >= search.default_limit ({})", self.search.default_limit),
            ));
        }
        if self.auth.session_secret.expose_secret().trim().is_empty() {
            return Err(ConfigError::invalid("auth.session_secret", "must be set"));
        }
        if self.auth.session_ttl_hours <= 0 {
            return Err(ConfigError::invalid("auth.session_ttl_hours", "must be positive"));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::invalid("database.max_connections", "must be at least 1"));
        }
        Ok(())
    }
}
