use std::fmt;

use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};

use crate::error::ConfigError;

const MIN_RECOMMENDED_SECRET_LENGTH: usize = 32;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub token: TokenSettings,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

impl ApplicationSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    pub max_connections: u32,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("username", &self.username)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_name", &self.database_name)
            .finish_non_exhaustive()
    }
}

/// Access/refresh token settings
#[derive(serde::Deserialize, Clone)]
pub struct TokenSettings {
    /// HMAC signing key. Required; there is no fallback value.
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    /// Lifetime of access and refresh tokens (seconds)
    pub ttl_seconds: i64,
}

impl TokenSettings {
    /// Token lifetime; zero when `ttl_seconds` is outside chrono's range,
    /// which [`TokenSettings::validate`] rejects
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::try_seconds(self.ttl_seconds).unwrap_or_else(chrono::Duration::zero)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("token.secret".to_string()));
        }
        if self.secret.len() < MIN_RECOMMENDED_SECRET_LENGTH {
            tracing::warn!(
                length = self.secret.len(),
                "token.secret is shorter than {} bytes",
                MIN_RECOMMENDED_SECRET_LENGTH
            );
        }
        // Upper bound keeps `now + ttl` far inside chrono's range
        if self.ttl_seconds <= 0 || self.ttl_seconds > 366 * 24 * 60 * 60 {
            return Err(ConfigError::InvalidValue(format!(
                "token.ttl_seconds must be between 1 and one year, got {}",
                self.ttl_seconds
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSettings")
            .field("secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

/// Load settings from an optional `configuration` file and `APP_*`
/// environment variables (e.g. `APP_TOKEN__SECRET`).
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let builder = config::Config::builder()
        .add_source(File::with_name("configuration").required(false))
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
    settings_from(builder)
}

/// Apply defaults beneath `builder`'s sources, deserialize and validate
pub fn settings_from(builder: ConfigBuilder<DefaultState>) -> Result<Settings, ConfigError> {
    let settings = builder
        .set_default("application.host", "127.0.0.1")?
        .set_default("application.port", 3000)?
        .set_default("database.username", "postgres")?
        .set_default("database.password", "password")?
        .set_default("database.host", "localhost")?
        .set_default("database.port", 5432)?
        .set_default("database.database_name", "ticket_booking")?
        .set_default("database.max_connections", 5)?
        .set_default("token.secret", "")?
        .set_default("token.issuer", "app")?
        .set_default("token.audience", "app")?
        .set_default("token.ttl_seconds", 24 * 60 * 60)?
        .build()?
        .try_deserialize::<Settings>()?;

    settings.token.validate()?;
    Ok(settings)
}
