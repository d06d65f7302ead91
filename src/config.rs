use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use std::env;
use thiserror::Error;

const DB_USER: &str = "DB_USER";
const DB_PASSWORD: &str = "DB_PASSWORD";
const DB_HOST: &str = "DB_HOST";
const DB_PORT: &str = "DB_PORT";
const DB_NAME: &str = "DB_NAME";
const DB_SSLMODE: &str = "DB_SSLMODE";

/// Connection parameters for PostgreSQL, sourced from `DB_*` environment variables.
#[derive(Debug)]
pub struct PgConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<SecretString>,
    pub dbname: String,
    pub sslmode: PgSslMode,
}

impl PgConfig {
    /// Load from the process environment, see [PgConfig::from_lookup].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load using the given lookup function. `DB_USER`, `DB_HOST`, `DB_PORT` and `DB_NAME` are
    /// required; unset or blank required keys are reported together. `DB_PASSWORD` is optional
    /// and `DB_SSLMODE` defaults to `prefer`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value =
            |key: &'static str| lookup(key).filter(|value: &String| !value.trim().is_empty());

        let mut missing = vec![];
        let mut required = |key: &'static str| {
            let value = value(key);
            if value.is_none() {
                missing.push(key);
            }
            value.unwrap_or_default()
        };
        let user = required(DB_USER);
        let host = required(DB_HOST);
        let port = required(DB_PORT);
        let dbname = required(DB_NAME);
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let port = port.trim().parse::<u16>().map_err(|error| ConfigError::Invalid {
            key: DB_PORT,
            reason: error.to_string(),
        })?;

        let sslmode = value(DB_SSLMODE)
            .map(|sslmode| {
                sslmode
                    .trim()
                    .parse::<PgSslMode>()
                    .map_err(|error| ConfigError::Invalid {
                        key: DB_SSLMODE,
                        reason: error.to_string(),
                    })
            })
            .transpose()?
            .unwrap_or(PgSslMode::Prefer);

        let password = lookup(DB_PASSWORD).map(SecretString::new);

        Ok(Self {
            host,
            port,
            user,
            password,
            dbname,
            sslmode,
        })
    }
}

impl From<PgConfig> for PgConnectOptions {
    fn from(config: PgConfig) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .username(&config.user)
            .database(&config.dbname)
            .port(config.port)
            .ssl_mode(config.sslmode);

        match &config.password {
            Some(password) => options.password(password.expose_secret()),
            None => options,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration keys: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid value for configuration key {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
