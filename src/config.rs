use std::{env, path::PathBuf};
use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_MEDIA_ROOT: &str = "./media";
const DEFAULT_FILE_SIZE_LIMIT: usize = 5 * 1024 * 1024;
const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;
const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub secret: String,
    pub media_root: PathBuf,
    pub file_size_limit: usize,
    pub token_ttl_hours: i64,
    pub owner_email: Option<String>,
    pub owner_password: Option<String>,
}

impl Config {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            bind_addr: optional("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned()),
            secret: required("SECRET")?,
            media_root: optional("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MEDIA_ROOT)),
            file_size_limit: parsed("FILE_SIZE_LIMIT", DEFAULT_FILE_SIZE_LIMIT)?,
            token_ttl_hours: token_ttl(parsed("TOKEN_TTL_HOURS", DEFAULT_TOKEN_TTL_HOURS)?)?,
            owner_email: optional("OWNER_EMAIL"),
            owner_password: optional("OWNER_PASSWORD"),
        })
    }

    /// Settings for an in-process instance; used by the integration tests.
    pub fn for_database(database_url: impl Into<String>, media_root: impl Into<PathBuf>) -> Self {
        Config {
            database_url: database_url.into(),
            bind_addr: "127.0.0.1:0".to_owned(),
            secret: "booktime-local-secret".to_owned(),
            media_root: media_root.into(),
            file_size_limit: DEFAULT_FILE_SIZE_LIMIT,
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            owner_email: None,
            owner_password: None,
        }
    }
}

fn optional(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

fn token_ttl(hours: i64) -> Result<i64, ConfigError> {
    if (1..=MAX_TOKEN_TTL_HOURS).contains(&hours) {
        Ok(hours)
    } else {
        Err(ConfigError::Invalid {
            name: "TOKEN_TTL_HOURS",
            value: hours.to_string(),
        })
    }
}
