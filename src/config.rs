//! Process configuration read from the environment.
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `HOST` | `0.0.0.0` | interface to bind |
//! | `PORT` | `3000` | port to bind |
//! | `DATABASE_URL` | `memory://rota` | connection string handed to [`Database::connect`](crate::store::Database::connect) |
//! | `BODY_LIMIT` | `1048576` | largest request body, in bytes, before the server answers `413` |
//!
//! Logging verbosity is controlled separately through `RUST_LOG`
//! (see [`telemetry::init`](crate::telemetry::init)).

use std::net::SocketAddr;

use thiserror::Error;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DATABASE_URL: &str = "memory://rota";
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Settings needed to start a server process.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub body_limit: usize,
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    #[error("invalid port `{0}`")]
    InvalidPort(String),
    #[error("invalid listen address `{0}`")]
    InvalidAddr(String),
    #[error("invalid body limit `{0}`")]
    InvalidBodyLimit(String),
}

impl Config {
    /// Reads `HOST`, `PORT`, `DATABASE_URL` and `BODY_LIMIT`, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Config::from_env) but over any key lookup, so the
    /// parsing rules can be exercised without touching the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_owned());
        let port = match lookup("PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidPort(raw))?,
            None => DEFAULT_PORT,
        };
        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_owned());
        let body_limit = match lookup("BODY_LIMIT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidBodyLimit(raw))?,
            None => DEFAULT_BODY_LIMIT,
        };
        Ok(Self { host, port, database_url, body_limit })
    }

    /// The `host:port` pair as a socket address.
    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse().map_err(|_| ConfigError::InvalidAddr(raw))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            database_url: DEFAULT_DATABASE_URL.to_owned(),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}
