//! Unified infrastructure error type.

use thiserror::Error;

use crate::config::ConfigError;

/// The error type returned by rota's fallible startup and transport operations.
///
/// Request-level problems (404, 400, 401, …) are [`Failure`](crate::Failure)
/// values and never show up here. This type surfaces what stops the process
/// from serving at all: reading configuration, connecting the database,
/// binding a port.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("database connection failed: {0}")]
    Connect(String),
}
