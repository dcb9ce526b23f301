// src/error.rs
//! Crate-wide error type.
//!
//! Registry reads and writes are infallible; these variants cover the
//! caller-side checks, the persisted store and configuration loading.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("entity {0} not found")]
    NotFound(u64),

    #[error("secondary key '{secondary}' already held by entity {holder}")]
    DuplicateSecondaryKey { secondary: String, holder: u64 },

    #[error("permission denied")]
    PermissionDenied,

    #[error("store error: {0}")]
    Store(String),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Config(err.to_string())
    }
}
