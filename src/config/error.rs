//! Configuration error types.
//!
//! These are fatal: the process logs them and exits non-zero.

use std::path::PathBuf;
use thiserror::Error;

/// Deployment-manifest and environment errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid JSON in `{0}`")]
    Json(PathBuf, #[source] serde_json::Error),

    #[error("unsupported config version {0} (only version 2 is supported)")]
    UnsupportedVersion(u64),

    #[error("invalid build entry `{src}`: {message}")]
    InvalidBuild { src: String, message: String },

    #[error("invalid route pattern `{src}`: {message}")]
    InvalidRoute { src: String, message: String },

    #[error("missing secret `{name}` referenced by `{var}` (add it to `{file}`)")]
    MissingSecret {
        name: String,
        var: String,
        file: String,
    },

    #[error("malformed line in `{0}`: {1}")]
    EnvFile(PathBuf, String),
}
