/// Error taxonomy for the analysis engine
///
/// Validation failures are terminal for the single call that produced them.
/// Business outcomes (no changes, empty corpus, empty timeline) are never errors.
use std::path::PathBuf;

use thiserror::Error;

use crate::tree::FieldPath;

/// Errors returned by engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input rejected before analysis; never retried
    #[error("validation error at {path}: {message}")]
    Validation { path: String, message: String },

    /// Unexpected failure inside an analysis step, cause preserved
    #[error("internal error while {context}")]
    Internal {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Rule tables could not be loaded or compiled
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    /// Validation error anchored at a field path
    pub fn validation(path: &FieldPath, message: impl Into<String>) -> Self {
        EngineError::Validation {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Validation error anchored at a named input (document id, event id)
    pub fn invalid_input(subject: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Validation {
            path: subject.into(),
            message: message.into(),
        }
    }

    pub fn internal<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        EngineError::Internal {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, EngineError::Validation { .. })
    }
}

/// Errors raised while loading or compiling an `EngineConfig`
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid rule `{pattern}` in {table}: {source}")]
    InvalidRule {
        table: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
