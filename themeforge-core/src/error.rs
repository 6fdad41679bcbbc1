//! Build Errors - one taxonomy for every stage
//!
//! Every error is terminal for the build. Nothing is retried and nothing is
//! written once one of these is raised.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Parse error in {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("Duplicate theme id '{id}' declared in {} and {}", first.display(), second.display())]
    DuplicateId {
        id: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Unsupported value for attribute '{key}' in theme '{theme}': {kind}")]
    UnsupportedValue {
        theme: String,
        key: String,
        kind: String,
    },

    #[error("No theme sources found under {}", root.display())]
    EmptyInput { root: PathBuf },

    #[error("Encoding limit exceeded: {what} is {len}, maximum is {max}")]
    EncodingLimit { what: String, len: u64, max: u64 },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} requires builder >= {required}, current is {current}", path.display())]
    BuilderVersionMismatch {
        path: PathBuf,
        required: String,
        current: String,
    },

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("Corrupt bundle: {0}")]
    CorruptBundle(String),

    #[error("Invalid bundle: {0}")]
    InvalidBundle(String),

    #[error("Invalid configuration in {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
