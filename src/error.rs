//! Error types for annbench

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed record #{record}: {reason}")]
    MalformedRecord { record: u64, reason: String },

    #[error("Dispatch failed for item {index}: {source}")]
    Dispatch {
        index: u64,
        #[source]
        source: Box<Error>,
    },

    #[error("Operation {index} timed out after {timeout:?}")]
    OperationTimeout { index: u64, timeout: Duration },

    #[error("Operation {index} panicked")]
    OperationPanicked { index: u64 },

    #[error("Aggregation error: {0}")]
    Aggregation(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    #[error("Namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn malformed(record: u64, reason: impl Into<String>) -> Self {
        Error::MalformedRecord {
            record,
            reason: reason.into(),
        }
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Error::Store(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Whether this error aborts the phase that produced it.
    ///
    /// Decode and dispatch errors are fatal; everything else is an
    /// isolated per-operation failure.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::MalformedRecord { .. } | Error::Dispatch { .. })
    }
}
