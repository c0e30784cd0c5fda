//! Error types for the ETL pipeline.
//!
//! Parsing is total by design and never produces an error: tokenization and
//! structural anomalies degrade to literal text or implicit closure, and bad
//! records become [`crate::normalize::Rejection`] diagnostics. Only
//! configuration, I/O and storage failures surface here.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the ETL library.
#[derive(Debug, Error)]
pub enum EtlError {
    /// Invalid dump date format.
    #[error("Invalid dump date: '{0}'. Expected YYYYMMDD (e.g., 20180706)")]
    InvalidDumpDate(String),

    /// Dump filename does not encode a date.
    #[error("Cannot determine dump date from filename: {}", .0.display())]
    UndatedDumpFile(PathBuf),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Destination database failure. Fatal for the run; no completion
    /// marker is written, so a retry reprocesses the dump from the start.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Taxonomy or record-kind configuration could not be parsed.
    #[error("Invalid taxonomy configuration: {0}")]
    TaxonomyConfig(#[from] serde_yaml_ng::Error),
}

/// Result type alias for ETL operations.
pub type Result<T> = std::result::Result<T, EtlError>;
