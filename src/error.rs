//! Error taxonomy for the prediction pipeline.
//!
//! Transport-level variants (`Http`, `Status`) are produced inside the
//! observation store and converted to [`TideError::DataUnavailable`] before
//! they reach a caller. `FitFailure` leaves any previously cached model usable.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TideError {
    /// HTTP request failed (network, timeout, TLS)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote source answered with a non-success status
    #[error("remote source returned HTTP {0}")]
    Status(u16),

    /// Tabular data could not be understood
    #[error("malformed observation data: {0}")]
    Parse(String),

    /// Cache file operations failed (permissions, disk space)
    #[error("cache IO: {0}")]
    Cache(#[from] io::Error),

    /// Model blob could not be encoded or decoded
    #[error("model serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Neither the remote source nor the local cache could supply data
    #[error("no observation data available: {0}")]
    DataUnavailable(String),

    /// Harmonic fit was underdetermined or the solver did not converge
    #[error("harmonic fit failed: {0}")]
    FitFailure(String),
}
