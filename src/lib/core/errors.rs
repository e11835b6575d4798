//! Error types shared across the edquant library.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EdquantError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("htslib error: {0}")]
    Htslib(#[from] rust_htslib::errors::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Missing column '{column}' in {path}")]
    MissingColumn { column: String, path: String },

    #[error("Threshold validation error: {field} must be between {min} and {max}, got {value}")]
    ThresholdValidation {
        field: String,
        min: f64,
        max: f64,
        value: f64,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EdquantError>;

/// Returns `true` if the error originated from a broken pipe.
#[inline]
pub fn is_broken_pipe(err: &anyhow::Error) -> bool {
    err.root_cause()
        .downcast_ref::<io::Error>()
        .map(|io_err| io_err.kind() == io::ErrorKind::BrokenPipe)
        .unwrap_or(false)
}
