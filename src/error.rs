//! Error types for the histore service.

use std::error::Error as StdError;
use std::fmt;
use std::result;

/// A specialized Result type for histore operations.
pub type Result<T> = result::Result<T, Error>;

/// The error type for histore operations.
#[derive(Debug)]
pub enum Error {
    /// Request validation errors, rejected before any I/O
    InvalidRequest(String),
    /// Sample store read/write failures
    Storage(String),
    /// Export file write failures
    Write(String),
    /// Configuration errors
    Config(String),
    /// I/O errors
    Io(std::io::Error),
    /// Arrow-related errors
    Arrow(String),
    /// Serialization/deserialization errors
    Serialization(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Error::Storage(msg) => write!(f, "Storage error: {}", msg),
            Error::Write(msg) => write!(f, "Write error: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Arrow(msg) => write!(f, "Arrow error: {}", msg),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<arrow::error::ArrowError> for Error {
    fn from(err: arrow::error::ArrowError) -> Self {
        Error::Arrow(err.to_string())
    }
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Write(err.to_string())
    }
}

impl From<parquet::errors::ParquetError> for Error {
    fn from(err: parquet::errors::ParquetError) -> Self {
        Error::Write(err.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for Error {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        Error::Write(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
