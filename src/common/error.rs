//! Error types shared across the provider subsystem

use std::io;
use thiserror::Error;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("vehicle fetch failed: {0}")]
    VehicleFetch(String),

    #[error("parse failed: {0}")]
    ParseFailure(String),

    #[error("invalid filter regex: {0}")]
    FilterRegex(String),

    #[error("schema missing required field: {0}")]
    SchemaMissing(String),

    #[error("unsupported vehicle type: {0}")]
    VehicleType(String),

    #[error("provider not found: {0}")]
    NotFound(String),

    #[error("update failed: {0}")]
    UpdateFailed(String),

    #[error("cancelled")]
    Cancelled,

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn vehicle_fetch<S: Into<String>>(msg: S) -> Self {
        Error::VehicleFetch(msg.into())
    }

    pub fn parse_failure<S: Into<String>>(msg: S) -> Self {
        Error::ParseFailure(msg.into())
    }

    pub fn filter_regex<S: Into<String>>(msg: S) -> Self {
        Error::FilterRegex(msg.into())
    }

    pub fn schema_missing<S: Into<String>>(msg: S) -> Self {
        Error::SchemaMissing(msg.into())
    }

    pub fn vehicle_type<S: Into<String>>(msg: S) -> Self {
        Error::VehicleType(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn update_failed<S: Into<String>>(msg: S) -> Self {
        Error::UpdateFailed(msg.into())
    }

    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Error::Unsupported(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::ParseFailure(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::ParseFailure(e.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        Error::FilterRegex(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::VehicleFetch(e.to_string())
    }
}

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let e = Error::config("test error");
        assert!(matches!(e, Error::Config(_)));
    }

    #[test]
    fn test_error_display() {
        let e = Error::parse_failure("zero valid proxies");
        assert_eq!(e.to_string(), "parse failed: zero valid proxies");
    }
}
