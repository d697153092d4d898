// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the harvesting pipeline.
//!
//! This module defines every error that can surface while declaring fields,
//! seeding them, or monitoring sources for changes. All errors use `thiserror`.

use crate::domain::Source;
use std::num::{ParseFloatError, ParseIntError};
use std::str::ParseBoolError;
use thiserror::Error;

/// The main error type for harvesting operations.
///
/// It is marked as `#[non_exhaustive]` to allow for future additions without
/// breaking backwards compatibility.
///
/// # Examples
///
/// ```
/// use harvestcfg::domain::{ConfigError, Source};
///
/// let error = ConfigError::DuplicateKey {
///     origin: Source::Redis,
///     key: "app:log-level".to_string(),
/// };
/// assert_eq!(
///     error.to_string(),
///     "redis key app:log-level already exists in monitor map"
/// );
/// ```
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A constructor or entry point was handed an unusable argument.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong with the argument
        message: String,
    },

    /// Two fields claim the same key of the same source.
    #[error("{origin} key {key} already exists in monitor map")]
    DuplicateKey {
        /// The source both fields are bound to
        origin: Source,
        /// The contested key
        key: String,
    },

    /// A field is bound to a store source but no getter was registered for it.
    #[error("{origin} getter required")]
    MissingGetter {
        /// The source lacking a getter
        origin: Source,
    },

    /// One or more fields received no value from any of their sources.
    #[error("{}", unseeded_message(.fields))]
    Unseeded {
        /// Names of the fields left without a value, in declaration order
        fields: Vec<String>,
    },

    /// Failed to convert a raw text value to a field's type.
    #[error(
        "Failed to convert configuration value for key '{key}' to type {target_type}: {source}"
    )]
    TypeConversionError {
        /// The field or key being converted
        key: String,
        /// The target type name
        target_type: String,
        /// The underlying conversion error
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An error occurred while talking to a configuration source.
    #[error("Configuration source '{source_name}' error: {message}")]
    SourceError {
        /// The name of the source that encountered the error
        source_name: String,
        /// The error message
        message: String,
        /// The underlying error, if any
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Failed to parse a settings file or a store payload.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// The error message
        message: String,
        /// The underlying parsing error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An error occurred in a watcher.
    #[error("Configuration watcher error: {message}")]
    WatcherError {
        /// The error message
        message: String,
        /// The underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An I/O error occurred while reading configuration.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

fn unseeded_message(fields: &[String]) -> String {
    fields
        .iter()
        .map(|name| format!("field {} not seeded", name))
        .collect::<Vec<_>>()
        .join(", ")
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        ConfigError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a TypeConversionError from a ParseIntError.
    pub fn from_parse_int_error(key: String, err: ParseIntError) -> Self {
        ConfigError::TypeConversionError {
            key,
            target_type: "integer".to_string(),
            source: Box::new(err),
        }
    }

    /// Creates a TypeConversionError from a ParseFloatError.
    pub fn from_parse_float_error(key: String, err: ParseFloatError) -> Self {
        ConfigError::TypeConversionError {
            key,
            target_type: "float".to_string(),
            source: Box::new(err),
        }
    }

    /// Creates a TypeConversionError from a ParseBoolError.
    pub fn from_parse_bool_error(key: String, err: ParseBoolError) -> Self {
        ConfigError::TypeConversionError {
            key,
            target_type: "boolean".to_string(),
            source: Box::new(err),
        }
    }
}

/// A specialized Result type for harvesting operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_error() {
        let error = ConfigError::invalid_argument("poll interval should be a positive number");
        assert_eq!(
            error.to_string(),
            "Invalid argument: poll interval should be a positive number"
        );
    }

    #[test]
    fn test_duplicate_key_error() {
        let error = ConfigError::DuplicateKey {
            origin: Source::Consul,
            key: "app/level".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "consul key app/level already exists in monitor map"
        );
    }

    #[test]
    fn test_missing_getter_error() {
        let error = ConfigError::MissingGetter {
            origin: Source::Redis,
        };
        assert_eq!(error.to_string(), "redis getter required");
    }

    #[test]
    fn test_unseeded_lists_every_field() {
        let error = ConfigError::Unseeded {
            fields: vec!["timeout".to_string(), "region".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "field timeout not seeded, field region not seeded"
        );
    }

    #[test]
    fn test_source_error() {
        let error = ConfigError::SourceError {
            source_name: "consul".to_string(),
            message: "connection refused".to_string(),
            source: None,
        };
        assert_eq!(
            error.to_string(),
            "Configuration source 'consul' error: connection refused"
        );
    }

    #[test]
    fn test_watcher_error() {
        let error = ConfigError::WatcherError {
            message: "no tokio runtime".to_string(),
            source: None,
        };
        assert_eq!(
            error.to_string(),
            "Configuration watcher error: no tokio runtime"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error = ConfigError::from(io_error);
        assert!(matches!(error, ConfigError::IoError(_)));
    }

    #[test]
    fn test_from_parse_int_error() {
        let parse_err = "not_a_number".parse::<i32>().unwrap_err();
        let error = ConfigError::from_parse_int_error("test.key".to_string(), parse_err);
        assert!(matches!(error, ConfigError::TypeConversionError { .. }));
        assert!(error.to_string().contains("integer"));
    }

    #[test]
    fn test_from_parse_float_error() {
        let parse_err = "not_a_float".parse::<f64>().unwrap_err();
        let error = ConfigError::from_parse_float_error("test.key".to_string(), parse_err);
        assert!(error.to_string().contains("float"));
    }

    #[test]
    fn test_from_parse_bool_error() {
        let parse_err = "not_a_bool".parse::<bool>().unwrap_err();
        let error = ConfigError::from_parse_bool_error("test.key".to_string(), parse_err);
        assert!(error.to_string().contains("boolean"));
    }
}
