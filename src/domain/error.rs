//! Error types for sync-configurator.
//!
//! [`SyncError`] is the per-type error record stored in the status table and
//! reported by controllers. [`AppError`] covers everything around the
//! orchestrator: configuration files, serialization and the service channel.

use std::fmt;
use std::panic::Location;

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use super::data_type::DataType;

/// Classification of a per-type failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Type-specific failure (association, model load, download).
    DataType,
    /// Blocked on decryption until a passphrase is supplied.
    Crypto,
    /// Fatal to the whole manager.
    Unrecoverable,
    /// Preconditions for starting the type are not met yet.
    Unready,
    /// Local storage disagreed with expectations.
    Persistence,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DataType => "datatype error",
            Self::Crypto => "cryptographer error",
            Self::Unrecoverable => "unrecoverable error",
            Self::Unready => "unready error",
            Self::Persistence => "persistence error",
        };
        f.write_str(name)
    }
}

/// A typed error attributed to one data type.
///
/// The construction site is captured through `#[track_caller]`, so the
/// record says where the failure was raised without any macro help.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{data_type} {kind} at {location}: {message}")]
pub struct SyncError {
    kind: ErrorKind,
    data_type: DataType,
    message: String,
    #[serde(serialize_with = "serialize_location")]
    location: &'static Location<'static>,
}

impl SyncError {
    /// Create an error of `kind` for `data_type`.
    #[track_caller]
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>, data_type: DataType) -> Self {
        Self {
            kind,
            data_type,
            message: message.into(),
            location: Location::caller(),
        }
    }

    #[track_caller]
    #[must_use]
    pub fn datatype(message: impl Into<String>, data_type: DataType) -> Self {
        Self::new(ErrorKind::DataType, message, data_type)
    }

    #[track_caller]
    #[must_use]
    pub fn crypto(message: impl Into<String>, data_type: DataType) -> Self {
        Self::new(ErrorKind::Crypto, message, data_type)
    }

    #[track_caller]
    #[must_use]
    pub fn unrecoverable(message: impl Into<String>, data_type: DataType) -> Self {
        Self::new(ErrorKind::Unrecoverable, message, data_type)
    }

    #[track_caller]
    #[must_use]
    pub fn unready(message: impl Into<String>, data_type: DataType) -> Self {
        Self::new(ErrorKind::Unready, message, data_type)
    }

    #[track_caller]
    #[must_use]
    pub fn persistence(message: impl Into<String>, data_type: DataType) -> Self {
        Self::new(ErrorKind::Persistence, message, data_type)
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub const fn data_type(&self) -> DataType {
        self.data_type
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Source location (`file:line:column`) where the error was raised.
    #[must_use]
    pub const fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// The same error charged to `data_type`.
    ///
    /// A type only ever fails itself, whatever type its model wrote into the
    /// error.
    #[must_use]
    pub fn attributed_to(self, data_type: DataType) -> Self {
        if self.data_type != data_type {
            tracing::warn!(
                reported = %self.data_type,
                actual = %data_type,
                "Error names another type, charging the reporting type"
            );
        }
        Self { data_type, ..self }
    }
}

fn serialize_location<S: Serializer>(
    location: &&'static Location<'static>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(location)
}

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration or environment error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO operation failed.
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// JSON serialization failed.
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// The manager task is gone or dropped a reply.
    #[error("Manager service unavailable: {message}")]
    ServiceUnavailable { message: String },
}

impl AppError {
    /// Create a JSON error.
    pub fn json(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create an IO error with context.
    pub fn io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(err),
        }
    }

    /// Create a service-unavailable error.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
        }
    }
}

/// Result type alias using `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
