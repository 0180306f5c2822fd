//! Error types for db-ask.
//!
//! Every stage of the ask pipeline fails with an [`AskError`]. The variant
//! determines the `error_kind` reported to API callers and the HTTP status.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::safety::RejectReason;

/// Main error type for db-ask operations.
#[derive(Error, Debug)]
pub enum AskError {
    /// The model service could not be reached.
    #[error("Model service unavailable: {0}")]
    ModelUnavailable(String),

    /// The model service did not answer within the request timeout.
    #[error("Model request timed out: {0}")]
    ModelTimeout(String),

    /// The model service answered with a non-success status or a malformed body.
    #[error("Model error: {0}")]
    ModelError(String),

    /// No SQL statement could be isolated from the model output.
    #[error("Could not extract SQL: {0}")]
    ExtractionFailed(String),

    /// The safety gate refused the statement.
    #[error("Statement rejected: {0}")]
    ValidationRejected(RejectReason),

    /// The statement exceeded its execution timeout.
    #[error("Query timed out: {0}")]
    ExecutionTimeout(String),

    /// The database rejected the statement (unknown column, syntax, ...).
    #[error("Query error: {0}")]
    ExecutionError(String),

    /// The database could not be reached or the connection broke.
    #[error("Connection error: {0}")]
    Connection(String),

    /// No database connection became free in time.
    #[error("Service busy: {0}")]
    ServiceBusy(String),

    /// The inbound request was malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The request was cancelled before it finished (e.g. server shutdown).
    #[error("Request cancelled")]
    Cancelled,

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Machine-readable error classification reported as `error_kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    ModelUnavailable,
    ModelTimeout,
    ModelError,
    ExtractionFailed,
    ValidationRejected,
    ExecutionTimeout,
    ExecutionError,
    ConnectionError,
    ServiceBusy,
    InvalidRequest,
    Cancelled,
    ConfigError,
    InternalError,
}

impl ErrorKind {
    /// Returns the kind as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelUnavailable => "ModelUnavailable",
            Self::ModelTimeout => "ModelTimeout",
            Self::ModelError => "ModelError",
            Self::ExtractionFailed => "ExtractionFailed",
            Self::ValidationRejected => "ValidationRejected",
            Self::ExecutionTimeout => "ExecutionTimeout",
            Self::ExecutionError => "ExecutionError",
            Self::ConnectionError => "ConnectionError",
            Self::ServiceBusy => "ServiceBusy",
            Self::InvalidRequest => "InvalidRequest",
            Self::Cancelled => "Cancelled",
            Self::ConfigError => "ConfigError",
            Self::InternalError => "InternalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AskError {
    /// Creates a model-unavailable error with the given message.
    pub fn model_unavailable(msg: impl Into<String>) -> Self {
        Self::ModelUnavailable(msg.into())
    }

    /// Creates a model-timeout error with the given message.
    pub fn model_timeout(msg: impl Into<String>) -> Self {
        Self::ModelTimeout(msg.into())
    }

    /// Creates a model error with the given message.
    pub fn model(msg: impl Into<String>) -> Self {
        Self::ModelError(msg.into())
    }

    /// Creates an extraction error with the given message.
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::ExtractionFailed(msg.into())
    }

    /// Creates an execution-timeout error with the given message.
    pub fn execution_timeout(msg: impl Into<String>) -> Self {
        Self::ExecutionTimeout(msg.into())
    }

    /// Creates an execution error with the given message.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::ExecutionError(msg.into())
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a service-busy error with the given message.
    pub fn busy(msg: impl Into<String>) -> Self {
        Self::ServiceBusy(msg.into())
    }

    /// Creates an invalid-request error with the given message.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the machine-readable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
            Self::ModelTimeout(_) => ErrorKind::ModelTimeout,
            Self::ModelError(_) => ErrorKind::ModelError,
            Self::ExtractionFailed(_) => ErrorKind::ExtractionFailed,
            Self::ValidationRejected(_) => ErrorKind::ValidationRejected,
            Self::ExecutionTimeout(_) => ErrorKind::ExecutionTimeout,
            Self::ExecutionError(_) => ErrorKind::ExecutionError,
            Self::Connection(_) => ErrorKind::ConnectionError,
            Self::ServiceBusy(_) => ErrorKind::ServiceBusy,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Config(_) => ErrorKind::ConfigError,
            Self::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Returns the error category as a string for log output.
    pub fn category(&self) -> &'static str {
        match self {
            Self::ModelUnavailable(_) | Self::ModelTimeout(_) | Self::ModelError(_) => {
                "Model Error"
            }
            Self::ExtractionFailed(_) | Self::ValidationRejected(_) => "Gate Error",
            Self::ExecutionTimeout(_) | Self::ExecutionError(_) => "Query Error",
            Self::Connection(_) | Self::ServiceBusy(_) => "Connection Error",
            Self::InvalidRequest(_) | Self::Cancelled => "Request Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns true for failures worth one more attempt at the same stage.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ModelTimeout(_) | Self::Connection(_))
    }

    /// Returns the gate's reason code when this is a validation rejection.
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::ValidationRejected(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Result type alias using AskError.
pub type Result<T> = std::result::Result<T, AskError>;
