//! Core error types for Tessera.

use std::sync::Arc;

use thiserror::Error;

/// Result type alias using `TesseraError`.
pub type TesseraResult<T> = std::result::Result<T, TesseraError>;

/// Core error type for Tessera operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TesseraError {
    /// Type mismatch or invalid type operation.
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Invalid value provided.
    #[error("ValueError: {0}")]
    ValueError(String),

    /// Schema-related error (duplicate column, incompatible schemas on concat).
    #[error("SchemaError: {0}")]
    SchemaError(String),

    /// Caller broke the contract of an operation (mismatched grids,
    /// unknown function reference, ragged partition matrix).
    #[error("InvalidParameter: {0}")]
    InvalidParameter(String),

    /// An operation tried to write through a sealed, read-only block.
    ///
    /// The dispatcher retries the operation once against a private copy.
    #[error("ReadOnly: {0}")]
    ReadOnly(String),

    /// A deferred operation failed inside the execution substrate.
    ///
    /// Wraps the original failure; surfaced only when the partition that
    /// carries it is resolved.
    #[error("RemoteExecutionError: {0}")]
    RemoteExecution(Arc<TesseraError>),

    /// Execution error raised by a block operation.
    #[error("ExecutionError: {0}")]
    ExecutionError(String),

    /// Internal error (bug in Tessera).
    #[error("InternalError: {0}")]
    InternalError(String),

    /// IO error.
    #[error("IoError: {0}")]
    IoError(#[from] std::io::Error),

    /// Arrow error.
    #[error("ArrowError: {0}")]
    ArrowError(#[from] arrow_schema::ArrowError),

    /// JSON serialization error.
    #[error("SerdeJsonError: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}

impl TesseraError {
    /// Create a new `TypeError`.
    pub fn type_error<S: Into<String>>(msg: S) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a new `ValueError`.
    pub fn value_error<S: Into<String>>(msg: S) -> Self {
        Self::ValueError(msg.into())
    }

    /// Create a new `SchemaError`.
    pub fn schema_error<S: Into<String>>(msg: S) -> Self {
        Self::SchemaError(msg.into())
    }

    /// Create a new `InvalidParameter` error.
    pub fn invalid_parameter<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Create a new `ReadOnly` error.
    pub fn read_only<S: Into<String>>(msg: S) -> Self {
        Self::ReadOnly(msg.into())
    }

    /// Create a new `ExecutionError`.
    pub fn execution<S: Into<String>>(msg: S) -> Self {
        Self::ExecutionError(msg.into())
    }

    /// Create a new `InternalError`.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::InternalError(msg.into())
    }

    /// Wrap a failure captured in the substrate for surfacing to the caller.
    ///
    /// A failure that is already wrapped is returned as-is so chains of
    /// dependent tasks never nest the wrapper.
    pub fn remote(err: Arc<TesseraError>) -> Self {
        match err.as_ref() {
            Self::RemoteExecution(inner) => Self::RemoteExecution(Arc::clone(inner)),
            _ => Self::RemoteExecution(err),
        }
    }

    /// Whether this is the transient read-only class that warrants a
    /// copy-and-retry.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::ReadOnly(_))
    }

    /// Whether this failure came out of the execution substrate.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteExecution(_))
    }

    /// The failure raised inside the substrate, if this is a remote failure.
    pub fn remote_cause(&self) -> Option<&TesseraError> {
        match self {
            Self::RemoteExecution(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}

/// Ensure a condition holds, returning an `ExecutionError` if not.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $msg:expr) => {
        if !$cond {
            return Err($crate::TesseraError::ExecutionError($msg.to_string()));
        }
    };
    ($cond:expr, $variant:ident: $($msg:tt)*) => {
        if !$cond {
            return Err($crate::TesseraError::$variant(format!($($msg)*)));
        }
    };
}

/// Return early with a `ValueError`.
#[macro_export]
macro_rules! value_err {
    ($($arg:tt)*) => {
        return Err($crate::TesseraError::ValueError(format!($($arg)*)))
    };
}

/// Return early with a `TypeError`.
#[macro_export]
macro_rules! type_err {
    ($($arg:tt)*) => {
        return Err($crate::TesseraError::TypeError(format!($($arg)*)))
    };
}
