//! Unified error handling for the wfdebug library
//!
//! Remote collaborators report [`ClientError`]. The engine wraps those in
//! [`DiagError`] together with the name of the operation that failed, so a
//! caller always sees which remote call broke and why.

use crate::config::ConfigError;
use std::fmt;
use std::io;
use thiserror::Error;

/// Errors reported by a [`crate::client::WorkflowClient`] or
/// [`crate::client::ClientProvider`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// The requested workflow, run or namespace does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller is not allowed to read from the namespace
    #[error("permission denied for namespace '{namespace}'")]
    PermissionDenied {
        /// Namespace that rejected the call
        namespace: String,
    },

    /// The remote service could not be reached or failed internally
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The request was rejected as malformed
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// The main error type for the wfdebug library
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiagError {
    /// A remote call failed
    #[error("failed to {operation}: {source}")]
    Remote {
        /// Short description of the call, e.g. "describe workflow"
        operation: String,
        /// Error reported by the client
        #[source]
        source: ClientError,
    },

    /// The caller-supplied deadline expired during a remote call
    #[error("deadline exceeded while trying to {operation}")]
    DeadlineExceeded {
        /// Operation in flight when the deadline expired
        operation: String,
    },

    /// The caller cancelled the operation
    #[error("cancelled while trying to {operation}")]
    Cancelled {
        /// Operation in flight when cancellation was observed
        operation: String,
    },

    /// Invalid input supplied by the caller
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A tool call named a tool that is not registered
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Configuration could not be loaded or validated
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error with context
    #[error("{message}")]
    Context {
        /// Context message
        message: String,
        /// Underlying error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl DiagError {
    /// Wrap a client error with the operation that produced it
    pub fn remote(operation: impl Into<String>, source: ClientError) -> Self {
        Self::Remote {
            operation: operation.into(),
            source,
        }
    }
}

/// Result type alias for wfdebug operations
pub type Result<T> = std::result::Result<T, DiagError>;

/// Extension trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context<S: Into<String>>(self, msg: S) -> Result<T>;

    /// Add context with a closure that's only called on error
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context<S: Into<String>>(self, msg: S) -> Result<T> {
        self.map_err(|e| DiagError::Context {
            message: msg.into(),
            source: Box::new(e),
        })
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| DiagError::Context {
            message: f().into(),
            source: Box::new(e),
        })
    }
}

/// Error chain formatter for detailed error reporting
pub struct ErrorChain<'a>(&'a dyn std::error::Error);

impl<'a> fmt::Display for ErrorChain<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Error: {}", self.0)?;

        let mut current = self.0.source();
        let mut level = 1;

        while let Some(err) = current {
            writeln!(f, "{:indent$}Caused by: {}", "", err, indent = level * 2)?;
            current = err.source();
            level += 1;
        }

        Ok(())
    }
}

/// Extension trait for error types to format the full error chain
pub trait ErrorChainExt {
    /// Format the full error chain
    fn error_chain(&self) -> ErrorChain<'_>;
}

impl<E: std::error::Error> ErrorChainExt for E {
    fn error_chain(&self) -> ErrorChain<'_> {
        ErrorChain(self)
    }
}
