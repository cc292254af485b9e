//! Error handling for the wfdebug CLI
//!
//! A [`CliError`] wraps the underlying error together with the exit code the
//! process should terminate with.

use crate::exit_codes::{EXIT_ERROR, EXIT_WARNING};
use std::error::Error;
use std::fmt;
use wfdebug::{DiagError, ErrorChainExt};

/// CLI-specific result type that preserves error information
pub type CliResult<T> = Result<T, CliError>;

/// An error and the exit code it maps to
///
/// Displays as the wrapped error and exposes that error's causes, so the
/// printed chain does not repeat the top-level message.
#[derive(Debug)]
pub struct CliError {
    pub exit_code: i32,
    message: String,
    error: Option<Box<dyn Error + Send + Sync>>,
}

impl CliError {
    /// Create a CLI error from a plain message
    pub fn new(message: impl Into<String>, exit_code: i32) -> Self {
        Self {
            exit_code,
            message: message.into(),
            error: None,
        }
    }

    fn wrap<E: Error + Send + Sync + 'static>(error: E, exit_code: i32) -> Self {
        Self {
            exit_code,
            message: error.to_string(),
            error: Some(Box::new(error)),
        }
    }

    /// The diagnostic could not be completed (exit code 1)
    pub fn general<E: Error + Send + Sync + 'static>(error: E) -> Self {
        Self::wrap(error, EXIT_WARNING)
    }

    /// Invalid arguments or configuration (exit code 2)
    pub fn validation<E: Error + Send + Sync + 'static>(error: E) -> Self {
        Self::wrap(error, EXIT_ERROR)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for CliError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.error.as_ref().and_then(|e| e.source())
    }
}

impl From<DiagError> for CliError {
    fn from(error: DiagError) -> Self {
        match error {
            DiagError::InvalidArgument(_) | DiagError::UnknownTool(_) | DiagError::Config(_) => {
                Self::validation(error)
            }
            other => Self::general(other),
        }
    }
}

/// Convert a CliResult to an exit code, printing the error chain on failure
pub fn handle_cli_result<T>(result: CliResult<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => {
            eprint!("{}", e.error_chain());
            e.exit_code
        }
    }
}
