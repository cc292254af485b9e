//! wfdebug CLI Library
//!
//! Command-line front end for the wfdebug diagnostics engine: argument
//! definitions, command handlers, error handling and exit codes.

// Re-export modules for use in tests
/// Command-line interface definitions and argument parsing
pub mod cli;
/// The compact-error command
pub mod compact;
/// Commands that read workflow histories
pub mod diagnose;
/// CLI error type carrying an exit code
pub mod error;
/// Exit codes used by the CLI application
pub mod exit_codes;
/// Cancellation on Ctrl+C and SIGTERM
pub mod signal_handler;
/// The tool-spec command
pub mod tool_spec;
