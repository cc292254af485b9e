//! Exit code constants for CLI commands
//!
//! These constants define the standard exit codes used throughout the application:
//! - 0: Success
//! - 1: The diagnostic could not be completed
//! - 2: Invalid arguments or configuration

/// Successful execution
pub const EXIT_SUCCESS: i32 = 0;

/// Remote lookup failed, deadline passed or the run was cancelled
pub const EXIT_WARNING: i32 = 1;

/// Invalid arguments or configuration
pub const EXIT_ERROR: i32 = 2;
