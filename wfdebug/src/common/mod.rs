//! Common utilities module
//!
//! Small helpers shared by configuration, the CLI and the tool layer.

/// Duration string parsing (`15m`, `1h`, `7d`)
pub mod duration;

/// Environment variable loading utilities
pub mod env_loader;

pub use duration::{format_duration, parse_duration};
pub use env_loader::{load_env_list, load_env_optional, load_env_parsed, load_env_string, EnvLoader};
