use crate::cli::SpecFormat;
use crate::error::{CliError, CliResult};
use wfdebug::ToolRegistry;

/// Render the definitions of every registered tool
pub fn run_tool_spec(format: SpecFormat) -> CliResult<String> {
    ToolRegistry::with_default_tools()
        .specs_json(format.into())
        .map_err(CliError::from)
}
