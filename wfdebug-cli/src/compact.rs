use crate::error::{CliError, CliResult};
use crate::exit_codes::EXIT_ERROR;
use std::io::BufRead;
use wfdebug::{compact_error, compact_error_with_context};

fn compact_one(message: &str, with_context: bool) -> String {
    if with_context {
        compact_error_with_context(message)
    } else {
        compact_error(message)
    }
}

/// Compact `message`, or every non-empty line of `input` when it is absent
pub fn run_compact_error<R: BufRead>(
    message: Option<&str>,
    with_context: bool,
    input: R,
) -> CliResult<String> {
    if let Some(message) = message {
        return Ok(compact_one(message, with_context));
    }

    let mut compacted = Vec::new();
    for line in input.lines() {
        let line = line.map_err(CliError::general)?;
        if line.trim().is_empty() {
            continue;
        }
        compacted.push(compact_one(&line, with_context));
    }

    if compacted.is_empty() {
        return Err(CliError::new(
            "no error message given: pass MESSAGE or pipe messages on stdin",
            EXIT_ERROR,
        ));
    }
    Ok(compacted.join("\n"))
}
