//! Diagnostic commands backed by exported history fixtures
//!
//! Each command resolves configuration, builds a fixture-backed client
//! provider and dispatches to the matching tool of the library's
//! [`ToolRegistry`], so the CLI and agent tool calls share one code path.

use crate::cli::{Cli, Commands, WorkflowTarget};
use crate::error::{CliError, CliResult};
use crate::exit_codes::EXIT_ERROR;
use crate::signal_handler::cancel_on_signal;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use wfdebug::common::duration::format_duration;
use wfdebug::{
    CallContext, DiagConfig, InMemoryClientConfig, InMemoryClientProvider, ToolContext,
    ToolRegistry,
};

/// A resolved tool invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub tool: &'static str,
    pub arguments: Map<String, Value>,
    pub follow_namespaces: Vec<String>,
}

/// Load configuration, applying the `--config` and `--history-dir` flags
pub fn load_config(cli: &Cli) -> CliResult<DiagConfig> {
    let mut config = match &cli.config {
        Some(path) => DiagConfig::load_with_file(Some(path.as_path())),
        None => DiagConfig::load(),
    }
    .map_err(CliError::validation)?;

    if let Some(dir) = &cli.history_dir {
        config.history_dir = Some(dir.clone());
    }
    Ok(config)
}

fn target_arguments(target: &WorkflowTarget, config: &DiagConfig) -> Map<String, Value> {
    let mut arguments = Map::new();
    arguments.insert(
        "namespace".to_string(),
        json!(target.namespace.as_deref().unwrap_or(&config.namespace)),
    );
    arguments.insert("workflow_id".to_string(), json!(target.workflow_id));
    if let Some(run_id) = &target.run_id {
        arguments.insert("run_id".to_string(), json!(run_id));
    }
    arguments
}

fn follow_or_configured(flag: &[String], config: &DiagConfig) -> Vec<String> {
    if flag.is_empty() {
        config.follow_namespaces.clone()
    } else {
        flag.to_vec()
    }
}

/// Translate a diagnostic command into a tool call
///
/// Returns `None` for commands that do not read histories.
pub fn tool_call(command: &Commands, config: &DiagConfig) -> Option<ToolCall> {
    match command {
        Commands::Trace {
            target,
            max_depth,
            follow_namespaces,
            format,
        } => {
            let mut arguments = target_arguments(target, config);
            arguments.insert(
                "max_depth".to_string(),
                json!(max_depth.unwrap_or(config.max_depth)),
            );
            arguments.insert("format".to_string(), json!(format.as_str()));
            Some(ToolCall {
                tool: "trace_workflow_chain",
                arguments,
                follow_namespaces: follow_or_configured(follow_namespaces, config),
            })
        }
        Commands::Failures {
            namespace,
            since,
            status,
            no_follow,
            max_depth,
            error_contains,
            leaf_only,
            compact_errors,
            group_by,
            limit,
            follow_namespaces,
            format,
        } => {
            let mut arguments = Map::new();
            arguments.insert(
                "namespace".to_string(),
                json!(namespace.as_deref().unwrap_or(&config.namespace)),
            );
            arguments.insert(
                "since".to_string(),
                json!(since
                    .clone()
                    .unwrap_or_else(|| format_duration(config.failures_since))),
            );
            arguments.insert("status".to_string(), json!(status));
            arguments.insert("follow_children".to_string(), json!(!no_follow));
            arguments.insert(
                "max_depth".to_string(),
                json!(max_depth.unwrap_or(config.max_depth)),
            );
            if let Some(text) = error_contains {
                arguments.insert("error_contains".to_string(), json!(text));
            }
            arguments.insert("leaf_only".to_string(), json!(leaf_only));
            arguments.insert("compact_errors".to_string(), json!(compact_errors));
            arguments.insert("group_by".to_string(), json!(group_by.as_str()));
            arguments.insert(
                "limit".to_string(),
                json!(limit.unwrap_or(config.failures_limit)),
            );
            arguments.insert("format".to_string(), json!(format.as_str()));
            Some(ToolCall {
                tool: "find_recent_failures",
                arguments,
                follow_namespaces: follow_or_configured(follow_namespaces, config),
            })
        }
        Commands::Timeline {
            target,
            compact,
            include_payloads,
            event_types,
            exclude_event_types,
            format,
        } => {
            let mut arguments = target_arguments(target, config);
            arguments.insert("compact".to_string(), json!(compact));
            arguments.insert("include_payloads".to_string(), json!(include_payloads));
            arguments.insert("event_types".to_string(), json!(event_types));
            arguments.insert(
                "exclude_event_types".to_string(),
                json!(exclude_event_types),
            );
            arguments.insert("format".to_string(), json!(format.as_str()));
            Some(ToolCall {
                tool: "get_workflow_timeline",
                arguments,
                follow_namespaces: Vec::new(),
            })
        }
        Commands::State {
            target,
            include_details,
            format,
        } => {
            let mut arguments = target_arguments(target, config);
            arguments.insert("include_details".to_string(), json!(include_details));
            arguments.insert("format".to_string(), json!(format.as_str()));
            Some(ToolCall {
                tool: "get_workflow_state",
                arguments,
                follow_namespaces: Vec::new(),
            })
        }
        Commands::ToolSpec { .. } | Commands::CompactError { .. } => None,
    }
}

fn provider_for(config: &DiagConfig) -> CliResult<InMemoryClientProvider> {
    let dir = config.history_dir.as_deref().ok_or_else(|| {
        CliError::new(
            "no history directory: pass --history-dir, set history_dir in wfdebug.yaml or WFDEBUG_HISTORY_DIR",
            EXIT_ERROR,
        )
    })?;

    let client_config = InMemoryClientConfig {
        history_page_size: config.history_page_size,
        ..Default::default()
    };
    InMemoryClientProvider::load_dir(dir, client_config).map_err(CliError::validation)
}

/// Run a diagnostic command and return its rendered output
pub async fn run_diagnostic(cli: &Cli, command: &Commands) -> CliResult<String> {
    let config = load_config(cli)?;
    let call = tool_call(command, &config)
        .ok_or_else(|| CliError::new("command does not read histories", EXIT_ERROR))?;
    let provider = provider_for(&config)?;

    let ctx = CallContext::with_timeout(config.request_timeout);
    if let Err(e) = cancel_on_signal(ctx.clone()) {
        tracing::warn!("Signal handling unavailable: {e:#}");
    }

    tracing::debug!("Running {} with {:?}", call.tool, call.arguments);
    let context =
        ToolContext::new(Arc::new(provider), ctx).with_follow_namespaces(call.follow_namespaces);
    let output = ToolRegistry::with_default_tools()
        .execute(call.tool, call.arguments, &context)
        .await?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{GroupBy, OutputFormat};
    use std::time::Duration;

    fn config() -> DiagConfig {
        DiagConfig {
            namespace: "orders".to_string(),
            follow_namespaces: vec!["risk".to_string()],
            max_depth: 4,
            failures_since: Duration::from_secs(7200),
            failures_limit: 20,
            ..Default::default()
        }
    }

    fn target(workflow_id: &str) -> WorkflowTarget {
        WorkflowTarget {
            workflow_id: workflow_id.to_string(),
            run_id: None,
            namespace: None,
        }
    }

    #[test]
    fn test_trace_uses_configured_defaults() {
        let command = Commands::Trace {
            target: target("order-1"),
            max_depth: None,
            follow_namespaces: Vec::new(),
            format: OutputFormat::Json,
        };

        let call = tool_call(&command, &config()).unwrap();
        assert_eq!(call.tool, "trace_workflow_chain");
        assert_eq!(call.arguments["namespace"], "orders");
        assert_eq!(call.arguments["max_depth"], 4);
        assert!(!call.arguments.contains_key("run_id"));
        assert_eq!(call.follow_namespaces, vec!["risk"]);
    }

    #[test]
    fn test_flags_override_configuration() {
        let command = Commands::Trace {
            target: WorkflowTarget {
                workflow_id: "order-1".to_string(),
                run_id: Some("run-7".to_string()),
                namespace: Some("billing".to_string()),
            },
            max_depth: Some(1),
            follow_namespaces: vec!["ledger".to_string()],
            format: OutputFormat::Mermaid,
        };

        let call = tool_call(&command, &config()).unwrap();
        assert_eq!(call.arguments["namespace"], "billing");
        assert_eq!(call.arguments["run_id"], "run-7");
        assert_eq!(call.arguments["max_depth"], 1);
        assert_eq!(call.arguments["format"], "mermaid");
        assert_eq!(call.follow_namespaces, vec!["ledger"]);
    }

    #[test]
    fn test_failures_arguments() {
        let command = Commands::Failures {
            namespace: None,
            since: None,
            status: "Failed".to_string(),
            no_follow: true,
            max_depth: None,
            error_contains: Some("timeout".to_string()),
            leaf_only: true,
            compact_errors: false,
            group_by: GroupBy::Error,
            limit: None,
            follow_namespaces: Vec::new(),
            format: OutputFormat::Json,
        };

        let call = tool_call(&command, &config()).unwrap();
        assert_eq!(call.tool, "find_recent_failures");
        assert_eq!(call.arguments["since"], "2h");
        assert_eq!(call.arguments["follow_children"], false);
        assert_eq!(call.arguments["max_depth"], 4);
        assert_eq!(call.arguments["error_contains"], "timeout");
        assert_eq!(call.arguments["group_by"], "error");
        assert_eq!(call.arguments["limit"], 20);
    }

    #[test]
    fn test_non_history_commands_have_no_tool_call() {
        let command = Commands::CompactError {
            message: Some("boom".to_string()),
            with_context: false,
        };
        assert!(tool_call(&command, &config()).is_none());
    }

    #[test]
    fn test_missing_history_dir_is_a_usage_error() {
        let error = provider_for(&config()).unwrap_err();
        assert_eq!(error.exit_code, EXIT_ERROR);
        assert!(error.to_string().contains("--history-dir"));
    }
}
