use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format of a diagnostic command
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Json,
    Mermaid,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Mermaid => "mermaid",
        }
    }
}

/// Aggregation mode of the failures command
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GroupBy {
    #[default]
    None,
    Type,
    Namespace,
    Status,
    Error,
}

impl GroupBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupBy::None => "none",
            GroupBy::Type => "type",
            GroupBy::Namespace => "namespace",
            GroupBy::Status => "status",
            GroupBy::Error => "error",
        }
    }
}

/// Shape of exported tool definitions
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SpecFormat {
    #[default]
    Generic,
    Openai,
    Langchain,
    Claude,
}

impl From<SpecFormat> for wfdebug::ToolSpecFormat {
    fn from(format: SpecFormat) -> Self {
        match format {
            SpecFormat::Generic => wfdebug::ToolSpecFormat::Generic,
            SpecFormat::Openai => wfdebug::ToolSpecFormat::OpenAi,
            SpecFormat::Langchain => wfdebug::ToolSpecFormat::LangChain,
            SpecFormat::Claude => wfdebug::ToolSpecFormat::Claude,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "wfdebug")]
#[command(version)]
#[command(about = "Failure-chain tracing and history diagnostics for workflow executions")]
#[command(long_about = "
wfdebug reconstructs failure chains, event timelines and pending state from
workflow execution histories. Histories are read from a directory of exported
fixtures laid out as <history-dir>/<namespace>/<workflow_id>.json.

Example usage:
  wfdebug trace order-1234 --history-dir ./histories      # Find the root cause
  wfdebug failures -n payments --since 24h --group-by error
  wfdebug timeline order-1234 --compact --format mermaid
  wfdebug tool-spec --format openai                       # Export agent tools

Exit codes:
  0 - Success
  1 - The diagnostic could not be completed (missing workflow, deadline, ...)
  2 - Invalid arguments or configuration
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (default: first wfdebug.yaml found)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory of exported histories (overrides history_dir / WFDEBUG_HISTORY_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    pub history_dir: Option<PathBuf>,
}

/// Options shared by commands that address a single workflow
#[derive(Args, Debug, Clone)]
pub struct WorkflowTarget {
    /// Workflow ID
    pub workflow_id: String,

    /// Run ID (default: latest run)
    #[arg(short, long)]
    pub run_id: Option<String>,

    /// Namespace (default: configured namespace)
    #[arg(short, long)]
    pub namespace: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Trace a workflow through failing children to the root cause
    #[command(long_about = "
Follows a workflow through failing child workflows and Nexus operations to
the deepest failure, and reports the chain with a single root cause.

Examples:
  wfdebug trace order-1234
  wfdebug trace order-1234 --follow-namespaces risk,billing
  wfdebug trace order-1234 --max-depth 3 --format mermaid
")]
    Trace {
        #[command(flatten)]
        target: WorkflowTarget,

        /// Maximum chain length, 0 for unlimited (default: configured max_depth)
        #[arg(long)]
        max_depth: Option<usize>,

        /// Extra namespaces the trace may enter, comma-separated
        #[arg(long, value_delimiter = ',')]
        follow_namespaces: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },
    /// Find recent failures in a namespace
    #[command(long_about = "
Lists workflows that closed as failed within a time window, traces each one
to its leaf failure, and optionally filters or groups the results.

Examples:
  wfdebug failures -n payments --since 24h
  wfdebug failures --error-contains timeout --leaf-only
  wfdebug failures --group-by error --format mermaid
")]
    Failures {
        /// Namespace (default: configured namespace)
        #[arg(short, long)]
        namespace: Option<String>,

        /// Time window such as 30m, 1h, 7d (default: configured failures_since)
        #[arg(long)]
        since: Option<String>,

        /// Comma-separated statuses: Failed, TimedOut, Canceled, Terminated
        #[arg(long, default_value = "Failed,TimedOut")]
        status: String,

        /// Do not trace into failing children
        #[arg(long)]
        no_follow: bool,

        /// Maximum chain length per failure, 0 for unlimited (default: configured max_depth)
        #[arg(long)]
        max_depth: Option<usize>,

        /// Keep failures whose root cause contains this text
        #[arg(long)]
        error_contains: Option<String>,

        /// Keep only leaf failures
        #[arg(long)]
        leaf_only: bool,

        /// Compact root-cause messages
        #[arg(long)]
        compact_errors: bool,

        /// Group failures instead of listing them
        #[arg(long, value_enum, default_value_t)]
        group_by: GroupBy,

        /// Maximum number of failures (default: configured failures_limit)
        #[arg(long)]
        limit: Option<usize>,

        /// Extra namespaces tracing may enter, comma-separated
        #[arg(long, value_delimiter = ',')]
        follow_namespaces: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },
    /// Show the event timeline of a workflow
    #[command(long_about = "
Prints the events of a workflow execution as a flat timeline with durations
for activities, timers, child workflows and Nexus operations.

Event filters accept event types (ActivityTaskFailed) or categories
(workflow, activity, timer, child_workflow, signal, nexus, other).

Examples:
  wfdebug timeline order-1234 --compact
  wfdebug timeline order-1234 --event-types activity,timer
  wfdebug timeline order-1234 --format mermaid
")]
    Timeline {
        #[command(flatten)]
        target: WorkflowTarget,

        /// Key milestones only, with retry counts
        #[arg(long)]
        compact: bool,

        /// Include inputs and results
        #[arg(long)]
        include_payloads: bool,

        /// Keep only these event types or categories, comma-separated
        #[arg(long, value_delimiter = ',')]
        event_types: Vec<String>,

        /// Drop these event types or categories, comma-separated
        #[arg(long, value_delimiter = ',')]
        exclude_event_types: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },
    /// Show pending activities, children and Nexus operations
    State {
        #[command(flatten)]
        target: WorkflowTarget,

        /// Include memo and search attributes
        #[arg(long)]
        include_details: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },
    /// Print the agent tool definitions
    ToolSpec {
        /// Definition shape
        #[arg(short, long, value_enum, default_value_t)]
        format: SpecFormat,
    },
    /// Compact error messages given as an argument or on stdin
    #[command(long_about = "
Strips wrapper context, identifiers and retry details from error messages.
Without a MESSAGE argument every non-empty line of stdin is compacted.

Examples:
  wfdebug compact-error 'activity error (type: Charge, scheduledEventID: 5): card declined'
  cat errors.txt | wfdebug compact-error --with-context
")]
    CompactError {
        /// Message to compact
        message: Option<String>,

        /// Add timeout hints
        #[arg(long)]
        with_context: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn try_parse_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::try_parse_from(args)
    }
}
