//! Request types for the diagnostic tools
//!
//! Each request doubles as the tool's parameter schema through
//! [`schemars::JsonSchema`]; doc comments become parameter descriptions.

use crate::failures::GroupBy;
use serde::{Deserialize, Serialize};

/// Output format of a tool call
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Structured JSON
    #[default]
    Json,
    /// Mermaid diagram text
    Mermaid,
}

fn default_since() -> String {
    "1h".to_string()
}

fn default_status() -> String {
    "Failed,TimedOut".to_string()
}

fn default_true() -> bool {
    true
}

fn default_limit() -> usize {
    50
}

/// Request to find recent failures in a namespace
///
/// # Examples
///
/// ```ignore
/// FindRecentFailuresRequest {
///     namespace: "payments".to_string(),
///     since: "24h".to_string(),
///     group_by: GroupBy::Error,
///     ..Default::default()
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct FindRecentFailuresRequest {
    /// The namespace to search for failures.
    pub namespace: String,
    /// Time window to search, e.g. '1h', '24h', '7d'.
    #[serde(default = "default_since")]
    pub since: String,
    /// Comma-separated statuses to match: Failed, TimedOut, Canceled, Terminated.
    #[serde(default = "default_status")]
    pub status: String,
    /// Traverse failing child workflows to find leaf failures and root causes.
    #[serde(default = "default_true")]
    pub follow_children: bool,
    /// Maximum chain length when following children; 0 means unlimited.
    #[serde(default)]
    pub max_depth: usize,
    /// Keep only failures whose root cause contains this text (case-insensitive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_contains: Option<String>,
    /// Keep only leaf failures, dropping parents that failed because a child failed.
    #[serde(default)]
    pub leaf_only: bool,
    /// Strip wrapper context, identifiers and retry details from error messages.
    #[serde(default)]
    pub compact_errors: bool,
    /// Group failures instead of listing them individually.
    #[serde(default)]
    pub group_by: GroupBy,
    /// 'mermaid' renders a pie chart when grouped, a flowchart of chains otherwise.
    #[serde(default)]
    pub format: OutputFormat,
    /// Maximum number of failures to return.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for FindRecentFailuresRequest {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            since: default_since(),
            status: default_status(),
            follow_children: true,
            max_depth: 0,
            error_contains: None,
            leaf_only: false,
            compact_errors: false,
            group_by: GroupBy::None,
            format: OutputFormat::Json,
            limit: default_limit(),
        }
    }
}

/// Request to trace a workflow through its failing children
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct TraceWorkflowChainRequest {
    /// The namespace containing the workflow.
    pub namespace: String,
    /// The workflow ID to trace.
    pub workflow_id: String,
    /// Run ID; the latest run when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Maximum chain length when following child workflows; 0 means unlimited.
    #[serde(default)]
    pub max_depth: usize,
    /// 'mermaid' renders a flowchart of the chain.
    #[serde(default)]
    pub format: OutputFormat,
}

/// Request for a workflow's event timeline
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct GetWorkflowTimelineRequest {
    /// The namespace containing the workflow.
    pub namespace: String,
    /// The workflow ID to get the timeline for.
    pub workflow_id: String,
    /// Run ID; the latest run when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Key milestones only, with retry counts on repeated activity failures.
    #[serde(default)]
    pub compact: bool,
    /// Include inputs and results.
    #[serde(default)]
    pub include_payloads: bool,
    /// Keep only these event types or categories.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_types: Vec<String>,
    /// Drop these event types or categories.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_event_types: Vec<String>,
    /// 'mermaid' renders a sequence diagram.
    #[serde(default)]
    pub format: OutputFormat,
}

/// Request for a workflow's current state
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct GetWorkflowStateRequest {
    /// The namespace containing the workflow.
    pub namespace: String,
    /// The workflow ID to get state for.
    pub workflow_id: String,
    /// Run ID; the latest run when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Include memo and search attributes.
    #[serde(default)]
    pub include_details: bool,
    /// 'mermaid' renders pending work as a flowchart.
    #[serde(default)]
    pub format: OutputFormat,
}
