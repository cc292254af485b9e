//! Result records produced by the diagnostics engine
//!
//! These are the stable contract consumed by renderers and agent tooling.
//! Serialization is sparse: empty, zero and absent values are omitted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

fn is_zero_i64(value: &i64) -> bool {
    *value == 0
}

fn is_zero_u32(value: &u32) -> bool {
    *value == 0
}

fn is_zero_usize(value: &usize) -> bool {
    *value == 0
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Identifies one workflow execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowRef {
    /// Namespace
    pub namespace: String,
    /// Workflow ID
    pub workflow_id: String,
    /// Run ID; absent means "latest run"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl WorkflowRef {
    /// Create a reference
    pub fn new(
        namespace: impl Into<String>,
        workflow_id: impl Into<String>,
        run_id: Option<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            workflow_id: workflow_id.into(),
            run_id: run_id.filter(|r| !r.is_empty()),
        }
    }
}

/// Lifecycle status of a workflow execution
///
/// Serializes to `Running`, `Completed`, `Failed`, `Canceled`, `Terminated`,
/// `ContinuedAsNew`, `TimedOut`, or `Unknown` for [`WorkflowStatus::Unspecified`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum WorkflowStatus {
    /// Status not known or not recognized
    #[default]
    Unspecified,
    /// Still running
    Running,
    /// Completed successfully
    Completed,
    /// Failed
    Failed,
    /// Cancelled
    Canceled,
    /// Terminated
    Terminated,
    /// Continued as a new run
    ContinuedAsNew,
    /// Timed out
    TimedOut,
}

impl WorkflowStatus {
    /// The seven named statuses, excluding the sentinel
    pub const NAMED: [WorkflowStatus; 7] = [
        WorkflowStatus::Running,
        WorkflowStatus::Completed,
        WorkflowStatus::Failed,
        WorkflowStatus::Canceled,
        WorkflowStatus::Terminated,
        WorkflowStatus::ContinuedAsNew,
        WorkflowStatus::TimedOut,
    ];

    /// Display name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "Unknown",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Canceled => "Canceled",
            Self::Terminated => "Terminated",
            Self::ContinuedAsNew => "ContinuedAsNew",
            Self::TimedOut => "TimedOut",
        }
    }

    /// Parse a display name; anything unrecognized is `Unspecified`
    pub fn parse(s: &str) -> Self {
        match s {
            "Running" => Self::Running,
            "Completed" => Self::Completed,
            "Failed" => Self::Failed,
            "Canceled" => Self::Canceled,
            "Terminated" => Self::Terminated,
            "ContinuedAsNew" => Self::ContinuedAsNew,
            "TimedOut" => Self::TimedOut,
            _ => Self::Unspecified,
        }
    }

    /// True for statuses the failure finder looks for by default
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::TimedOut)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl Serialize for WorkflowStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for WorkflowStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

/// One workflow in a traced chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowChainNode {
    /// Namespace
    pub namespace: String,
    /// Workflow ID
    pub workflow_id: String,
    /// Run ID
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub run_id: String,
    /// Workflow type name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workflow_type: String,
    /// Status derived from history
    pub status: WorkflowStatus,
    /// True only for the last node of the chain
    #[serde(default, rename = "leaf", skip_serializing_if = "is_false")]
    pub is_leaf: bool,
    /// Distance from the root (root = 0)
    pub depth: usize,
    /// Start time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// Close time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_time: Option<DateTime<Utc>>,
    /// Run duration in milliseconds, when closed
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub duration_ms: i64,
    /// Workflow failure message
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// Kind of root cause selected for a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RootCauseType {
    /// An activity failed or timed out
    ActivityFailed,
    /// The workflow itself failed
    WorkflowFailed,
    /// A Nexus operation failed and could not be followed further
    NexusOperationFailed,
    /// The workflow timed out
    Timeout,
}

impl RootCauseType {
    /// Display name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ActivityFailed => "ActivityFailed",
            Self::WorkflowFailed => "WorkflowFailed",
            Self::NexusOperationFailed => "NexusOperationFailed",
            Self::Timeout => "Timeout",
        }
    }
}

impl fmt::Display for RootCauseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single failure selected as the cause of a trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCause {
    /// Kind of failure
    #[serde(rename = "type")]
    pub cause_type: RootCauseType,
    /// Failed activity type, for activity failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
    /// Failure message
    pub error: String,
    /// When the failure happened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Workflow the failure was found in
    pub workflow: WorkflowRef,
}

impl RootCause {
    /// One-line summary, e.g. `ActivityFailed: ChargeCardActivity - card declined`
    pub fn summary(&self) -> String {
        match self.activity {
            Some(ref activity) if !activity.is_empty() => {
                format!("{}: {} - {}", self.cause_type, activity, self.error)
            }
            _ => format!("{}: {}", self.cause_type, self.error),
        }
    }
}

/// Result of tracing one workflow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceResult {
    /// Workflows from root to leaf
    pub chain: Vec<WorkflowChainNode>,
    /// Selected root cause
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<RootCause>,
    /// `chain.len() - 1`, floored at 0
    pub depth: usize,
}

impl TraceResult {
    /// The last node of the chain
    pub fn leaf(&self) -> Option<&WorkflowChainNode> {
        self.chain.last()
    }
}

/// Flattened, display-oriented summary of one failing workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    /// The listed workflow
    pub root_workflow: WorkflowRef,
    /// Deepest workflow of the traced chain, when a root cause was found
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaf_failure: Option<WorkflowRef>,
    /// Depth of the traced chain
    pub depth: usize,
    /// Root cause summary, or `failed to trace: <error>`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub root_cause: String,
    /// Workflow IDs from root to leaf
    pub chain: Vec<String>,
    /// Close time of the listed workflow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Status of the listed workflow
    pub status: WorkflowStatus,
    /// Workflow type of the listed workflow
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workflow_type: String,
}

/// Failures aggregated under one grouping key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureGroup {
    /// Grouping key
    pub key: String,
    /// Number of reports in the group
    pub count: usize,
    /// `count / total * 100`
    pub percentage: f64,
    /// First report seen for this key
    pub sample: FailureReport,
    /// Earliest report timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
    /// Latest report timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

/// Output of the failures finder: either a listing or groups, never both
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FailuresResult {
    /// Grouped failures
    Grouped {
        /// Groups, largest first
        groups: Vec<FailureGroup>,
        /// Number of reports aggregated
        total_count: usize,
        /// Visibility query used
        query: String,
        /// Grouping mode
        grouped_by: String,
    },
    /// Individual failure reports
    Listing {
        /// Reports in listing order
        failures: Vec<FailureReport>,
        /// Number of reports
        total_count: usize,
        /// Visibility query used
        query: String,
    },
}

impl FailuresResult {
    /// Number of reports covered by this result
    pub fn total_count(&self) -> usize {
        match self {
            Self::Grouped { total_count, .. } | Self::Listing { total_count, .. } => *total_count,
        }
    }

    /// Visibility query used
    pub fn query(&self) -> &str {
        match self {
            Self::Grouped { query, .. } | Self::Listing { query, .. } => query,
        }
    }
}

/// Category of a timeline event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Workflow lifecycle
    Workflow,
    /// Activity task
    Activity,
    /// Timer
    Timer,
    /// Child workflow
    ChildWorkflow,
    /// Signal
    Signal,
    /// Nexus operation
    Nexus,
    /// Anything else
    Other,
}

impl EventCategory {
    /// Serialized name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Workflow => "workflow",
            Self::Activity => "activity",
            Self::Timer => "timer",
            Self::ChildWorkflow => "child_workflow",
            Self::Signal => "signal",
            Self::Nexus => "nexus",
            Self::Other => "other",
        }
    }
}

/// One entry of a workflow timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// When the event was recorded
    pub timestamp: DateTime<Utc>,
    /// History event ID
    pub event_id: i64,
    /// Event type, e.g. `ActivityTaskFailed`
    #[serde(rename = "type")]
    pub event_type: String,
    /// Category
    pub category: EventCategory,
    /// Activity type, timer ID, child workflow type, signal name or
    /// `service/operation`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// State change, e.g. `scheduled`, `failed`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    /// Activity ID
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub activity_id: String,
    /// Failure message
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    /// Result payload, when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Input payload, when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    /// Time since the matching schedule/start event
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub duration_ms: i64,
    /// Attempt number
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub attempt: u32,
    /// Child workflow reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_workflow: Option<WorkflowRef>,
    /// Failures seen so far for this activity type (compact mode)
    #[serde(default, skip_serializing_if = "is_zero_usize")]
    pub retry_count: usize,
}

impl TimelineEvent {
    /// A bare event of the given type and category
    pub fn new(
        timestamp: DateTime<Utc>,
        event_id: i64,
        event_type: impl Into<String>,
        category: EventCategory,
    ) -> Self {
        Self {
            timestamp,
            event_id,
            event_type: event_type.into(),
            category,
            name: String::new(),
            status: String::new(),
            activity_id: String::new(),
            error: String::new(),
            result: None,
            input: None,
            duration_ms: 0,
            attempt: 0,
            child_workflow: None,
            retry_count: 0,
        }
    }
}

/// Timeline of one workflow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineResult {
    /// Workflow the timeline belongs to
    pub workflow: WorkflowRef,
    /// Workflow type name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workflow_type: String,
    /// Status derived from history
    pub status: WorkflowStatus,
    /// Start time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// Close time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_time: Option<DateTime<Utc>>,
    /// Run duration
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub duration_ms: i64,
    /// Events after filtering
    pub events: Vec<TimelineEvent>,
    /// Number of history events read, before filtering
    pub event_count: usize,
}

/// An activity that has not finished yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingActivity {
    /// Activity ID
    pub activity_id: String,
    /// Activity type
    pub activity_type: String,
    /// `Scheduled`, `Started` or `CancelRequested`
    pub state: String,
    /// Current attempt
    pub attempt: u32,
    /// Maximum attempts, 0 for unlimited
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub max_attempts: u32,
    /// When the activity was scheduled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<DateTime<Utc>>,
    /// When the current attempt started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_started_time: Option<DateTime<Utc>>,
    /// Failure of the previous attempt
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_failure: String,
}

/// A child workflow that has not closed yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingChildWorkflow {
    /// Child workflow ID
    pub workflow_id: String,
    /// Child run ID
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub run_id: String,
    /// Child workflow type
    pub workflow_type: String,
    /// Initiating event in the parent history
    pub initiated_event_id: i64,
    /// Parent close policy
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent_close_policy: String,
}

/// A Nexus operation that has not finished yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingNexusOperation {
    /// Endpoint name
    pub endpoint: String,
    /// Service name
    pub service: String,
    /// Operation name
    pub operation: String,
    /// Asynchronous operation token
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub operation_token: String,
    /// `Scheduled`, `BackingOff`, `Started` or `Blocked`
    pub state: String,
    /// Current attempt
    pub attempt: u32,
    /// When the operation was scheduled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<DateTime<Utc>>,
    /// Schedule event ID
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub scheduled_event_id: i64,
    /// When the last attempt completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_complete_time: Option<DateTime<Utc>>,
    /// When the next attempt is due
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_attempt_schedule_time: Option<DateTime<Utc>>,
    /// Failure of the last attempt
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_failure: String,
    /// Why the operation is blocked
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub blocked_reason: String,
    /// Schedule-to-close timeout in seconds
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub schedule_to_close_timeout_sec: i64,
}

/// Current state of a workflow execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStateResult {
    /// Workflow
    pub workflow: WorkflowRef,
    /// Workflow type
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workflow_type: String,
    /// Status
    pub status: WorkflowStatus,
    /// Start time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// Close time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_time: Option<DateTime<Utc>>,
    /// True while the workflow is running
    pub is_running: bool,
    /// Pending activities
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_activities: Vec<PendingActivity>,
    /// Number of pending activities
    pub pending_activity_count: usize,
    /// Pending child workflows
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_child_workflows: Vec<PendingChildWorkflow>,
    /// Number of pending child workflows
    pub pending_child_workflow_count: usize,
    /// Pending Nexus operations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_nexus_operations: Vec<PendingNexusOperation>,
    /// Number of pending Nexus operations
    pub pending_nexus_operation_count: usize,
    /// Task queue
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub task_queue: String,
    /// Number of history events
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub history_length: i64,
    /// Memo, when details were requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<BTreeMap<String, Value>>,
    /// Search attributes, when details were requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_attributes: Option<BTreeMap<String, Value>>,
}
