//! Workflow history event model
//!
//! A workflow run's history is an append-only list of [`HistoryEvent`]s in
//! ascending `event_id` order. Events that reference earlier events (an
//! activity start referencing its schedule, a child completion referencing
//! its initiation) carry that event's id in their attributes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifies one run of a workflow inside a namespace-scoped client
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// Workflow ID
    pub workflow_id: String,
    /// Run ID, empty when unknown
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub run_id: String,
}

impl WorkflowExecution {
    /// Create an execution reference
    pub fn new(workflow_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
        }
    }
}

/// Failure details attached to failed or timed-out events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Human readable failure message
    pub message: String,
    /// The failure that caused this one, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<Failure>>,
}

impl Failure {
    /// A failure with no cause
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    /// Attach a cause
    pub fn with_cause(mut self, cause: Failure) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

/// Metadata link from an event to another execution or job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLink {
    /// An event in another workflow execution, typically the target of a
    /// Nexus operation
    WorkflowEvent {
        /// Namespace of the linked workflow
        namespace: String,
        /// Linked workflow ID
        workflow_id: String,
        /// Linked run ID
        #[serde(default)]
        run_id: String,
    },
    /// A batch job
    BatchJob {
        /// Batch job ID
        job_id: String,
    },
}

/// One event in a workflow's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    /// Sequential event ID, starting at 1
    pub event_id: i64,
    /// Wall-clock time the event was recorded
    pub event_time: DateTime<Utc>,
    /// Type-specific attributes; the variant is the event type
    pub attributes: EventAttributes,
    /// Links to related executions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<EventLink>,
}

impl HistoryEvent {
    /// Create an event without links
    pub fn new(event_id: i64, event_time: DateTime<Utc>, attributes: EventAttributes) -> Self {
        Self {
            event_id,
            event_time,
            attributes,
            links: Vec::new(),
        }
    }

    /// Add a link
    pub fn with_link(mut self, link: EventLink) -> Self {
        self.links.push(link);
        self
    }

    /// The event type name, e.g. `ActivityTaskScheduled`
    pub fn event_type(&self) -> &str {
        self.attributes.event_type()
    }

    /// The first link pointing at a workflow event
    pub fn workflow_link(&self) -> Option<(&str, &str, &str)> {
        self.links.iter().find_map(|link| match link {
            EventLink::WorkflowEvent {
                namespace,
                workflow_id,
                run_id,
            } => Some((namespace.as_str(), workflow_id.as_str(), run_id.as_str())),
            EventLink::BatchJob { .. } => None,
        })
    }
}

/// Event attributes, one variant per event type the engine interprets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum EventAttributes {
    /// First event of every run
    WorkflowExecutionStarted {
        /// Workflow type name
        workflow_type: String,
        /// Run ID of the first run in a continue-as-new chain
        #[serde(default)]
        original_execution_run_id: String,
        /// Task queue the run was started on
        #[serde(default)]
        task_queue: String,
        /// Workflow input
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
    },
    /// The run completed successfully
    WorkflowExecutionCompleted {
        /// Workflow result
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    /// The run failed
    WorkflowExecutionFailed {
        /// Failure
        failure: Failure,
    },
    /// The run exceeded its execution or run timeout
    WorkflowExecutionTimedOut {},
    /// The run was cancelled
    WorkflowExecutionCanceled {},
    /// The run was terminated
    WorkflowExecutionTerminated {
        /// Termination reason
        #[serde(default)]
        reason: String,
    },
    /// The run continued as a new run
    WorkflowExecutionContinuedAsNew {
        /// Run ID of the new run
        #[serde(default)]
        new_execution_run_id: String,
    },
    /// A signal was delivered
    WorkflowExecutionSignaled {
        /// Signal name
        signal_name: String,
        /// Signal payload
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
    },

    /// An activity was scheduled
    ActivityTaskScheduled {
        /// Activity ID
        activity_id: String,
        /// Activity type name
        activity_type: String,
        /// Activity input
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
    },
    /// A worker picked up the activity
    ActivityTaskStarted {
        /// Event ID of the schedule event
        scheduled_event_id: i64,
        /// Attempt number, starting at 1
        #[serde(default)]
        attempt: u32,
    },
    /// The activity completed
    ActivityTaskCompleted {
        /// Event ID of the schedule event
        scheduled_event_id: i64,
        /// Activity result
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    /// The activity failed after exhausting retries
    ActivityTaskFailed {
        /// Event ID of the schedule event
        scheduled_event_id: i64,
        /// Failure
        failure: Failure,
    },
    /// The activity timed out
    ActivityTaskTimedOut {
        /// Event ID of the schedule event
        scheduled_event_id: i64,
        /// Timeout failure, if recorded
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failure: Option<Failure>,
    },
    /// The activity was cancelled
    ActivityTaskCanceled {
        /// Event ID of the schedule event
        scheduled_event_id: i64,
    },

    /// A timer was started
    TimerStarted {
        /// Timer ID
        timer_id: String,
    },
    /// A timer fired
    TimerFired {
        /// Timer ID
        timer_id: String,
        /// Event ID of the start event
        started_event_id: i64,
    },
    /// A timer was cancelled
    TimerCanceled {
        /// Timer ID
        timer_id: String,
        /// Event ID of the start event
        started_event_id: i64,
    },

    /// The workflow asked to start a child workflow
    StartChildWorkflowExecutionInitiated {
        /// Child namespace, empty for the parent's namespace
        #[serde(default)]
        namespace: String,
        /// Child workflow ID
        workflow_id: String,
        /// Child workflow type name
        workflow_type: String,
        /// Child input
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
    },
    /// The child workflow started
    ChildWorkflowExecutionStarted {
        /// Event ID of the initiation event
        initiated_event_id: i64,
        /// Child execution
        workflow_execution: WorkflowExecution,
    },
    /// The child workflow completed
    ChildWorkflowExecutionCompleted {
        /// Event ID of the initiation event
        initiated_event_id: i64,
        /// Child execution
        workflow_execution: WorkflowExecution,
        /// Child result
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    /// The child workflow failed
    ChildWorkflowExecutionFailed {
        /// Event ID of the initiation event
        initiated_event_id: i64,
        /// Child execution
        workflow_execution: WorkflowExecution,
        /// Failure
        failure: Failure,
    },
    /// The child workflow timed out
    ChildWorkflowExecutionTimedOut {
        /// Event ID of the initiation event
        initiated_event_id: i64,
        /// Child execution
        workflow_execution: WorkflowExecution,
    },
    /// The child workflow was cancelled
    ChildWorkflowExecutionCanceled {
        /// Event ID of the initiation event
        initiated_event_id: i64,
        /// Child execution
        workflow_execution: WorkflowExecution,
    },
    /// The child workflow was terminated
    ChildWorkflowExecutionTerminated {
        /// Event ID of the initiation event
        initiated_event_id: i64,
        /// Child execution
        workflow_execution: WorkflowExecution,
    },

    /// A Nexus operation was scheduled
    NexusOperationScheduled {
        /// Nexus endpoint name
        endpoint: String,
        /// Service name
        service: String,
        /// Operation name
        operation: String,
        /// Operation input
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
    },
    /// The handler started an asynchronous operation
    NexusOperationStarted {
        /// Event ID of the schedule event
        scheduled_event_id: i64,
        /// Token identifying the asynchronous operation
        #[serde(default)]
        operation_token: String,
    },
    /// The operation completed
    NexusOperationCompleted {
        /// Event ID of the schedule event
        scheduled_event_id: i64,
        /// Operation result
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    /// The operation failed
    NexusOperationFailed {
        /// Event ID of the schedule event
        scheduled_event_id: i64,
        /// Failure, usually wrapping the handler's failure as its cause
        failure: Failure,
    },
    /// The operation was cancelled
    NexusOperationCanceled {
        /// Event ID of the schedule event
        scheduled_event_id: i64,
    },
    /// The operation timed out
    NexusOperationTimedOut {
        /// Event ID of the schedule event
        scheduled_event_id: i64,
        /// Timeout failure, if recorded
        #[serde(default, skip_serializing_if = "Option::is_none")]
        failure: Option<Failure>,
    },

    /// Any event type the engine does not interpret
    Other {
        /// Event type name, e.g. `WorkflowTaskCompleted`
        event_type: String,
    },
}

impl EventAttributes {
    /// Event type name
    pub fn event_type(&self) -> &str {
        match self {
            Self::WorkflowExecutionStarted { .. } => "WorkflowExecutionStarted",
            Self::WorkflowExecutionCompleted { .. } => "WorkflowExecutionCompleted",
            Self::WorkflowExecutionFailed { .. } => "WorkflowExecutionFailed",
            Self::WorkflowExecutionTimedOut {} => "WorkflowExecutionTimedOut",
            Self::WorkflowExecutionCanceled {} => "WorkflowExecutionCanceled",
            Self::WorkflowExecutionTerminated { .. } => "WorkflowExecutionTerminated",
            Self::WorkflowExecutionContinuedAsNew { .. } => "WorkflowExecutionContinuedAsNew",
            Self::WorkflowExecutionSignaled { .. } => "WorkflowExecutionSignaled",
            Self::ActivityTaskScheduled { .. } => "ActivityTaskScheduled",
            Self::ActivityTaskStarted { .. } => "ActivityTaskStarted",
            Self::ActivityTaskCompleted { .. } => "ActivityTaskCompleted",
            Self::ActivityTaskFailed { .. } => "ActivityTaskFailed",
            Self::ActivityTaskTimedOut { .. } => "ActivityTaskTimedOut",
            Self::ActivityTaskCanceled { .. } => "ActivityTaskCanceled",
            Self::TimerStarted { .. } => "TimerStarted",
            Self::TimerFired { .. } => "TimerFired",
            Self::TimerCanceled { .. } => "TimerCanceled",
            Self::StartChildWorkflowExecutionInitiated { .. } => {
                "StartChildWorkflowExecutionInitiated"
            }
            Self::ChildWorkflowExecutionStarted { .. } => "ChildWorkflowExecutionStarted",
            Self::ChildWorkflowExecutionCompleted { .. } => "ChildWorkflowExecutionCompleted",
            Self::ChildWorkflowExecutionFailed { .. } => "ChildWorkflowExecutionFailed",
            Self::ChildWorkflowExecutionTimedOut { .. } => "ChildWorkflowExecutionTimedOut",
            Self::ChildWorkflowExecutionCanceled { .. } => "ChildWorkflowExecutionCanceled",
            Self::ChildWorkflowExecutionTerminated { .. } => "ChildWorkflowExecutionTerminated",
            Self::NexusOperationScheduled { .. } => "NexusOperationScheduled",
            Self::NexusOperationStarted { .. } => "NexusOperationStarted",
            Self::NexusOperationCompleted { .. } => "NexusOperationCompleted",
            Self::NexusOperationFailed { .. } => "NexusOperationFailed",
            Self::NexusOperationCanceled { .. } => "NexusOperationCanceled",
            Self::NexusOperationTimedOut { .. } => "NexusOperationTimedOut",
            Self::Other { event_type } => event_type,
        }
    }

    /// True for events that close the workflow run
    pub fn is_close_event(&self) -> bool {
        matches!(
            self,
            Self::WorkflowExecutionCompleted { .. }
                | Self::WorkflowExecutionFailed { .. }
                | Self::WorkflowExecutionTimedOut {}
                | Self::WorkflowExecutionCanceled {}
                | Self::WorkflowExecutionTerminated { .. }
                | Self::WorkflowExecutionContinuedAsNew { .. }
        )
    }
}
