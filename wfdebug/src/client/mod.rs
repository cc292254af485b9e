//! Remote orchestration service seam
//!
//! The engine never talks to a concrete service. It asks a
//! [`ClientProvider`] for a namespace-scoped [`WorkflowClient`] and issues
//! describe, history and list calls through it. The provider is injected
//! into each engine component, so several engines with different providers
//! can coexist in one process.

pub mod memory;

use crate::context::CallContext;
use crate::error::{ClientError, Result};
use crate::history::{Failure, HistoryEvent, WorkflowExecution};
use crate::types::WorkflowStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

pub use memory::{
    InMemoryClientConfig, InMemoryClientProvider, InMemoryWorkflowClient, WorkflowFixture,
};

/// Summary of one execution as returned by describe and list calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecutionInfo {
    /// Execution identity
    pub execution: WorkflowExecution,
    /// Workflow type name
    #[serde(default)]
    pub workflow_type: String,
    /// Current status
    pub status: WorkflowStatus,
    /// Start time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// Close time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_time: Option<DateTime<Utc>>,
    /// Task queue
    #[serde(default)]
    pub task_queue: String,
    /// Number of history events
    #[serde(default)]
    pub history_length: i64,
    /// Memo fields
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub memo: BTreeMap<String, Value>,
    /// Indexed search attributes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub search_attributes: BTreeMap<String, Value>,
}

/// State of a pending activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingActivityState {
    /// Not reported
    #[default]
    Unspecified,
    /// Waiting for a worker
    Scheduled,
    /// Running on a worker
    Started,
    /// Cancellation requested
    CancelRequested,
}

impl PendingActivityState {
    /// Display name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "Scheduled",
            Self::Started => "Started",
            Self::CancelRequested => "CancelRequested",
            Self::Unspecified => "Unknown",
        }
    }
}

/// What happens to a child when its parent closes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParentClosePolicy {
    /// Not reported
    #[default]
    Unspecified,
    /// Terminate the child
    Terminate,
    /// Leave the child running
    Abandon,
    /// Request cancellation of the child
    RequestCancel,
}

impl ParentClosePolicy {
    /// Display name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Terminate => "Terminate",
            Self::Abandon => "Abandon",
            Self::RequestCancel => "RequestCancel",
            Self::Unspecified => "Unspecified",
        }
    }
}

/// State of a pending Nexus operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingNexusOperationState {
    /// Not reported
    #[default]
    Unspecified,
    /// Waiting to be sent
    Scheduled,
    /// Waiting to retry
    BackingOff,
    /// Accepted by the handler
    Started,
    /// Blocked, see `blocked_reason`
    Blocked,
}

impl PendingNexusOperationState {
    /// Display name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "Scheduled",
            Self::BackingOff => "BackingOff",
            Self::Started => "Started",
            Self::Blocked => "Blocked",
            Self::Unspecified => "Unknown",
        }
    }
}

/// Pending activity as reported by describe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PendingActivityInfo {
    /// Activity ID
    pub activity_id: String,
    /// Activity type
    pub activity_type: String,
    /// State
    pub state: PendingActivityState,
    /// Current attempt
    pub attempt: u32,
    /// Maximum attempts, 0 for unlimited
    pub maximum_attempts: u32,
    /// Schedule time
    pub scheduled_time: Option<DateTime<Utc>>,
    /// Start time of the current attempt
    pub last_started_time: Option<DateTime<Utc>>,
    /// Failure of the previous attempt
    pub last_failure: Option<Failure>,
}

/// Pending child workflow as reported by describe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PendingChildExecutionInfo {
    /// Child workflow ID
    pub workflow_id: String,
    /// Child run ID
    pub run_id: String,
    /// Child workflow type
    pub workflow_type_name: String,
    /// Initiating event in the parent history
    pub initiated_id: i64,
    /// Parent close policy
    pub parent_close_policy: ParentClosePolicy,
}

/// Pending Nexus operation as reported by describe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PendingNexusOperationInfo {
    /// Endpoint name
    pub endpoint: String,
    /// Service name
    pub service: String,
    /// Operation name
    pub operation: String,
    /// Asynchronous operation token
    pub operation_token: String,
    /// State
    pub state: PendingNexusOperationState,
    /// Current attempt
    pub attempt: u32,
    /// Schedule time
    pub scheduled_time: Option<DateTime<Utc>>,
    /// Schedule event ID
    pub scheduled_event_id: i64,
    /// When the last attempt completed
    pub last_attempt_complete_time: Option<DateTime<Utc>>,
    /// When the next attempt is due
    pub next_attempt_schedule_time: Option<DateTime<Utc>>,
    /// Failure of the last attempt
    pub last_attempt_failure: Option<Failure>,
    /// Why the operation is blocked
    pub blocked_reason: String,
    /// Schedule-to-close timeout in seconds
    pub schedule_to_close_timeout_secs: Option<u64>,
}

/// Response of a describe call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecutionDescription {
    /// Execution summary
    pub info: WorkflowExecutionInfo,
    /// Pending activities
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_activities: Vec<PendingActivityInfo>,
    /// Pending child workflows
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_children: Vec<PendingChildExecutionInfo>,
    /// Pending Nexus operations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_nexus_operations: Vec<PendingNexusOperationInfo>,
}

/// Which events a history request returns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HistoryEventFilter {
    /// Every event
    #[default]
    AllEvents,
    /// Only the event that closed the run
    CloseEvent,
}

/// Request for one page of a run's history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPageRequest {
    /// Workflow ID
    pub workflow_id: String,
    /// Run ID; empty for the latest run
    pub run_id: String,
    /// Event filter
    pub filter: HistoryEventFilter,
    /// Token from the previous page, `None` for the first page
    pub next_page_token: Option<String>,
}

/// One page of history
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryPage {
    /// Events in ascending event ID order
    pub events: Vec<HistoryEvent>,
    /// Token for the next page, `None` on the last page
    pub next_page_token: Option<String>,
}

/// Request for one page of a visibility query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListWorkflowsRequest {
    /// Visibility query
    pub query: String,
    /// Token from the previous page
    pub next_page_token: Option<String>,
}

/// One page of visibility results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListWorkflowsPage {
    /// Matching executions
    pub executions: Vec<WorkflowExecutionInfo>,
    /// Token for the next page, `None` on the last page
    pub next_page_token: Option<String>,
}

/// Namespace-scoped handle on the orchestration service
#[async_trait]
pub trait WorkflowClient: Send + Sync {
    /// Namespace this client is bound to
    fn namespace(&self) -> &str;

    /// Describe an execution; `run_id = None` describes the latest run
    async fn describe_workflow_execution(
        &self,
        workflow_id: &str,
        run_id: Option<&str>,
    ) -> std::result::Result<WorkflowExecutionDescription, ClientError>;

    /// Fetch one page of a run's history
    async fn get_workflow_history_page(
        &self,
        request: &HistoryPageRequest,
    ) -> std::result::Result<HistoryPage, ClientError>;

    /// Fetch one page of a visibility query
    async fn list_workflow_executions(
        &self,
        request: &ListWorkflowsRequest,
    ) -> std::result::Result<ListWorkflowsPage, ClientError>;
}

/// Hands out clients per namespace
///
/// Namespaces may need different credentials or endpoints; a provider that
/// cannot serve a namespace returns an error.
#[async_trait]
pub trait ClientProvider: Send + Sync {
    /// Get a client for `namespace`
    async fn get_client(
        &self,
        namespace: &str,
    ) -> std::result::Result<Arc<dyn WorkflowClient>, ClientError>;
}

/// Resolve a namespace's client under `ctx`
pub async fn client_for(
    provider: &dyn ClientProvider,
    ctx: &CallContext,
    namespace: &str,
) -> Result<Arc<dyn WorkflowClient>> {
    let operation = format!("get client for namespace {namespace}");
    ctx.call(&operation, provider.get_client(namespace)).await
}

/// Describe an execution under `ctx`
pub async fn describe_workflow(
    client: &dyn WorkflowClient,
    ctx: &CallContext,
    workflow_id: &str,
    run_id: Option<&str>,
) -> Result<WorkflowExecutionDescription> {
    ctx.call(
        "describe workflow",
        client.describe_workflow_execution(workflow_id, run_id),
    )
    .await
}

/// Replay a run's history page by page, handing each event to `on_event`
/// strictly in delivery order
///
/// Returns the number of events delivered.
pub async fn replay_history<F>(
    client: &dyn WorkflowClient,
    ctx: &CallContext,
    workflow_id: &str,
    run_id: &str,
    filter: HistoryEventFilter,
    mut on_event: F,
) -> Result<usize>
where
    F: FnMut(&HistoryEvent) + Send,
{
    let mut request = HistoryPageRequest {
        workflow_id: workflow_id.to_string(),
        run_id: run_id.to_string(),
        filter,
        next_page_token: None,
    };
    let mut delivered = 0;

    loop {
        let page = ctx
            .call("get history event", client.get_workflow_history_page(&request))
            .await?;
        tracing::debug!(
            "History page for {}/{}: {} events",
            workflow_id,
            run_id,
            page.events.len()
        );

        for event in &page.events {
            on_event(event);
        }
        delivered += page.events.len();

        match page.next_page_token {
            Some(token) if !token.is_empty() => request.next_page_token = Some(token),
            _ => break,
        }
    }

    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::InMemoryClientConfig;
    use crate::test_utils::HistoryBuilder;

    #[tokio::test]
    async fn test_replay_history_walks_every_page_in_order() {
        let fixture = HistoryBuilder::new("order-1", "run-1", "OrderWorkflow")
            .activity("ReserveActivity")
            .activity("ShipActivity")
            .completed()
            .into_fixture();
        let provider = InMemoryClientProvider::new_with_config(InMemoryClientConfig {
            history_page_size: 2,
            ..Default::default()
        });
        provider.insert("default", fixture).await;

        let ctx = CallContext::new();
        let client = client_for(&provider, &ctx, "default").await.unwrap();
        let mut ids = Vec::new();
        let delivered = replay_history(
            client.as_ref(),
            &ctx,
            "order-1",
            "run-1",
            HistoryEventFilter::AllEvents,
            |event| ids.push(event.event_id),
        )
        .await
        .unwrap();

        assert_eq!(delivered, ids.len());
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert!(ids.len() > 2);
    }

    #[tokio::test]
    async fn test_client_for_names_namespace_in_error() {
        let provider = InMemoryClientProvider::new();
        provider.deny_namespace("secret").await;

        let err = client_for(&provider, &CallContext::new(), "secret")
            .await
            .err()
            .unwrap();
        assert!(err
            .to_string()
            .starts_with("failed to get client for namespace secret"));
    }
}
