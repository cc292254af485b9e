//! Current state of a workflow execution from its describe response

use crate::client::{
    describe_workflow, PendingActivityInfo, PendingChildExecutionInfo, PendingNexusOperationInfo,
    WorkflowClient,
};
use crate::context::CallContext;
use crate::error::Result;
use crate::history::Failure;
use crate::types::{
    PendingActivity, PendingChildWorkflow, PendingNexusOperation, WorkflowRef,
    WorkflowStateResult, WorkflowStatus,
};
use std::sync::Arc;

/// State extraction settings
#[derive(Debug, Clone, Default)]
pub struct StateOptions {
    /// Include memo and search attributes
    pub include_details: bool,
}

/// Projects describe responses into [`WorkflowStateResult`]s
#[derive(Clone)]
pub struct StateExtractor {
    client: Arc<dyn WorkflowClient>,
    options: StateOptions,
}

fn failure_message(failure: &Option<Failure>) -> String {
    failure.as_ref().map(|f| f.message.clone()).unwrap_or_default()
}

impl From<&PendingActivityInfo> for PendingActivity {
    fn from(info: &PendingActivityInfo) -> Self {
        Self {
            activity_id: info.activity_id.clone(),
            activity_type: info.activity_type.clone(),
            state: info.state.as_str().to_string(),
            attempt: info.attempt,
            max_attempts: info.maximum_attempts,
            scheduled_time: info.scheduled_time,
            last_started_time: info.last_started_time,
            last_failure: failure_message(&info.last_failure),
        }
    }
}

impl From<&PendingChildExecutionInfo> for PendingChildWorkflow {
    fn from(info: &PendingChildExecutionInfo) -> Self {
        Self {
            workflow_id: info.workflow_id.clone(),
            run_id: info.run_id.clone(),
            workflow_type: info.workflow_type_name.clone(),
            initiated_event_id: info.initiated_id,
            parent_close_policy: info.parent_close_policy.as_str().to_string(),
        }
    }
}

impl From<&PendingNexusOperationInfo> for PendingNexusOperation {
    fn from(info: &PendingNexusOperationInfo) -> Self {
        Self {
            endpoint: info.endpoint.clone(),
            service: info.service.clone(),
            operation: info.operation.clone(),
            operation_token: info.operation_token.clone(),
            state: info.state.as_str().to_string(),
            attempt: info.attempt,
            scheduled_time: info.scheduled_time,
            scheduled_event_id: info.scheduled_event_id,
            last_attempt_complete_time: info.last_attempt_complete_time,
            next_attempt_schedule_time: info.next_attempt_schedule_time,
            last_failure: failure_message(&info.last_attempt_failure),
            blocked_reason: info.blocked_reason.clone(),
            schedule_to_close_timeout_sec: info
                .schedule_to_close_timeout_secs
                .map_or(0, |secs| i64::try_from(secs).unwrap_or(i64::MAX)),
        }
    }
}

impl StateExtractor {
    /// Create an extractor; the client fixes the namespace
    pub fn new(client: Arc<dyn WorkflowClient>, options: StateOptions) -> Self {
        Self { client, options }
    }

    /// Describe a run and project its pending work; `run_id = None` uses the
    /// latest run
    pub async fn get_state(
        &self,
        ctx: &CallContext,
        workflow_id: &str,
        run_id: Option<&str>,
    ) -> Result<WorkflowStateResult> {
        let run_id = run_id.filter(|r| !r.is_empty());
        let description =
            describe_workflow(self.client.as_ref(), ctx, workflow_id, run_id).await?;
        let info = description.info;

        let pending_activities: Vec<PendingActivity> = description
            .pending_activities
            .iter()
            .map(PendingActivity::from)
            .collect();
        let pending_child_workflows: Vec<PendingChildWorkflow> = description
            .pending_children
            .iter()
            .map(PendingChildWorkflow::from)
            .collect();
        let pending_nexus_operations: Vec<PendingNexusOperation> = description
            .pending_nexus_operations
            .iter()
            .map(PendingNexusOperation::from)
            .collect();

        tracing::debug!(
            "State of {}/{}: {} activities, {} children, {} nexus operations pending",
            self.client.namespace(),
            workflow_id,
            pending_activities.len(),
            pending_child_workflows.len(),
            pending_nexus_operations.len()
        );

        let (memo, search_attributes) = if self.options.include_details {
            (Some(info.memo), Some(info.search_attributes))
        } else {
            (None, None)
        };

        Ok(WorkflowStateResult {
            workflow: WorkflowRef::new(
                self.client.namespace(),
                info.execution.workflow_id,
                Some(info.execution.run_id),
            ),
            workflow_type: info.workflow_type,
            is_running: info.status == WorkflowStatus::Running,
            status: info.status,
            start_time: info.start_time,
            close_time: info.close_time,
            pending_activity_count: pending_activities.len(),
            pending_activities,
            pending_child_workflow_count: pending_child_workflows.len(),
            pending_child_workflows,
            pending_nexus_operation_count: pending_nexus_operations.len(),
            pending_nexus_operations,
            task_queue: info.task_queue,
            history_length: info.history_length,
            memo,
            search_attributes,
        })
    }
}
