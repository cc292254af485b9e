//! Folds one run's history into status, timing and sub-operation state
//!
//! Scheduled/initiated events open a pending entry keyed by their own event
//! ID. Started events enrich it, terminal events either drop it (success,
//! cancel) or move it to the matching failed list. Terminal events whose
//! scheduling event was never seen are dropped.

use crate::history::{EventAttributes, HistoryEvent};
use crate::types::WorkflowStatus;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ActivityState {
    pub activity_id: String,
    pub activity_type: String,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub started_time: Option<DateTime<Utc>>,
    pub failure_time: Option<DateTime<Utc>>,
    pub failure_message: String,
    pub attempt: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ChildWorkflowState {
    pub namespace: String,
    pub workflow_id: String,
    pub run_id: String,
    pub workflow_type: String,
    pub failure_message: String,
}

/// Target fields are filled from the first workflow-event link on the
/// started event, when the handler reported one.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct NexusOperationState {
    pub endpoint: String,
    pub service: String,
    pub operation: String,
    pub namespace: String,
    pub workflow_id: String,
    pub run_id: String,
    pub failure_time: Option<DateTime<Utc>>,
    pub failure_message: String,
}

impl NexusOperationState {
    pub fn has_target(&self) -> bool {
        !self.namespace.is_empty() && !self.workflow_id.is_empty()
    }
}

#[derive(Debug, Default)]
pub(crate) struct HistoryStateMachine {
    namespace: String,
    pub run_id: String,
    pub workflow_type: String,
    pub status: WorkflowStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub close_time: Option<DateTime<Utc>>,
    pub failure_message: String,

    pending_activities: HashMap<i64, ActivityState>,
    pub failed_activities: Vec<ActivityState>,

    pending_children: HashMap<i64, ChildWorkflowState>,
    pub failed_children: Vec<ChildWorkflowState>,

    pending_nexus_ops: HashMap<i64, NexusOperationState>,
    pub failed_nexus_ops: Vec<NexusOperationState>,
}

impl HistoryStateMachine {
    /// `namespace` is used for children initiated without an explicit one
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            ..Self::default()
        }
    }

    pub fn pending_activity_count(&self) -> usize {
        self.pending_activities.len()
    }

    pub fn pending_child_count(&self) -> usize {
        self.pending_children.len()
    }

    pub fn pending_nexus_count(&self) -> usize {
        self.pending_nexus_ops.len()
    }

    /// Milliseconds between start and close, 0 while either is missing
    pub fn duration_ms(&self) -> i64 {
        match (self.start_time, self.close_time) {
            (Some(start), Some(close)) => (close - start).num_milliseconds(),
            _ => 0,
        }
    }

    fn close(&mut self, status: WorkflowStatus, at: DateTime<Utc>) {
        self.status = status;
        self.close_time = Some(at);
    }

    pub fn process_event(&mut self, event: &HistoryEvent) {
        let at = event.event_time;

        match &event.attributes {
            EventAttributes::WorkflowExecutionStarted {
                workflow_type,
                original_execution_run_id,
                ..
            } => {
                self.status = WorkflowStatus::Running;
                self.workflow_type = workflow_type.clone();
                self.run_id = original_execution_run_id.clone();
                self.start_time = Some(at);
            }
            EventAttributes::WorkflowExecutionCompleted { .. } => {
                self.close(WorkflowStatus::Completed, at)
            }
            EventAttributes::WorkflowExecutionFailed { failure } => {
                self.failure_message = failure.message.clone();
                self.close(WorkflowStatus::Failed, at);
            }
            EventAttributes::WorkflowExecutionTimedOut {} => self.close(WorkflowStatus::TimedOut, at),
            EventAttributes::WorkflowExecutionCanceled {} => self.close(WorkflowStatus::Canceled, at),
            EventAttributes::WorkflowExecutionTerminated { .. } => {
                self.close(WorkflowStatus::Terminated, at)
            }
            EventAttributes::WorkflowExecutionContinuedAsNew { .. } => {
                self.close(WorkflowStatus::ContinuedAsNew, at)
            }

            EventAttributes::ActivityTaskScheduled {
                activity_id,
                activity_type,
                ..
            } => {
                self.pending_activities.insert(
                    event.event_id,
                    ActivityState {
                        activity_id: activity_id.clone(),
                        activity_type: activity_type.clone(),
                        scheduled_time: Some(at),
                        ..ActivityState::default()
                    },
                );
            }
            EventAttributes::ActivityTaskStarted {
                scheduled_event_id,
                attempt,
            } => {
                if let Some(activity) = self.pending_activities.get_mut(scheduled_event_id) {
                    activity.started_time = Some(at);
                    activity.attempt = *attempt;
                }
            }
            EventAttributes::ActivityTaskCompleted {
                scheduled_event_id, ..
            }
            | EventAttributes::ActivityTaskCanceled { scheduled_event_id } => {
                self.pending_activities.remove(scheduled_event_id);
            }
            EventAttributes::ActivityTaskFailed {
                scheduled_event_id,
                failure,
            } => self.fail_activity(event, *scheduled_event_id, failure.message.clone()),
            EventAttributes::ActivityTaskTimedOut {
                scheduled_event_id,
                failure,
            } => {
                let message = failure
                    .as_ref()
                    .map_or_else(|| "activity timed out".to_string(), |f| f.message.clone());
                self.fail_activity(event, *scheduled_event_id, message);
            }

            EventAttributes::StartChildWorkflowExecutionInitiated {
                namespace,
                workflow_id,
                workflow_type,
                ..
            } => {
                let namespace = if namespace.is_empty() {
                    self.namespace.clone()
                } else {
                    namespace.clone()
                };
                self.pending_children.insert(
                    event.event_id,
                    ChildWorkflowState {
                        namespace,
                        workflow_id: workflow_id.clone(),
                        workflow_type: workflow_type.clone(),
                        ..ChildWorkflowState::default()
                    },
                );
            }
            EventAttributes::ChildWorkflowExecutionStarted {
                initiated_event_id,
                workflow_execution,
            } => {
                if let Some(child) = self.pending_children.get_mut(initiated_event_id) {
                    child.run_id = workflow_execution.run_id.clone();
                }
            }
            EventAttributes::ChildWorkflowExecutionCompleted {
                initiated_event_id, ..
            }
            | EventAttributes::ChildWorkflowExecutionCanceled {
                initiated_event_id, ..
            } => {
                self.pending_children.remove(initiated_event_id);
            }
            EventAttributes::ChildWorkflowExecutionFailed {
                initiated_event_id,
                workflow_execution,
                failure,
            } => self.fail_child(
                event,
                *initiated_event_id,
                &workflow_execution.run_id,
                failure.message.clone(),
            ),
            EventAttributes::ChildWorkflowExecutionTimedOut {
                initiated_event_id,
                workflow_execution,
            } => self.fail_child(
                event,
                *initiated_event_id,
                &workflow_execution.run_id,
                "child workflow timed out".to_string(),
            ),
            EventAttributes::ChildWorkflowExecutionTerminated {
                initiated_event_id,
                workflow_execution,
            } => self.fail_child(
                event,
                *initiated_event_id,
                &workflow_execution.run_id,
                "child workflow terminated".to_string(),
            ),

            EventAttributes::NexusOperationScheduled {
                endpoint,
                service,
                operation,
                ..
            } => {
                self.pending_nexus_ops.insert(
                    event.event_id,
                    NexusOperationState {
                        endpoint: endpoint.clone(),
                        service: service.clone(),
                        operation: operation.clone(),
                        ..NexusOperationState::default()
                    },
                );
            }
            EventAttributes::NexusOperationStarted {
                scheduled_event_id, ..
            } => {
                if let Some(op) = self.pending_nexus_ops.get_mut(scheduled_event_id) {
                    if let Some((namespace, workflow_id, run_id)) = event.workflow_link() {
                        op.namespace = namespace.to_string();
                        op.workflow_id = workflow_id.to_string();
                        op.run_id = run_id.to_string();
                    }
                }
            }
            EventAttributes::NexusOperationCompleted {
                scheduled_event_id, ..
            }
            | EventAttributes::NexusOperationCanceled { scheduled_event_id } => {
                self.pending_nexus_ops.remove(scheduled_event_id);
            }
            EventAttributes::NexusOperationFailed {
                scheduled_event_id,
                failure,
            } => {
                // the operation failure wraps the handler's failure
                let message = failure
                    .cause
                    .as_deref()
                    .map_or_else(|| failure.message.clone(), |cause| cause.message.clone());
                self.fail_nexus(event, *scheduled_event_id, message);
            }
            EventAttributes::NexusOperationTimedOut {
                scheduled_event_id,
                failure,
            } => {
                let message = failure
                    .as_ref()
                    .map_or_else(|| "nexus operation timed out".to_string(), |f| f.message.clone());
                self.fail_nexus(event, *scheduled_event_id, message);
            }

            EventAttributes::WorkflowExecutionSignaled { .. }
            | EventAttributes::TimerStarted { .. }
            | EventAttributes::TimerFired { .. }
            | EventAttributes::TimerCanceled { .. }
            | EventAttributes::Other { .. } => {}
        }
    }

    fn fail_activity(&mut self, event: &HistoryEvent, scheduled_event_id: i64, message: String) {
        match self.pending_activities.remove(&scheduled_event_id) {
            Some(mut activity) => {
                activity.failure_time = Some(event.event_time);
                activity.failure_message = message;
                self.failed_activities.push(activity);
            }
            None => unmatched(event, scheduled_event_id),
        }
    }

    fn fail_child(
        &mut self,
        event: &HistoryEvent,
        initiated_event_id: i64,
        run_id: &str,
        message: String,
    ) {
        match self.pending_children.remove(&initiated_event_id) {
            Some(mut child) => {
                child.failure_message = message;
                child.run_id = run_id.to_string();
                self.failed_children.push(child);
            }
            None => unmatched(event, initiated_event_id),
        }
    }

    fn fail_nexus(&mut self, event: &HistoryEvent, scheduled_event_id: i64, message: String) {
        match self.pending_nexus_ops.remove(&scheduled_event_id) {
            Some(mut op) => {
                op.failure_time = Some(event.event_time);
                op.failure_message = message;
                self.failed_nexus_ops.push(op);
            }
            None => unmatched(event, scheduled_event_id),
        }
    }
}

fn unmatched(event: &HistoryEvent, origin_event_id: i64) {
    tracing::warn!(
        "Dropping {} (event {}): originating event {} not in history",
        event.event_type(),
        event.event_id,
        origin_event_id
    );
}
