//! Test utilities for building workflow histories
//!
//! [`HistoryBuilder`] produces a consistent [`WorkflowFixture`]: a history with
//! sequential event IDs one second apart, starting ten minutes ago, and a
//! describe response whose status and times match the history.

use crate::client::{
    PendingActivityInfo, PendingActivityState, PendingChildExecutionInfo,
    PendingNexusOperationInfo, PendingNexusOperationState, WorkflowExecutionDescription,
    WorkflowExecutionInfo, WorkflowFixture,
};
use crate::history::{EventAttributes, EventLink, Failure, HistoryEvent, WorkflowExecution};
use crate::types::WorkflowStatus;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

/// Builder for a single workflow run
#[derive(Debug, Clone)]
pub struct HistoryBuilder {
    workflow_id: String,
    run_id: String,
    workflow_type: String,
    task_queue: String,
    base: DateTime<Utc>,
    events: Vec<HistoryEvent>,
    status: WorkflowStatus,
    close_time: Option<DateTime<Utc>>,
    pending_activities: Vec<PendingActivityInfo>,
    pending_children: Vec<PendingChildExecutionInfo>,
    pending_nexus_operations: Vec<PendingNexusOperationInfo>,
    memo: BTreeMap<String, Value>,
    search_attributes: BTreeMap<String, Value>,
}

impl HistoryBuilder {
    /// Start a run; the first event is `WorkflowExecutionStarted`
    pub fn new(workflow_id: &str, run_id: &str, workflow_type: &str) -> Self {
        let base = Utc::now() - Duration::minutes(10);
        let mut builder = Self {
            workflow_id: workflow_id.to_string(),
            run_id: run_id.to_string(),
            workflow_type: workflow_type.to_string(),
            task_queue: "main".to_string(),
            base,
            events: Vec::new(),
            status: WorkflowStatus::Running,
            close_time: None,
            pending_activities: Vec::new(),
            pending_children: Vec::new(),
            pending_nexus_operations: Vec::new(),
            memo: BTreeMap::new(),
            search_attributes: BTreeMap::new(),
        };
        builder.push(EventAttributes::WorkflowExecutionStarted {
            workflow_type: workflow_type.to_string(),
            original_execution_run_id: run_id.to_string(),
            task_queue: "main".to_string(),
            input: Some(serde_json::json!({ "id": workflow_id })),
        });
        builder
    }

    fn next_id(&self) -> i64 {
        self.events.len() as i64 + 1
    }

    fn next_time(&self) -> DateTime<Utc> {
        self.base + Duration::seconds(self.next_id())
    }

    fn push(&mut self, attributes: EventAttributes) -> i64 {
        let id = self.next_id();
        let event = HistoryEvent::new(id, self.next_time(), attributes);
        self.events.push(event);
        id
    }

    fn push_event(&mut self, event: HistoryEvent) -> i64 {
        let id = event.event_id;
        self.events.push(event);
        id
    }

    fn schedule_activity(&mut self, activity_type: &str) -> i64 {
        let activity_id = self.next_id().to_string();
        let scheduled = self.push(EventAttributes::ActivityTaskScheduled {
            activity_id,
            activity_type: activity_type.to_string(),
            input: Some(Value::String(format!("{activity_type} input"))),
        });
        self.push(EventAttributes::ActivityTaskStarted {
            scheduled_event_id: scheduled,
            attempt: 1,
        });
        scheduled
    }

    /// An activity that completes
    pub fn activity(mut self, activity_type: &str) -> Self {
        let scheduled = self.schedule_activity(activity_type);
        self.push(EventAttributes::ActivityTaskCompleted {
            scheduled_event_id: scheduled,
            result: Some(Value::String(format!("{activity_type} done"))),
        });
        self
    }

    /// An activity that fails with `message`
    pub fn failing_activity(mut self, activity_type: &str, message: &str) -> Self {
        let scheduled = self.schedule_activity(activity_type);
        self.push(EventAttributes::ActivityTaskFailed {
            scheduled_event_id: scheduled,
            failure: Failure::new(message),
        });
        self
    }

    /// An activity that times out without a recorded failure
    pub fn timed_out_activity(mut self, activity_type: &str) -> Self {
        let scheduled = self.schedule_activity(activity_type);
        self.push(EventAttributes::ActivityTaskTimedOut {
            scheduled_event_id: scheduled,
            failure: None,
        });
        self
    }

    /// An activity that is scheduled and started but not finished
    pub fn pending_activity(mut self, activity_type: &str, attempt: u32) -> Self {
        let scheduled_time = self.next_time();
        let scheduled = self.schedule_activity(activity_type);
        self.pending_activities.push(PendingActivityInfo {
            activity_id: scheduled.to_string(),
            activity_type: activity_type.to_string(),
            state: PendingActivityState::Started,
            attempt,
            maximum_attempts: 5,
            scheduled_time: Some(scheduled_time),
            last_started_time: Some(scheduled_time + Duration::seconds(1)),
            last_failure: (attempt > 1).then(|| Failure::new("connection reset")),
        });
        self
    }

    /// A timer that fires
    pub fn timer(mut self, timer_id: &str) -> Self {
        let started = self.push(EventAttributes::TimerStarted {
            timer_id: timer_id.to_string(),
        });
        self.push(EventAttributes::TimerFired {
            timer_id: timer_id.to_string(),
            started_event_id: started,
        });
        self
    }

    /// A signal delivered to the workflow
    pub fn signal(mut self, signal_name: &str) -> Self {
        self.push(EventAttributes::WorkflowExecutionSignaled {
            signal_name: signal_name.to_string(),
            input: None,
        });
        self
    }

    /// An event the engine does not interpret
    pub fn other(mut self, event_type: &str) -> Self {
        self.push(EventAttributes::Other {
            event_type: event_type.to_string(),
        });
        self
    }

    fn start_child(&mut self, namespace: &str, workflow_id: &str, run_id: &str, workflow_type: &str) -> i64 {
        let initiated = self.push(EventAttributes::StartChildWorkflowExecutionInitiated {
            namespace: namespace.to_string(),
            workflow_id: workflow_id.to_string(),
            workflow_type: workflow_type.to_string(),
            input: None,
        });
        self.push(EventAttributes::ChildWorkflowExecutionStarted {
            initiated_event_id: initiated,
            workflow_execution: WorkflowExecution::new(workflow_id, run_id),
        });
        initiated
    }

    /// A child in the parent's namespace that completes
    pub fn child(mut self, workflow_id: &str, run_id: &str, workflow_type: &str) -> Self {
        let initiated = self.start_child("", workflow_id, run_id, workflow_type);
        self.push(EventAttributes::ChildWorkflowExecutionCompleted {
            initiated_event_id: initiated,
            workflow_execution: WorkflowExecution::new(workflow_id, run_id),
            result: None,
        });
        self
    }

    /// A child in the parent's namespace that fails with `message`
    pub fn failing_child(
        self,
        workflow_id: &str,
        run_id: &str,
        workflow_type: &str,
        message: &str,
    ) -> Self {
        self.failing_child_in("", workflow_id, run_id, workflow_type, message)
    }

    /// A child in `namespace` that fails with `message`
    pub fn failing_child_in(
        mut self,
        namespace: &str,
        workflow_id: &str,
        run_id: &str,
        workflow_type: &str,
        message: &str,
    ) -> Self {
        let initiated = self.start_child(namespace, workflow_id, run_id, workflow_type);
        self.push(EventAttributes::ChildWorkflowExecutionFailed {
            initiated_event_id: initiated,
            workflow_execution: WorkflowExecution::new(workflow_id, run_id),
            failure: Failure::new(message),
        });
        self
    }

    /// A child that has started and not closed
    pub fn pending_child(mut self, workflow_id: &str, run_id: &str, workflow_type: &str) -> Self {
        let initiated = self.start_child("", workflow_id, run_id, workflow_type);
        self.pending_children.push(PendingChildExecutionInfo {
            workflow_id: workflow_id.to_string(),
            run_id: run_id.to_string(),
            workflow_type_name: workflow_type.to_string(),
            initiated_id: initiated,
            parent_close_policy: crate::client::ParentClosePolicy::Terminate,
        });
        self
    }

    fn schedule_nexus(
        &mut self,
        service: &str,
        operation: &str,
        target: Option<(&str, &str, &str)>,
    ) -> i64 {
        let scheduled = self.push(EventAttributes::NexusOperationScheduled {
            endpoint: format!("{}-endpoint", service.to_lowercase()),
            service: service.to_string(),
            operation: operation.to_string(),
            input: None,
        });
        let mut started = HistoryEvent::new(
            self.next_id(),
            self.next_time(),
            EventAttributes::NexusOperationStarted {
                scheduled_event_id: scheduled,
                operation_token: format!("token-{scheduled}"),
            },
        );
        if let Some((namespace, workflow_id, run_id)) = target {
            started = started.with_link(EventLink::WorkflowEvent {
                namespace: namespace.to_string(),
                workflow_id: workflow_id.to_string(),
                run_id: run_id.to_string(),
            });
        }
        self.push_event(started);
        scheduled
    }

    /// A Nexus operation that completes
    pub fn nexus(mut self, service: &str, operation: &str) -> Self {
        let scheduled = self.schedule_nexus(service, operation, None);
        self.push(EventAttributes::NexusOperationCompleted {
            scheduled_event_id: scheduled,
            result: None,
        });
        self
    }

    /// A Nexus operation that fails with `message` as the handler's cause;
    /// `target` is the `(namespace, workflow_id, run_id)` it started
    pub fn failing_nexus(
        mut self,
        service: &str,
        operation: &str,
        target: Option<(&str, &str, &str)>,
        message: &str,
    ) -> Self {
        let scheduled = self.schedule_nexus(service, operation, target);
        self.push(EventAttributes::NexusOperationFailed {
            scheduled_event_id: scheduled,
            failure: Failure::new("nexus operation completed unsuccessfully")
                .with_cause(Failure::new(message)),
        });
        self
    }

    /// A Nexus operation still in flight, blocked on its endpoint
    pub fn pending_nexus(mut self, service: &str, operation: &str) -> Self {
        let scheduled_time = self.next_time();
        let scheduled = self.schedule_nexus(service, operation, None);
        self.pending_nexus_operations.push(PendingNexusOperationInfo {
            endpoint: format!("{}-endpoint", service.to_lowercase()),
            service: service.to_string(),
            operation: operation.to_string(),
            operation_token: format!("token-{scheduled}"),
            state: PendingNexusOperationState::Blocked,
            attempt: 2,
            scheduled_time: Some(scheduled_time),
            scheduled_event_id: scheduled,
            last_attempt_complete_time: None,
            next_attempt_schedule_time: None,
            last_attempt_failure: Some(Failure::new("endpoint unavailable")),
            blocked_reason: "circuit breaker open".to_string(),
            schedule_to_close_timeout_secs: Some(300),
        });
        self
    }

    /// Add a memo field
    pub fn memo(mut self, key: &str, value: Value) -> Self {
        self.memo.insert(key.to_string(), value);
        self
    }

    /// Add a search attribute
    pub fn search_attribute(mut self, key: &str, value: Value) -> Self {
        self.search_attributes.insert(key.to_string(), value);
        self
    }

    fn close(mut self, status: WorkflowStatus, attributes: EventAttributes) -> Self {
        self.close_time = Some(self.next_time());
        self.status = status;
        self.push(attributes);
        self
    }

    /// Close the run successfully
    pub fn completed(self) -> Self {
        self.close(
            WorkflowStatus::Completed,
            EventAttributes::WorkflowExecutionCompleted {
                result: Some(Value::String("ok".to_string())),
            },
        )
    }

    /// Close the run as failed with `message`
    pub fn failed(self, message: &str) -> Self {
        self.close(
            WorkflowStatus::Failed,
            EventAttributes::WorkflowExecutionFailed {
                failure: Failure::new(message),
            },
        )
    }

    /// Close the run as timed out
    pub fn timed_out(self) -> Self {
        self.close(WorkflowStatus::TimedOut, EventAttributes::WorkflowExecutionTimedOut {})
    }

    /// Close the run as cancelled
    pub fn canceled(self) -> Self {
        self.close(WorkflowStatus::Canceled, EventAttributes::WorkflowExecutionCanceled {})
    }

    /// Close the run as terminated
    pub fn terminated(self, reason: &str) -> Self {
        self.close(
            WorkflowStatus::Terminated,
            EventAttributes::WorkflowExecutionTerminated {
                reason: reason.to_string(),
            },
        )
    }

    /// The history built so far
    pub fn events(&self) -> &[HistoryEvent] {
        &self.events
    }

    /// Finish the run
    pub fn into_fixture(self) -> WorkflowFixture {
        let info = WorkflowExecutionInfo {
            execution: WorkflowExecution::new(&self.workflow_id, &self.run_id),
            workflow_type: self.workflow_type,
            status: self.status,
            start_time: Some(self.base + Duration::seconds(1)),
            close_time: self.close_time,
            task_queue: self.task_queue,
            history_length: self.events.len() as i64,
            memo: self.memo,
            search_attributes: self.search_attributes,
        };
        WorkflowFixture {
            description: WorkflowExecutionDescription {
                info,
                pending_activities: self.pending_activities,
                pending_children: self.pending_children,
                pending_nexus_operations: self.pending_nexus_operations,
            },
            history: self.events,
        }
    }
}
