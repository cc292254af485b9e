//! Flat, filterable timelines of one workflow run
//!
//! Every history event becomes a [`TimelineEvent`] with a category, a name and,
//! for terminal events, the time since the matching schedule or start event.

use crate::client::{describe_workflow, replay_history, HistoryEventFilter, WorkflowClient};
use crate::context::CallContext;
use crate::error::Result;
use crate::history::{EventAttributes, HistoryEvent};
use crate::types::{EventCategory, TimelineEvent, TimelineResult, WorkflowRef, WorkflowStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Timeline settings
#[derive(Debug, Clone, Default)]
pub struct TimelineOptions {
    /// Drop uncategorized events and count activity failures per type
    pub compact: bool,
    /// Attach inputs and results
    pub include_payloads: bool,
    /// Keep only events whose type or category is listed; empty keeps all
    pub event_types: Vec<String>,
    /// Drop events whose type or category is listed
    pub exclude_event_types: Vec<String>,
}

impl TimelineOptions {
    fn includes(&self, event: &TimelineEvent) -> bool {
        let matches = |filter: &String| {
            filter == &event.event_type || filter == event.category.as_str()
        };
        if !self.event_types.is_empty() && !self.event_types.iter().any(matches) {
            return false;
        }
        !self.exclude_event_types.iter().any(matches)
    }
}

/// Builds timelines from one namespace's client
#[derive(Clone)]
pub struct TimelineGenerator {
    client: Arc<dyn WorkflowClient>,
    options: TimelineOptions,
}

impl TimelineGenerator {
    /// Create a generator; the client fixes the namespace
    pub fn new(client: Arc<dyn WorkflowClient>, options: TimelineOptions) -> Self {
        Self { client, options }
    }

    /// Build the timeline of a run; `run_id = None` uses the latest run
    pub async fn generate(
        &self,
        ctx: &CallContext,
        workflow_id: &str,
        run_id: Option<&str>,
    ) -> Result<TimelineResult> {
        let namespace = self.client.namespace().to_string();
        let run_id = match run_id.filter(|r| !r.is_empty()) {
            Some(run_id) => run_id.to_string(),
            None => {
                describe_workflow(self.client.as_ref(), ctx, workflow_id, None)
                    .await?
                    .info
                    .execution
                    .run_id
            }
        };

        let mut fold = TimelineFold::new(&namespace, &self.options);
        let events_read = replay_history(
            self.client.as_ref(),
            ctx,
            workflow_id,
            &run_id,
            HistoryEventFilter::AllEvents,
            |event| fold.process_event(event),
        )
        .await?;

        let duration_ms = match (fold.start_time, fold.close_time) {
            (Some(start), Some(close)) => (close - start).num_milliseconds(),
            _ => 0,
        };

        tracing::info!(
            "Timeline for {}/{}: {} of {} events",
            namespace,
            workflow_id,
            fold.events.len(),
            events_read
        );

        let TimelineFold {
            workflow_type,
            status,
            start_time,
            close_time,
            events,
            ..
        } = fold;
        Ok(TimelineResult {
            workflow: WorkflowRef::new(namespace, workflow_id, Some(run_id)),
            workflow_type,
            status,
            start_time,
            close_time,
            duration_ms,
            event_count: events.len(),
            events,
        })
    }
}

#[derive(Debug, Clone)]
struct ScheduledActivity {
    activity_type: String,
    activity_id: String,
    scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct InitiatedChild {
    workflow_type: String,
    workflow: WorkflowRef,
    initiated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct ScheduledNexus {
    name: String,
    scheduled_at: DateTime<Utc>,
}

/// Correlation state for one replay
struct TimelineFold<'a> {
    namespace: &'a str,
    options: &'a TimelineOptions,
    workflow_type: String,
    status: WorkflowStatus,
    start_time: Option<DateTime<Utc>>,
    close_time: Option<DateTime<Utc>>,
    events: Vec<TimelineEvent>,
    activities: HashMap<i64, ScheduledActivity>,
    timers: HashMap<i64, DateTime<Utc>>,
    children: HashMap<i64, InitiatedChild>,
    nexus_ops: HashMap<i64, ScheduledNexus>,
    activity_failures: HashMap<String, usize>,
}

fn millis_since(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_milliseconds()
}

impl<'a> TimelineFold<'a> {
    fn new(namespace: &'a str, options: &'a TimelineOptions) -> Self {
        Self {
            namespace,
            options,
            workflow_type: String::new(),
            status: WorkflowStatus::Unspecified,
            start_time: None,
            close_time: None,
            events: Vec::new(),
            activities: HashMap::new(),
            timers: HashMap::new(),
            children: HashMap::new(),
            nexus_ops: HashMap::new(),
            activity_failures: HashMap::new(),
        }
    }

    fn payload(&self, value: &Option<serde_json::Value>) -> Option<serde_json::Value> {
        if self.options.include_payloads {
            value.clone()
        } else {
            None
        }
    }

    fn close(&mut self, status: WorkflowStatus, at: DateTime<Utc>) {
        self.status = status;
        self.close_time = Some(at);
    }

    fn with_activity(&self, entry: &mut TimelineEvent, scheduled_event_id: i64) {
        if let Some(activity) = self.activities.get(&scheduled_event_id) {
            entry.name = activity.activity_type.clone();
            entry.activity_id = activity.activity_id.clone();
        }
    }

    fn with_child(&self, entry: &mut TimelineEvent, initiated_event_id: i64) {
        if let Some(child) = self.children.get(&initiated_event_id) {
            entry.name = child.workflow_type.clone();
            entry.child_workflow = Some(child.workflow.clone());
        }
    }

    fn with_nexus(&self, entry: &mut TimelineEvent, scheduled_event_id: i64, closing: bool) {
        if let Some(op) = self.nexus_ops.get(&scheduled_event_id) {
            entry.name = op.name.clone();
            if closing {
                entry.duration_ms = millis_since(op.scheduled_at, entry.timestamp);
            }
        }
    }

    fn process_event(&mut self, event: &HistoryEvent) {
        let at = event.event_time;
        let category = category_of(&event.attributes);
        if self.options.compact && category == EventCategory::Other {
            return;
        }

        let mut entry = TimelineEvent::new(at, event.event_id, event.event_type(), category);

        match &event.attributes {
            EventAttributes::WorkflowExecutionStarted {
                workflow_type,
                input,
                ..
            } => {
                entry.status = "started".to_string();
                entry.name = workflow_type.clone();
                entry.input = self.payload(input);
                self.workflow_type = workflow_type.clone();
                self.status = WorkflowStatus::Running;
                self.start_time = Some(at);
            }
            EventAttributes::WorkflowExecutionCompleted { result } => {
                entry.status = "completed".to_string();
                entry.result = self.payload(result);
                self.close(WorkflowStatus::Completed, at);
            }
            EventAttributes::WorkflowExecutionFailed { failure } => {
                entry.status = "failed".to_string();
                entry.error = failure.message.clone();
                self.close(WorkflowStatus::Failed, at);
            }
            EventAttributes::WorkflowExecutionTimedOut {} => {
                entry.status = "timed_out".to_string();
                entry.error = "workflow execution timed out".to_string();
                self.close(WorkflowStatus::TimedOut, at);
            }
            EventAttributes::WorkflowExecutionCanceled {} => {
                entry.status = "canceled".to_string();
                self.close(WorkflowStatus::Canceled, at);
            }
            EventAttributes::WorkflowExecutionTerminated { reason } => {
                entry.status = "terminated".to_string();
                entry.error = reason.clone();
                self.close(WorkflowStatus::Terminated, at);
            }
            EventAttributes::WorkflowExecutionContinuedAsNew { .. } => {
                entry.status = "continued_as_new".to_string();
                self.close(WorkflowStatus::ContinuedAsNew, at);
            }
            EventAttributes::WorkflowExecutionSignaled { signal_name, input } => {
                entry.status = "received".to_string();
                entry.name = signal_name.clone();
                entry.input = self.payload(input);
            }

            EventAttributes::ActivityTaskScheduled {
                activity_id,
                activity_type,
                input,
            } => {
                entry.status = "scheduled".to_string();
                entry.name = activity_type.clone();
                entry.activity_id = activity_id.clone();
                entry.input = self.payload(input);
                self.activities.insert(
                    event.event_id,
                    ScheduledActivity {
                        activity_type: activity_type.clone(),
                        activity_id: activity_id.clone(),
                        scheduled_at: at,
                    },
                );
            }
            EventAttributes::ActivityTaskStarted {
                scheduled_event_id,
                attempt,
            } => {
                entry.status = "started".to_string();
                entry.attempt = *attempt;
                self.with_activity(&mut entry, *scheduled_event_id);
            }
            EventAttributes::ActivityTaskCompleted {
                scheduled_event_id,
                result,
            } => {
                entry.status = "completed".to_string();
                entry.result = self.payload(result);
                self.with_activity(&mut entry, *scheduled_event_id);
                if let Some(activity) = self.activities.get(scheduled_event_id) {
                    entry.duration_ms = millis_since(activity.scheduled_at, at);
                }
            }
            EventAttributes::ActivityTaskFailed {
                scheduled_event_id,
                failure,
            } => {
                entry.status = "failed".to_string();
                entry.error = failure.message.clone();
                self.with_activity(&mut entry, *scheduled_event_id);
                if self.options.compact && !entry.name.is_empty() {
                    let failures = self.activity_failures.entry(entry.name.clone()).or_default();
                    *failures += 1;
                    entry.retry_count = *failures;
                }
            }
            EventAttributes::ActivityTaskTimedOut {
                scheduled_event_id,
                failure,
            } => {
                entry.status = "timed_out".to_string();
                entry.error = failure
                    .as_ref()
                    .map_or_else(|| "activity timed out".to_string(), |f| f.message.clone());
                self.with_activity(&mut entry, *scheduled_event_id);
            }
            EventAttributes::ActivityTaskCanceled { scheduled_event_id } => {
                entry.status = "canceled".to_string();
                self.with_activity(&mut entry, *scheduled_event_id);
            }

            EventAttributes::TimerStarted { timer_id } => {
                entry.status = "started".to_string();
                entry.name = timer_id.clone();
                self.timers.insert(event.event_id, at);
            }
            EventAttributes::TimerFired {
                timer_id,
                started_event_id,
            } => {
                entry.status = "fired".to_string();
                entry.name = timer_id.clone();
                if let Some(started) = self.timers.get(started_event_id) {
                    entry.duration_ms = millis_since(*started, at);
                }
            }
            EventAttributes::TimerCanceled { timer_id, .. } => {
                entry.status = "canceled".to_string();
                entry.name = timer_id.clone();
            }

            EventAttributes::StartChildWorkflowExecutionInitiated {
                namespace,
                workflow_id,
                workflow_type,
                input,
            } => {
                let namespace = if namespace.is_empty() {
                    self.namespace
                } else {
                    namespace.as_str()
                };
                let workflow = WorkflowRef::new(namespace, workflow_id.as_str(), None);
                entry.status = "initiated".to_string();
                entry.name = workflow_type.clone();
                entry.input = self.payload(input);
                entry.child_workflow = Some(workflow.clone());
                self.children.insert(
                    event.event_id,
                    InitiatedChild {
                        workflow_type: workflow_type.clone(),
                        workflow,
                        initiated_at: at,
                    },
                );
            }
            EventAttributes::ChildWorkflowExecutionStarted {
                initiated_event_id,
                workflow_execution,
            } => {
                entry.status = "started".to_string();
                if let Some(child) = self.children.get_mut(initiated_event_id) {
                    child.workflow.run_id =
                        Some(workflow_execution.run_id.clone()).filter(|r| !r.is_empty());
                }
                self.with_child(&mut entry, *initiated_event_id);
            }
            EventAttributes::ChildWorkflowExecutionCompleted {
                initiated_event_id,
                result,
                ..
            } => {
                entry.status = "completed".to_string();
                entry.result = self.payload(result);
                self.with_child(&mut entry, *initiated_event_id);
                if let Some(child) = self.children.get(initiated_event_id) {
                    entry.duration_ms = millis_since(child.initiated_at, at);
                }
            }
            EventAttributes::ChildWorkflowExecutionFailed {
                initiated_event_id,
                failure,
                ..
            } => {
                entry.status = "failed".to_string();
                entry.error = failure.message.clone();
                self.with_child(&mut entry, *initiated_event_id);
            }
            EventAttributes::ChildWorkflowExecutionTimedOut {
                initiated_event_id, ..
            } => {
                entry.status = "timed_out".to_string();
                entry.error = "child workflow timed out".to_string();
                self.with_child(&mut entry, *initiated_event_id);
            }
            EventAttributes::ChildWorkflowExecutionCanceled {
                initiated_event_id, ..
            } => {
                entry.status = "canceled".to_string();
                self.with_child(&mut entry, *initiated_event_id);
            }
            EventAttributes::ChildWorkflowExecutionTerminated {
                initiated_event_id, ..
            } => {
                entry.status = "terminated".to_string();
                self.with_child(&mut entry, *initiated_event_id);
            }

            EventAttributes::NexusOperationScheduled {
                service,
                operation,
                input,
                ..
            } => {
                let name = format!("{service}/{operation}");
                entry.status = "scheduled".to_string();
                entry.name = name.clone();
                entry.input = self.payload(input);
                self.nexus_ops.insert(
                    event.event_id,
                    ScheduledNexus {
                        name,
                        scheduled_at: at,
                    },
                );
            }
            EventAttributes::NexusOperationStarted {
                scheduled_event_id, ..
            } => {
                entry.status = "started".to_string();
                self.with_nexus(&mut entry, *scheduled_event_id, false);
            }
            EventAttributes::NexusOperationCompleted {
                scheduled_event_id,
                result,
            } => {
                entry.status = "completed".to_string();
                entry.result = self.payload(result);
                self.with_nexus(&mut entry, *scheduled_event_id, true);
            }
            EventAttributes::NexusOperationFailed {
                scheduled_event_id,
                failure,
            } => {
                entry.status = "failed".to_string();
                entry.error = failure
                    .cause
                    .as_deref()
                    .map_or_else(|| failure.message.clone(), |cause| cause.message.clone());
                self.with_nexus(&mut entry, *scheduled_event_id, true);
            }
            EventAttributes::NexusOperationCanceled { scheduled_event_id } => {
                entry.status = "canceled".to_string();
                self.with_nexus(&mut entry, *scheduled_event_id, true);
            }
            EventAttributes::NexusOperationTimedOut {
                scheduled_event_id,
                failure,
            } => {
                entry.status = "timed_out".to_string();
                entry.error = failure
                    .as_ref()
                    .map_or_else(|| "nexus operation timed out".to_string(), |f| f.message.clone());
                self.with_nexus(&mut entry, *scheduled_event_id, true);
            }

            EventAttributes::Other { .. } => {}
        }

        if self.options.includes(&entry) {
            self.events.push(entry);
        }
    }
}

fn category_of(attributes: &EventAttributes) -> EventCategory {
    match attributes {
        EventAttributes::WorkflowExecutionStarted { .. }
        | EventAttributes::WorkflowExecutionCompleted { .. }
        | EventAttributes::WorkflowExecutionFailed { .. }
        | EventAttributes::WorkflowExecutionTimedOut {}
        | EventAttributes::WorkflowExecutionCanceled {}
        | EventAttributes::WorkflowExecutionTerminated { .. }
        | EventAttributes::WorkflowExecutionContinuedAsNew { .. } => EventCategory::Workflow,
        EventAttributes::WorkflowExecutionSignaled { .. } => EventCategory::Signal,
        EventAttributes::ActivityTaskScheduled { .. }
        | EventAttributes::ActivityTaskStarted { .. }
        | EventAttributes::ActivityTaskCompleted { .. }
        | EventAttributes::ActivityTaskFailed { .. }
        | EventAttributes::ActivityTaskTimedOut { .. }
        | EventAttributes::ActivityTaskCanceled { .. } => EventCategory::Activity,
        EventAttributes::TimerStarted { .. }
        | EventAttributes::TimerFired { .. }
        | EventAttributes::TimerCanceled { .. } => EventCategory::Timer,
        EventAttributes::StartChildWorkflowExecutionInitiated { .. }
        | EventAttributes::ChildWorkflowExecutionStarted { .. }
        | EventAttributes::ChildWorkflowExecutionCompleted { .. }
        | EventAttributes::ChildWorkflowExecutionFailed { .. }
        | EventAttributes::ChildWorkflowExecutionTimedOut { .. }
        | EventAttributes::ChildWorkflowExecutionCanceled { .. }
        | EventAttributes::ChildWorkflowExecutionTerminated { .. } => EventCategory::ChildWorkflow,
        EventAttributes::NexusOperationScheduled { .. }
        | EventAttributes::NexusOperationStarted { .. }
        | EventAttributes::NexusOperationCompleted { .. }
        | EventAttributes::NexusOperationFailed { .. }
        | EventAttributes::NexusOperationCanceled { .. }
        | EventAttributes::NexusOperationTimedOut { .. } => EventCategory::Nexus,
        EventAttributes::Other { .. } => EventCategory::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientProvider, InMemoryClientProvider};
    use crate::test_utils::HistoryBuilder;

    async fn generator(fixture: crate::client::WorkflowFixture, options: TimelineOptions) -> TimelineGenerator {
        let provider = InMemoryClientProvider::new();
        provider.insert("default", fixture).await;
        let client = provider.get_client("default").await.unwrap();
        TimelineGenerator::new(client, options)
    }

    fn retrying_order() -> crate::client::WorkflowFixture {
        HistoryBuilder::new("order-1", "run-1", "OrderWorkflow")
            .other("WorkflowTaskScheduled")
            .failing_activity("ChargeCardActivity", "gateway timeout")
            .failing_activity("ChargeCardActivity", "gateway timeout")
            .activity("ChargeCardActivity")
            .timer("cooldown")
            .signal("cancel-requested")
            .child("receipt-1", "rr", "ReceiptWorkflow")
            .nexus("ShippingService", "Book")
            .completed()
            .into_fixture()
    }

    #[tokio::test]
    async fn test_full_timeline() {
        let fixture = retrying_order();
        let history_len = fixture.history.len();
        let timeline = generator(fixture, TimelineOptions::default())
            .await
            .generate(&CallContext::new(), "order-1", None)
            .await
            .unwrap();

        assert_eq!(timeline.workflow.run_id.as_deref(), Some("run-1"));
        assert_eq!(timeline.workflow_type, "OrderWorkflow");
        assert_eq!(timeline.status, WorkflowStatus::Completed);
        assert_eq!(timeline.event_count, history_len);
        assert_eq!(timeline.events.len(), history_len);
        assert!(timeline.duration_ms > 0);

        let other = timeline
            .events
            .iter()
            .find(|e| e.category == EventCategory::Other)
            .unwrap();
        assert_eq!(other.event_type, "WorkflowTaskScheduled");

        let completed = timeline
            .events
            .iter()
            .find(|e| e.event_type == "ActivityTaskCompleted")
            .unwrap();
        assert_eq!(completed.name, "ChargeCardActivity");
        assert_eq!(completed.duration_ms, 2000);
        assert!(completed.result.is_none());

        let fired = timeline
            .events
            .iter()
            .find(|e| e.event_type == "TimerFired")
            .unwrap();
        assert_eq!(fired.name, "cooldown");
        assert_eq!(fired.duration_ms, 1000);

        let child = timeline
            .events
            .iter()
            .find(|e| e.event_type == "ChildWorkflowExecutionCompleted")
            .unwrap();
        let child_ref = child.child_workflow.as_ref().unwrap();
        assert_eq!(child_ref.namespace, "default");
        assert_eq!(child_ref.run_id.as_deref(), Some("rr"));

        let nexus = timeline
            .events
            .iter()
            .find(|e| e.event_type == "NexusOperationCompleted")
            .unwrap();
        assert_eq!(nexus.category, EventCategory::Nexus);
        assert_eq!(nexus.name, "ShippingService/Book");
        assert_eq!(nexus.duration_ms, 2000);
    }

    #[tokio::test]
    async fn test_compact_counts_retries_and_drops_other() {
        let timeline = generator(
            retrying_order(),
            TimelineOptions {
                compact: true,
                ..Default::default()
            },
        )
        .await
        .generate(&CallContext::new(), "order-1", Some("run-1"))
        .await
        .unwrap();

        assert!(timeline.events.iter().all(|e| e.category != EventCategory::Other));
        let retries: Vec<_> = timeline
            .events
            .iter()
            .filter(|e| e.event_type == "ActivityTaskFailed")
            .map(|e| e.retry_count)
            .collect();
        assert_eq!(retries, vec![1, 2]);
        assert_eq!(timeline.event_count, timeline.events.len());
    }

    #[tokio::test]
    async fn test_include_then_exclude_filters() {
        let timeline = generator(
            retrying_order(),
            TimelineOptions {
                event_types: vec!["activity".to_string(), "TimerFired".to_string()],
                exclude_event_types: vec!["ActivityTaskStarted".to_string()],
                ..Default::default()
            },
        )
        .await
        .generate(&CallContext::new(), "order-1", None)
        .await
        .unwrap();

        assert!(timeline.events.iter().all(|e| {
            (e.category == EventCategory::Activity || e.event_type == "TimerFired")
                && e.event_type != "ActivityTaskStarted"
        }));
        assert!(timeline.events.iter().any(|e| e.event_type == "TimerFired"));
        // status still follows the close event even though it was filtered out
        assert_eq!(timeline.status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn test_event_count_matches_filtered_events() {
        let fixture = HistoryBuilder::new("order-1", "run-1", "OrderWorkflow")
            .other("WorkflowTaskScheduled")
            .failing_activity("ChargeCardActivity", "card declined")
            .completed()
            .into_fixture();
        let history_len = fixture.history.len();
        let timeline = generator(
            fixture,
            TimelineOptions {
                event_types: vec!["activity".to_string()],
                ..Default::default()
            },
        )
        .await
        .generate(&CallContext::new(), "order-1", None)
        .await
        .unwrap();

        assert_eq!(timeline.events.len(), 3);
        assert_eq!(timeline.event_count, timeline.events.len());
        assert!(timeline.event_count < history_len);
    }

    #[tokio::test]
    async fn test_payloads_only_when_requested() {
        let timeline = generator(
            retrying_order(),
            TimelineOptions {
                include_payloads: true,
                ..Default::default()
            },
        )
        .await
        .generate(&CallContext::new(), "order-1", None)
        .await
        .unwrap();

        let started = &timeline.events[0];
        assert_eq!(started.event_type, "WorkflowExecutionStarted");
        assert!(started.input.is_some());
        let completed = timeline
            .events
            .iter()
            .find(|e| e.event_type == "ActivityTaskCompleted")
            .unwrap();
        assert!(completed.result.is_some());
    }

    #[tokio::test]
    async fn test_failed_run_timeline() {
        let fixture = HistoryBuilder::new("w", "r", "W")
            .timed_out_activity("SlowActivity")
            .failing_nexus("PaymentService", "Charge", None, "declined")
            .failed("gave up")
            .into_fixture();
        let timeline = generator(fixture, TimelineOptions::default())
            .await
            .generate(&CallContext::new(), "w", None)
            .await
            .unwrap();

        assert_eq!(timeline.status, WorkflowStatus::Failed);
        let errors: Vec<_> = timeline
            .events
            .iter()
            .filter(|e| !e.error.is_empty())
            .map(|e| e.error.as_str())
            .collect();
        assert_eq!(errors, vec!["activity timed out", "declined", "gave up"]);
    }
}
