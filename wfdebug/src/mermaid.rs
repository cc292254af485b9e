//! Mermaid diagram rendering
//!
//! Projects trace, timeline, state and failures results into Mermaid text:
//! flowcharts for chains and pending work, a sequence diagram for timelines
//! and a pie chart for grouped failures.

use crate::types::{
    EventCategory, FailuresResult, TimelineEvent, TimelineResult, TraceResult,
    WorkflowChainNode, WorkflowStateResult, WorkflowStatus,
};
use std::collections::HashSet;
use std::fmt::Write;

/// Failure chains shown before the listing diagram is cut short
pub const MAX_FAILURE_CHAINS: usize = 10;

const MAX_PARTICIPANT_LEN: usize = 20;

/// Shorten to at most `max_chars` characters, ending in `...` when cut
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Text safe inside a quoted label or a message
fn label_text(s: &str) -> String {
    s.replace('"', "'").replace(['\n', '\r'], " ").replace(';', ",")
}

/// Participant identifiers allow word characters only
fn participant_id(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .take(MAX_PARTICIPANT_LEN)
        .collect()
}

fn status_icon(status: WorkflowStatus) -> &'static str {
    match status {
        WorkflowStatus::Running => "🔄",
        WorkflowStatus::Completed => "✅",
        WorkflowStatus::Failed => "❌",
        WorkflowStatus::TimedOut => "⏱️",
        WorkflowStatus::Canceled => "🚫",
        WorkflowStatus::Terminated => "⛔",
        WorkflowStatus::ContinuedAsNew => "➡️",
        WorkflowStatus::Unspecified => "❓",
    }
}

fn node_class(status: WorkflowStatus) -> &'static str {
    match status {
        WorkflowStatus::Failed | WorkflowStatus::TimedOut => ":::failed",
        WorkflowStatus::Completed => ":::success",
        WorkflowStatus::Running => ":::running",
        _ => "",
    }
}

fn node_label(node: &WorkflowChainNode) -> String {
    let workflow_type = if node.workflow_type.is_empty() {
        "Workflow"
    } else {
        node.workflow_type.as_str()
    };
    let mut label = format!(
        "{} {}<br/>{}",
        status_icon(node.status),
        label_text(&truncate(workflow_type, 20)),
        node.status
    );
    if node.is_leaf {
        label.push_str("<br/>🎯 LEAF");
    }
    label
}

/// Flowchart of a failure chain, ending in the root cause
pub fn trace_to_mermaid(result: &TraceResult) -> String {
    if result.chain.is_empty() {
        return "graph TD\n    A[No workflows in chain]".to_string();
    }

    let mut out = String::from("graph TD\n");
    out.push_str("    classDef failed fill:#ff8787,stroke:#e03131\n");
    out.push_str("    classDef success fill:#8ce99a,stroke:#37b24d\n");
    out.push_str("    classDef running fill:#74c0fc,stroke:#1c7ed6\n");

    for (i, node) in result.chain.iter().enumerate() {
        let _ = writeln!(
            out,
            "    W{}[\"{}\"]{}",
            i,
            node_label(node),
            node_class(node.status)
        );
    }

    for (i, next) in result.chain.iter().enumerate().skip(1) {
        if next.status.is_failure() {
            let _ = writeln!(out, "    W{} -->|failed| W{}", i - 1, i);
        } else {
            let _ = writeln!(out, "    W{} --> W{}", i - 1, i);
        }
    }

    if let Some(root_cause) = &result.root_cause {
        let label = match root_cause.activity.as_deref() {
            Some(activity) if !activity.is_empty() => format!(
                "{}<br/>{}",
                label_text(activity),
                label_text(&truncate(&root_cause.error, 30))
            ),
            _ => label_text(&truncate(&root_cause.error, 40)),
        };
        let _ = writeln!(out, "    RC(((\"{label}\")))");
        let _ = writeln!(out, "    W{} -.->|root cause| RC", result.chain.len() - 1);
        out.push_str("    style RC fill:#ff6b6b,stroke:#c92a2a,color:#fff\n");
    }

    out
}

fn participant_for(event: &TimelineEvent) -> Option<String> {
    if event.name.is_empty() {
        return None;
    }
    match event.category {
        EventCategory::Activity | EventCategory::ChildWorkflow => Some(participant_id(&event.name)),
        EventCategory::Nexus => Some(participant_id(&format!("Nexus:{}", event.name))),
        EventCategory::Timer => Some("Timer".to_string()),
        _ => None,
    }
}

fn sequence_line(event: &TimelineEvent) -> Option<String> {
    let error = if event.error.is_empty() {
        "failed".to_string()
    } else {
        label_text(&truncate(&event.error, 30))
    };

    if matches!(event.category, EventCategory::Workflow | EventCategory::Signal) {
        let note = match event.status.as_str() {
            "started" => format!("{} started", label_text(&event.name)),
            "completed" => "✅ Completed".to_string(),
            "failed" => format!("❌ {error}"),
            "timed_out" => "⏱️ Timeout".to_string(),
            "canceled" => "🚫 Canceled".to_string(),
            "terminated" => "⛔ Terminated".to_string(),
            "continued_as_new" => "➡️ Continued as new".to_string(),
            "received" => format!("📨 Signal: {}", label_text(&event.name)),
            _ => return None,
        };
        return Some(format!("Note over Workflow: {note}"));
    }

    let participant = participant_for(event)?;
    let line = match (event.category, event.status.as_str()) {
        (EventCategory::Timer, "started") => {
            format!("Workflow->>Timer: Start {}", label_text(&event.name))
        }
        (EventCategory::Timer, "fired") => {
            format!("Timer-->>Workflow: ⏰ {}", label_text(&event.name))
        }
        (_, "scheduled") | (_, "initiated") => format!("Workflow->>{participant}: Start"),
        (_, "completed") => format!("{participant}-->>Workflow: ✅ Done"),
        (_, "failed") => format!("{participant}--xWorkflow: ❌ {error}"),
        (_, "timed_out") => format!("{participant}--xWorkflow: ⏱️ Timeout"),
        (_, "canceled") => format!("{participant}--xWorkflow: 🚫 Canceled"),
        (_, "terminated") => format!("{participant}--xWorkflow: ⛔ Terminated"),
        _ => return None,
    };
    Some(line)
}

/// Sequence diagram of a timeline; participants appear in first-use order
pub fn timeline_to_mermaid(result: &TimelineResult) -> String {
    if result.events.is_empty() {
        return "sequenceDiagram\n    Note over Workflow: No events".to_string();
    }

    let mut out = String::from("sequenceDiagram\n    participant Workflow\n");
    let mut seen: HashSet<String> = HashSet::from(["Workflow".to_string()]);
    for participant in result.events.iter().filter_map(participant_for) {
        if seen.insert(participant.clone()) {
            let _ = writeln!(out, "    participant {participant}");
        }
    }

    for line in result.events.iter().filter_map(sequence_line) {
        let _ = writeln!(out, "    {line}");
    }

    out
}

/// Flowchart of a workflow and its pending work
pub fn state_to_mermaid(result: &WorkflowStateResult) -> String {
    let mut out = String::from("graph TD\n");
    let _ = writeln!(
        out,
        "    WF[\"{} {}<br/>{}\"]",
        status_icon(result.status),
        label_text(&result.workflow_type),
        result.status
    );

    let mut counter = 0;
    let mut next_id = |prefix: char| {
        let id = format!("{prefix}{counter}");
        counter += 1;
        id
    };

    if !result.pending_activities.is_empty() {
        out.push_str("    subgraph Activities[\"Pending Activities\"]\n");
        let mut edges = Vec::new();
        for activity in &result.pending_activities {
            let id = next_id('A');
            let mut label = format!(
                "{}<br/>attempt {}",
                label_text(&activity.activity_type),
                activity.attempt
            );
            if !activity.last_failure.is_empty() {
                let _ = write!(label, "<br/>❌ {}", label_text(&truncate(&activity.last_failure, 30)));
            }
            let _ = writeln!(out, "        {id}[\"{label}\"]");
            edges.push(id);
        }
        out.push_str("    end\n");
        for id in edges {
            let _ = writeln!(out, "    WF --> {id}");
        }
    }

    if !result.pending_child_workflows.is_empty() {
        out.push_str("    subgraph Children[\"Pending Child Workflows\"]\n");
        let mut edges = Vec::new();
        for child in &result.pending_child_workflows {
            let id = next_id('C');
            let _ = writeln!(
                out,
                "        {id}[\"{}<br/>{}\"]",
                label_text(&child.workflow_type),
                label_text(&truncate(&child.workflow_id, 20))
            );
            edges.push(id);
        }
        out.push_str("    end\n");
        for id in edges {
            let _ = writeln!(out, "    WF --> {id}");
        }
    }

    if !result.pending_nexus_operations.is_empty() {
        out.push_str("    subgraph Nexus[\"Pending Nexus Operations\"]\n");
        let mut edges = Vec::new();
        for op in &result.pending_nexus_operations {
            let id = next_id('N');
            let mut label = format!(
                "{}.{}<br/>{}",
                label_text(&op.service),
                label_text(&op.operation),
                op.state
            );
            if !op.last_failure.is_empty() {
                let _ = write!(label, "<br/>❌ {}", label_text(&truncate(&op.last_failure, 30)));
            }
            let _ = writeln!(out, "        {id}[\"{label}\"]");
            edges.push(id);
        }
        out.push_str("    end\n");
        for id in edges {
            let _ = writeln!(out, "    WF --> {id}");
        }
    }

    let style = match result.status {
        WorkflowStatus::Running => Some("fill:#74c0fc,stroke:#1c7ed6"),
        WorkflowStatus::Completed => Some("fill:#8ce99a,stroke:#37b24d"),
        WorkflowStatus::Failed | WorkflowStatus::TimedOut => Some("fill:#ff8787,stroke:#e03131"),
        WorkflowStatus::Canceled => Some("fill:#ffd43b,stroke:#f59f00"),
        _ => None,
    };
    if let Some(style) = style {
        let _ = writeln!(out, "    style WF {style}");
    }

    out
}

/// Pie chart of grouped failures, or a flowchart of individual chains
pub fn failures_to_mermaid(result: &FailuresResult) -> String {
    match result {
        FailuresResult::Grouped {
            groups, grouped_by, ..
        } if !groups.is_empty() => {
            let mut out = format!("pie title Failures by {grouped_by}\n");
            for group in groups {
                let _ = writeln!(
                    out,
                    "    \"{}\" : {}",
                    label_text(&truncate(&group.key, 30)),
                    group.count
                );
            }
            out
        }
        FailuresResult::Listing { failures, .. } if !failures.is_empty() => {
            let mut out = String::from("graph LR\n");
            for (i, failure) in failures.iter().take(MAX_FAILURE_CHAINS).enumerate() {
                let root_cause = label_text(&truncate(&failure.root_cause, 25));
                let _ = writeln!(
                    out,
                    "    F{i}_root[\"{}\"]",
                    label_text(&truncate(&failure.root_workflow.workflow_id, 15))
                );
                match &failure.leaf_failure {
                    Some(leaf) if failure.depth > 0 => {
                        let _ = writeln!(
                            out,
                            "    F{i}_leaf[\"{}\"]",
                            label_text(&truncate(&leaf.workflow_id, 15))
                        );
                        let _ = writeln!(out, "    F{i}_root -->|depth {}| F{i}_leaf", failure.depth);
                        let _ = writeln!(out, "    F{i}_rc((\"{root_cause}\"))");
                        let _ = writeln!(out, "    F{i}_leaf -.-> F{i}_rc");
                    }
                    _ => {
                        let _ = writeln!(out, "    F{i}_rc((\"{root_cause}\"))");
                        let _ = writeln!(out, "    F{i}_root -.-> F{i}_rc");
                    }
                }
            }
            if failures.len() > MAX_FAILURE_CHAINS {
                let _ = writeln!(
                    out,
                    "    MORE[+{} more...]",
                    failures.len() - MAX_FAILURE_CHAINS
                );
            }
            out
        }
        _ => "graph TD\n    A[No failures found]".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        FailureGroup, FailureReport, PendingActivity, PendingNexusOperation, RootCause,
        RootCauseType, WorkflowRef,
    };
    use chrono::Utc;

    fn node(workflow_type: &str, status: WorkflowStatus, is_leaf: bool) -> WorkflowChainNode {
        WorkflowChainNode {
            namespace: "default".to_string(),
            workflow_id: format!("{}-1", workflow_type.to_lowercase()),
            run_id: "r".to_string(),
            workflow_type: workflow_type.to_string(),
            status,
            is_leaf,
            depth: 0,
            start_time: None,
            close_time: None,
            duration_ms: 0,
            error: String::new(),
        }
    }

    fn report(id: &str, depth: usize) -> FailureReport {
        FailureReport {
            root_workflow: WorkflowRef::new("default", id, None),
            leaf_failure: (depth > 0).then(|| WorkflowRef::new("default", format!("{id}-leaf"), None)),
            depth,
            root_cause: "ActivityFailed: ChargeCardActivity - card declined".to_string(),
            chain: Vec::new(),
            timestamp: Some(Utc::now()),
            status: WorkflowStatus::Failed,
            workflow_type: "OrderWorkflow".to_string(),
        }
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
        assert_eq!(truncate("ééééééééé", 6), "ééé...");
    }

    #[test]
    fn test_participant_id_sanitizes() {
        assert_eq!(participant_id("Nexus:Shipping.Book"), "Nexus_Shipping_Book");
        assert_eq!(participant_id("a-very-long-activity-type-name").len(), 20);
    }

    #[test]
    fn test_trace_to_mermaid() {
        let trace = TraceResult {
            chain: vec![
                node("OrderWorkflow", WorkflowStatus::Failed, false),
                node("PaymentWorkflow", WorkflowStatus::Failed, true),
            ],
            root_cause: Some(RootCause {
                cause_type: RootCauseType::ActivityFailed,
                activity: Some("ChargeCardActivity".to_string()),
                error: "card declined".to_string(),
                timestamp: None,
                workflow: WorkflowRef::new("default", "payment-1", None),
            }),
            depth: 1,
        };

        let diagram = trace_to_mermaid(&trace);
        assert!(diagram.starts_with("graph TD\n"));
        assert!(diagram.contains("W0[\"❌ OrderWorkflow<br/>Failed\"]:::failed"));
        assert!(diagram.contains("🎯 LEAF"));
        assert!(diagram.contains("W0 -->|failed| W1"));
        assert!(diagram.contains("RC(((\"ChargeCardActivity<br/>card declined\")))"));
        assert!(diagram.contains("W1 -.->|root cause| RC"));
    }

    #[test]
    fn test_empty_trace() {
        assert_eq!(
            trace_to_mermaid(&TraceResult::default()),
            "graph TD\n    A[No workflows in chain]"
        );
    }

    #[test]
    fn test_timeline_participants_in_first_appearance_order() {
        let now = Utc::now();
        let event = |id: i64, event_type: &str, category, name: &str, status: &str| {
            let mut e = TimelineEvent::new(now, id, event_type, category);
            e.name = name.to_string();
            e.status = status.to_string();
            e
        };
        let timeline = TimelineResult {
            workflow: WorkflowRef::new("default", "w", None),
            workflow_type: "W".to_string(),
            status: WorkflowStatus::Failed,
            start_time: None,
            close_time: None,
            duration_ms: 0,
            events: vec![
                event(1, "WorkflowExecutionStarted", EventCategory::Workflow, "W", "started"),
                event(2, "ActivityTaskScheduled", EventCategory::Activity, "Zeta", "scheduled"),
                event(3, "TimerStarted", EventCategory::Timer, "t1", "started"),
                event(4, "ActivityTaskScheduled", EventCategory::Activity, "Alpha", "scheduled"),
                event(5, "ActivityTaskFailed", EventCategory::Activity, "Alpha", "failed"),
                event(6, "TimerFired", EventCategory::Timer, "t1", "fired"),
                event(7, "NexusOperationCompleted", EventCategory::Nexus, "Svc/Op", "completed"),
            ],
            event_count: 7,
        };

        let diagram = timeline_to_mermaid(&timeline);
        let zeta = diagram.find("participant Zeta").unwrap();
        let timer = diagram.find("participant Timer").unwrap();
        let alpha = diagram.find("participant Alpha").unwrap();
        assert!(zeta < timer && timer < alpha);
        assert!(diagram.contains("participant Nexus_Svc_Op"));
        assert!(diagram.contains("Note over Workflow: W started"));
        assert!(diagram.contains("Workflow->>Zeta: Start"));
        assert!(diagram.contains("Alpha--xWorkflow: ❌ failed"));
        assert!(diagram.contains("Timer-->>Workflow: ⏰ t1"));
        assert!(diagram.contains("Nexus_Svc_Op-->>Workflow: ✅ Done"));
    }

    #[test]
    fn test_state_to_mermaid() {
        let state = WorkflowStateResult {
            workflow: WorkflowRef::new("default", "w", None),
            workflow_type: "OrderWorkflow".to_string(),
            status: WorkflowStatus::Running,
            start_time: None,
            close_time: None,
            is_running: true,
            pending_activities: vec![PendingActivity {
                activity_id: "5".to_string(),
                activity_type: "ChargeCardActivity".to_string(),
                state: "Started".to_string(),
                attempt: 3,
                max_attempts: 5,
                scheduled_time: None,
                last_started_time: None,
                last_failure: "connection reset".to_string(),
            }],
            pending_activity_count: 1,
            pending_child_workflows: Vec::new(),
            pending_child_workflow_count: 0,
            pending_nexus_operations: vec![PendingNexusOperation {
                endpoint: "e".to_string(),
                service: "Shipping".to_string(),
                operation: "Book".to_string(),
                operation_token: String::new(),
                state: "Blocked".to_string(),
                attempt: 1,
                scheduled_time: None,
                scheduled_event_id: 9,
                last_attempt_complete_time: None,
                next_attempt_schedule_time: None,
                last_failure: String::new(),
                blocked_reason: String::new(),
                schedule_to_close_timeout_sec: 0,
            }],
            pending_nexus_operation_count: 1,
            task_queue: "main".to_string(),
            history_length: 10,
            memo: None,
            search_attributes: None,
        };

        let diagram = state_to_mermaid(&state);
        assert!(diagram.contains("WF[\"🔄 OrderWorkflow<br/>Running\"]"));
        assert!(diagram.contains("A0[\"ChargeCardActivity<br/>attempt 3<br/>❌ connection reset\"]"));
        assert!(diagram.contains("N1[\"Shipping.Book<br/>Blocked\"]"));
        assert!(!diagram.contains("Pending Child Workflows"));
        assert!(diagram.contains("WF --> A0"));
        assert!(diagram.ends_with("style WF fill:#74c0fc,stroke:#1c7ed6\n"));
    }

    #[test]
    fn test_failures_pie_chart() {
        let result = FailuresResult::Grouped {
            groups: vec![FailureGroup {
                key: "card \"declined\"".to_string(),
                count: 3,
                percentage: 100.0,
                sample: report("order-1", 0),
                first_seen: None,
                last_seen: None,
            }],
            total_count: 3,
            query: String::new(),
            grouped_by: "error".to_string(),
        };

        let diagram = failures_to_mermaid(&result);
        assert!(diagram.starts_with("pie title Failures by error\n"));
        assert!(diagram.contains("\"card 'declined'\" : 3"));
    }

    #[test]
    fn test_failures_listing_is_capped() {
        let failures: Vec<_> = (0..12).map(|i| report(&format!("order-{i}"), i % 2)).collect();
        let result = FailuresResult::Listing {
            total_count: failures.len(),
            failures,
            query: String::new(),
        };

        let diagram = failures_to_mermaid(&result);
        assert!(diagram.starts_with("graph LR\n"));
        assert!(diagram.contains("F0_root -.-> F0_rc"));
        assert!(diagram.contains("F1_root -->|depth 1| F1_leaf"));
        assert!(!diagram.contains("F10_root"));
        assert!(diagram.contains("MORE[+2 more...]"));
    }

    #[test]
    fn test_no_failures() {
        let result = FailuresResult::Listing {
            failures: Vec::new(),
            total_count: 0,
            query: String::new(),
        };
        assert_eq!(failures_to_mermaid(&result), "graph TD\n    A[No failures found]");
    }
}
