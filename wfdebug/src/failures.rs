//! Recent failure discovery
//!
//! [`FailuresFinder::find_failures`] lists closed workflows matching a status
//! and close-time query, traces each one for its root cause and returns either
//! a flat listing or groups.

use crate::client::{
    client_for, ClientProvider, ListWorkflowsPage, ListWorkflowsRequest, WorkflowClient,
};
use crate::compact::{compact_error, compact_error_with_context};
use crate::context::CallContext;
use crate::error::{DiagError, Result};
use crate::traverser::{ChainTraverser, TraverserOptions};
use crate::types::{FailureGroup, FailureReport, FailuresResult, WorkflowRef, WorkflowStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// How failure reports are aggregated
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    /// Flat listing
    #[default]
    None,
    /// By workflow type
    Type,
    /// By namespace of the leaf failure
    Namespace,
    /// By workflow status
    Status,
    /// By compacted root-cause message
    Error,
}

impl GroupBy {
    /// Name used in results and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Type => "type",
            Self::Namespace => "namespace",
            Self::Status => "status",
            Self::Error => "error",
        }
    }

    fn key(&self, report: &FailureReport) -> String {
        let leaf_or_root = report.leaf_failure.as_ref().unwrap_or(&report.root_workflow);
        match self {
            Self::Type => report.workflow_type.clone(),
            Self::Namespace => leaf_or_root.namespace.clone(),
            Self::Status => report.status.to_string(),
            Self::Error => compact_error(&report.root_cause),
            Self::None => "unknown".to_string(),
        }
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupBy {
    type Err = DiagError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "none" => Ok(Self::None),
            "type" => Ok(Self::Type),
            "namespace" => Ok(Self::Namespace),
            "status" => Ok(Self::Status),
            "error" => Ok(Self::Error),
            other => Err(DiagError::InvalidArgument(format!(
                "invalid group_by '{other}': expected none, type, namespace, status or error"
            ))),
        }
    }
}

/// Failure search settings
#[derive(Debug, Clone)]
pub struct FailuresOptions {
    /// Only workflows closed within this window; zero disables the bound
    pub since: Duration,
    /// Statuses to match; empty means `Failed` and `TimedOut`
    pub statuses: Vec<WorkflowStatus>,
    /// Trace into failed children and Nexus targets
    pub follow_children: bool,
    /// Namespaces, besides the queried one, that tracing may enter
    pub follow_namespaces: Vec<String>,
    /// Maximum chain length when following children; 0 means unlimited
    pub max_depth: usize,
    /// Maximum number of reports; 0 means unlimited
    pub limit: usize,
    /// Case-insensitive substring the root cause must contain
    pub error_contains: Option<String>,
    /// Drop workflows that failed because a descendant failed
    pub leaf_only: bool,
    /// Compact root-cause messages
    pub compact_errors: bool,
    /// Aggregation mode
    pub group_by: GroupBy,
}

impl Default for FailuresOptions {
    fn default() -> Self {
        Self {
            since: Duration::from_secs(3600),
            statuses: Vec::new(),
            follow_children: false,
            follow_namespaces: Vec::new(),
            max_depth: 0,
            limit: 50,
            error_contains: None,
            leaf_only: false,
            compact_errors: false,
            group_by: GroupBy::None,
        }
    }
}

/// Finds and explains recent workflow failures in a namespace
#[derive(Clone)]
pub struct FailuresFinder {
    provider: Arc<dyn ClientProvider>,
    options: FailuresOptions,
}

impl FailuresFinder {
    /// Create a finder over `provider`
    pub fn new(provider: Arc<dyn ClientProvider>, options: FailuresOptions) -> Self {
        Self { provider, options }
    }

    /// Visibility query for closes after `now - since`
    pub fn build_query_at(&self, now: DateTime<Utc>) -> String {
        let statuses: &[WorkflowStatus] = if self.options.statuses.is_empty() {
            &[WorkflowStatus::Failed, WorkflowStatus::TimedOut]
        } else {
            &self.options.statuses
        };

        let mut parts = Vec::new();
        let status_clause = statuses
            .iter()
            .map(|s| format!("ExecutionStatus = \"{s}\""))
            .collect::<Vec<_>>()
            .join(" OR ");
        parts.push(format!("({status_clause})"));

        if !self.options.since.is_zero() {
            let cutoff = chrono::Duration::from_std(self.options.since)
                .ok()
                .and_then(|since| now.checked_sub_signed(since))
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            parts.push(format!(
                "CloseTime > \"{}\"",
                cutoff.to_rfc3339_opts(SecondsFormat::Secs, true)
            ));
        }

        parts.join(" AND ")
    }

    /// Visibility query for closes within the window ending now
    pub fn build_query(&self) -> String {
        self.build_query_at(Utc::now())
    }

    fn traverser(&self) -> ChainTraverser {
        // without follow_children only the listed workflow itself is replayed
        let max_depth = if self.options.follow_children {
            self.options.max_depth
        } else {
            1
        };
        ChainTraverser::new(
            Arc::clone(&self.provider),
            TraverserOptions {
                follow_namespaces: self.options.follow_namespaces.clone(),
                max_depth,
                on_skipped_branch: None,
            },
        )
    }

    /// Find failures in `namespace`
    ///
    /// Listing errors abort the search. A workflow that cannot be traced is
    /// still reported, with `failed to trace: <error>` as its root cause,
    /// unless the error is cancellation or deadline expiry.
    pub async fn find_failures(&self, ctx: &CallContext, namespace: &str) -> Result<FailuresResult> {
        let client = client_for(self.provider.as_ref(), ctx, namespace).await?;
        let query = self.build_query();
        tracing::debug!("Failure query for {}: {}", namespace, query);

        let traverser = self.traverser();
        let limit = self.options.limit;
        let leaf_only = self.options.leaf_only;
        let error_filter = self
            .options
            .error_contains
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut failures = Vec::new();
        let mut parents = HashSet::new();
        let mut request = ListWorkflowsRequest {
            query: query.clone(),
            next_page_token: None,
        };

        'pages: loop {
            let page = list_page(client.as_ref(), ctx, &request).await?;

            for execution in page.executions {
                if !leaf_only && limit > 0 && failures.len() >= limit {
                    break 'pages;
                }

                let workflow_id = execution.execution.workflow_id.clone();
                let run_id = execution.execution.run_id.clone();
                let mut report = FailureReport {
                    root_workflow: WorkflowRef::new(namespace, &workflow_id, Some(run_id.clone())),
                    leaf_failure: None,
                    depth: 0,
                    root_cause: String::new(),
                    chain: vec![workflow_id.clone()],
                    timestamp: execution.close_time,
                    status: execution.status,
                    workflow_type: execution.workflow_type.clone(),
                };

                match traverser.trace(ctx, namespace, &workflow_id, Some(&run_id)).await {
                    Ok(trace) => {
                        report.depth = trace.depth;
                        report.chain = trace.chain.iter().map(|n| n.workflow_id.clone()).collect();
                        if let Some(ref cause) = trace.root_cause {
                            report.root_cause = cause.summary();
                            report.leaf_failure = trace.leaf().map(|leaf| {
                                WorkflowRef::new(
                                    &leaf.namespace,
                                    &leaf.workflow_id,
                                    Some(leaf.run_id.clone()),
                                )
                            });
                        }
                        if leaf_only && trace.chain.len() > 1 {
                            for node in &trace.chain[..trace.chain.len() - 1] {
                                parents.insert(node.workflow_id.clone());
                            }
                        }
                    }
                    Err(err @ (DiagError::Cancelled { .. } | DiagError::DeadlineExceeded { .. })) => {
                        return Err(err)
                    }
                    Err(err) => {
                        tracing::warn!("Failed to trace {}/{}: {}", namespace, workflow_id, err);
                        report.root_cause = format!("failed to trace: {err}");
                    }
                }

                if let Some(ref needle) = error_filter {
                    if !report.root_cause.to_lowercase().contains(needle) {
                        continue;
                    }
                }

                if self.options.compact_errors && !report.root_cause.is_empty() {
                    report.root_cause = compact_error_with_context(&report.root_cause);
                }

                failures.push(report);
            }

            if !leaf_only && limit > 0 && failures.len() >= limit {
                break;
            }
            match page.next_page_token {
                Some(token) if !token.is_empty() => request.next_page_token = Some(token),
                _ => break,
            }
        }

        if leaf_only {
            let collected = failures.len();
            failures.retain(|report: &FailureReport| !parents.contains(&report.root_workflow.workflow_id));
            if limit > 0 {
                failures.truncate(limit);
            }
            tracing::debug!(
                "Leaf-only filter kept {} of {} failures",
                failures.len(),
                collected
            );
        }

        tracing::info!("Found {} failure(s) in namespace {}", failures.len(), namespace);

        let total_count = failures.len();
        if self.options.group_by == GroupBy::None {
            return Ok(FailuresResult::Listing {
                failures,
                total_count,
                query,
            });
        }

        Ok(FailuresResult::Grouped {
            groups: group_failures(self.options.group_by, failures),
            total_count,
            query,
            grouped_by: self.options.group_by.to_string(),
        })
    }
}

async fn list_page(
    client: &dyn WorkflowClient,
    ctx: &CallContext,
    request: &ListWorkflowsRequest,
) -> Result<ListWorkflowsPage> {
    ctx.call("list workflows", client.list_workflow_executions(request))
        .await
}

/// Aggregate reports by `group_by`, largest group first, ties by key
pub fn group_failures(group_by: GroupBy, failures: Vec<FailureReport>) -> Vec<FailureGroup> {
    let total = failures.len();
    let mut groups: Vec<FailureGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for report in failures {
        let key = group_by.key(&report);
        match index.get(&key) {
            Some(&i) => {
                let group = &mut groups[i];
                group.count += 1;
                if let Some(ts) = report.timestamp {
                    if group.first_seen.map_or(true, |first| ts < first) {
                        group.first_seen = Some(ts);
                    }
                    if group.last_seen.map_or(true, |last| ts > last) {
                        group.last_seen = Some(ts);
                    }
                }
            }
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(FailureGroup {
                    key,
                    count: 1,
                    percentage: 0.0,
                    first_seen: report.timestamp,
                    last_seen: report.timestamp,
                    sample: report,
                });
            }
        }
    }

    for group in &mut groups {
        group.percentage = group.count as f64 / total as f64 * 100.0;
    }
    groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    groups
}
