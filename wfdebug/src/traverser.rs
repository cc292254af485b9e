//! Chain traversal and root-cause selection
//!
//! [`ChainTraverser::trace`] replays a workflow's history, then descends
//! depth-first into every failed child workflow and every failed Nexus
//! operation whose target workflow is known. The chain lists visited
//! workflows in visitation order; the root cause is the deepest failure found,
//! chosen by a fixed precedence.

use crate::client::{client_for, describe_workflow, replay_history, ClientProvider, HistoryEventFilter};
use crate::context::CallContext;
use crate::error::{DiagError, Result};
use crate::state_machine::{HistoryStateMachine, NexusOperationState};
use crate::types::{
    RootCause, RootCauseType, TraceResult, WorkflowChainNode, WorkflowRef, WorkflowStatus,
};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A Nexus target that could not be traced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedBranch {
    /// Target namespace
    pub namespace: String,
    /// Target workflow ID
    pub workflow_id: String,
    /// Target run ID, empty for the latest run
    pub run_id: String,
    /// Depth the target would have had in the chain
    pub depth: usize,
    /// Why tracing the target failed
    pub error: String,
}

/// Callback invoked for every skipped Nexus branch
pub type SkippedBranchCallback = Arc<dyn Fn(&SkippedBranch) + Send + Sync>;

/// Traversal settings
#[derive(Clone, Default)]
pub struct TraverserOptions {
    /// Namespaces, besides the starting one, that may be followed
    pub follow_namespaces: Vec<String>,
    /// Maximum chain length; 0 means unlimited
    pub max_depth: usize,
    /// Told about Nexus branches that were skipped because tracing failed
    pub on_skipped_branch: Option<SkippedBranchCallback>,
}

impl fmt::Debug for TraverserOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraverserOptions")
            .field("follow_namespaces", &self.follow_namespaces)
            .field("max_depth", &self.max_depth)
            .field("on_skipped_branch", &self.on_skipped_branch.is_some())
            .finish()
    }
}

/// Walks parent → child → Nexus target chains to find the deepest failure
///
/// A traverser holds no per-trace state and may be reused; every call to
/// [`ChainTraverser::trace`] starts with an empty visited set.
#[derive(Clone)]
pub struct ChainTraverser {
    provider: Arc<dyn ClientProvider>,
    options: TraverserOptions,
}

type NodeOutcome = (Vec<WorkflowChainNode>, Option<RootCause>);
type VisitFuture<'a> = Pin<Box<dyn Future<Output = Result<NodeOutcome>> + Send + 'a>>;

impl ChainTraverser {
    /// Create a traverser over `provider`
    pub fn new(provider: Arc<dyn ClientProvider>, options: TraverserOptions) -> Self {
        Self { provider, options }
    }

    /// Trace a workflow; `run_id = None` traces the latest run
    ///
    /// History failures on the root node or on any child abort the trace.
    /// Failures while following a Nexus target only drop that branch, except
    /// for cancellation and deadline expiry, which always abort.
    pub async fn trace(
        &self,
        ctx: &CallContext,
        namespace: &str,
        workflow_id: &str,
        run_id: Option<&str>,
    ) -> Result<TraceResult> {
        let run_id = match run_id.filter(|r| !r.is_empty()) {
            Some(run_id) => run_id.to_string(),
            None => {
                let client = client_for(self.provider.as_ref(), ctx, namespace).await?;
                describe_workflow(client.as_ref(), ctx, workflow_id, None)
                    .await?
                    .info
                    .execution
                    .run_id
            }
        };

        let mut walk = Walk {
            traverser: self,
            ctx,
            start_namespace: namespace,
            visited: HashSet::new(),
        };
        let (mut chain, root_cause) = walk
            .visit(namespace.to_string(), workflow_id.to_string(), run_id, 0)
            .await?;

        if let Some(leaf) = chain.last_mut() {
            leaf.is_leaf = true;
        }
        let depth = chain.len().saturating_sub(1);

        tracing::info!(
            "Traced {}/{}: {} workflow(s), root cause: {}",
            namespace,
            workflow_id,
            chain.len(),
            root_cause
                .as_ref()
                .map_or_else(|| "none".to_string(), RootCause::summary)
        );

        Ok(TraceResult {
            chain,
            root_cause,
            depth,
        })
    }
}

/// State of one top-level trace
struct Walk<'a> {
    traverser: &'a ChainTraverser,
    ctx: &'a CallContext,
    start_namespace: &'a str,
    visited: HashSet<(String, String, String)>,
}

impl<'a> Walk<'a> {
    fn can_follow(&self, namespace: &str) -> bool {
        namespace == self.start_namespace
            || self
                .traverser
                .options
                .follow_namespaces
                .iter()
                .any(|ns| ns == namespace)
    }

    fn visit(
        &mut self,
        namespace: String,
        workflow_id: String,
        run_id: String,
        depth: usize,
    ) -> VisitFuture<'_> {
        Box::pin(async move {
            let max_depth = self.traverser.options.max_depth;
            if max_depth > 0 && depth >= max_depth {
                tracing::debug!("Max depth {} reached at {}/{}", max_depth, namespace, workflow_id);
                return Ok((Vec::new(), None));
            }

            let key = (namespace.clone(), workflow_id.clone(), run_id.clone());
            if !self.visited.insert(key) {
                tracing::debug!("Already visited {}/{}/{}", namespace, workflow_id, run_id);
                return Ok((Vec::new(), None));
            }

            tracing::debug!("Tracing {}/{}/{} at depth {}", namespace, workflow_id, run_id, depth);

            let client = client_for(self.traverser.provider.as_ref(), self.ctx, &namespace).await?;
            let mut sm = HistoryStateMachine::new(&namespace);
            let replayed = replay_history(
                client.as_ref(),
                self.ctx,
                &workflow_id,
                &run_id,
                HistoryEventFilter::AllEvents,
                |event| sm.process_event(event),
            )
            .await?;

            tracing::debug!(
                "Replayed {} events for {}/{}: status {}, {} failed activities, {} failed children, {} failed Nexus operations, {} still pending",
                replayed,
                namespace,
                workflow_id,
                sm.status,
                sm.failed_activities.len(),
                sm.failed_children.len(),
                sm.failed_nexus_ops.len(),
                sm.pending_activity_count() + sm.pending_child_count() + sm.pending_nexus_count()
            );

            let run_id = if run_id.is_empty() {
                sm.run_id.clone()
            } else {
                run_id
            };
            let workflow = WorkflowRef::new(&namespace, &workflow_id, Some(run_id.clone()));

            let mut chain = vec![WorkflowChainNode {
                namespace: namespace.clone(),
                workflow_id: workflow_id.clone(),
                run_id,
                workflow_type: sm.workflow_type.clone(),
                status: sm.status,
                is_leaf: false,
                depth,
                start_time: sm.start_time,
                close_time: sm.close_time,
                duration_ms: sm.duration_ms(),
                error: sm.failure_message.clone(),
            }];

            let mut child_cause = None;
            for child in &sm.failed_children {
                if !self.can_follow(&child.namespace) {
                    tracing::debug!(
                        "Not following child {} into namespace {}",
                        child.workflow_id,
                        child.namespace
                    );
                    continue;
                }
                let (sub_chain, cause) = self
                    .visit(
                        child.namespace.clone(),
                        child.workflow_id.clone(),
                        child.run_id.clone(),
                        depth + 1,
                    )
                    .await?;
                chain.extend(sub_chain);
                if child_cause.is_none() {
                    child_cause = cause;
                }
            }

            let mut nexus_cause = None;
            let mut unresolved_nexus: Option<&NexusOperationState> = None;
            for op in &sm.failed_nexus_ops {
                let mut resolved = false;
                if op.has_target() && self.can_follow(&op.namespace) {
                    match self
                        .visit(
                            op.namespace.clone(),
                            op.workflow_id.clone(),
                            op.run_id.clone(),
                            depth + 1,
                        )
                        .await
                    {
                        Ok((sub_chain, cause)) => {
                            chain.extend(sub_chain);
                            if let Some(cause) = cause {
                                resolved = true;
                                nexus_cause.get_or_insert(cause);
                            }
                        }
                        Err(err @ (DiagError::Cancelled { .. } | DiagError::DeadlineExceeded { .. })) => {
                            return Err(err)
                        }
                        Err(err) => self.skip_branch(op, depth + 1, &err),
                    }
                }
                if !resolved && unresolved_nexus.is_none() {
                    unresolved_nexus = Some(op);
                }
            }

            let root_cause = child_cause
                .or(nexus_cause)
                .or_else(|| {
                    sm.failed_activities.first().map(|activity| RootCause {
                        cause_type: RootCauseType::ActivityFailed,
                        activity: Some(activity.activity_type.clone()),
                        error: activity.failure_message.clone(),
                        timestamp: activity.failure_time,
                        workflow: workflow.clone(),
                    })
                })
                .or_else(|| {
                    unresolved_nexus.map(|op| RootCause {
                        cause_type: RootCauseType::NexusOperationFailed,
                        activity: None,
                        error: format!("nexus {}/{}: {}", op.service, op.operation, op.failure_message),
                        timestamp: op.failure_time,
                        workflow: workflow.clone(),
                    })
                })
                .or_else(|| {
                    (!sm.failure_message.is_empty()).then(|| RootCause {
                        cause_type: RootCauseType::WorkflowFailed,
                        activity: None,
                        error: sm.failure_message.clone(),
                        timestamp: sm.close_time,
                        workflow: workflow.clone(),
                    })
                })
                .or_else(|| {
                    (sm.status == WorkflowStatus::TimedOut).then(|| RootCause {
                        cause_type: RootCauseType::Timeout,
                        activity: None,
                        error: "workflow execution timed out".to_string(),
                        timestamp: sm.close_time,
                        workflow: workflow.clone(),
                    })
                });

            Ok((chain, root_cause))
        })
    }

    fn skip_branch(&self, op: &NexusOperationState, depth: usize, err: &DiagError) {
        tracing::warn!(
            "Skipping Nexus target {}/{} of {}/{}: {}",
            op.namespace,
            op.workflow_id,
            op.service,
            op.operation,
            err
        );
        if let Some(ref callback) = self.traverser.options.on_skipped_branch {
            callback(&SkippedBranch {
                namespace: op.namespace.clone(),
                workflow_id: op.workflow_id.clone(),
                run_id: op.run_id.clone(),
                depth,
                error: err.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryClientProvider;
    use crate::test_utils::HistoryBuilder;
    use std::sync::Mutex;

    async fn provider_with(fixtures: Vec<(&str, crate::client::WorkflowFixture)>) -> Arc<InMemoryClientProvider> {
        let provider = InMemoryClientProvider::new();
        for (namespace, fixture) in fixtures {
            provider.insert(namespace, fixture).await;
        }
        Arc::new(provider)
    }

    fn traverser(provider: Arc<InMemoryClientProvider>, options: TraverserOptions) -> ChainTraverser {
        ChainTraverser::new(provider, options)
    }

    #[tokio::test]
    async fn test_child_activity_failure_is_root_cause() {
        let provider = provider_with(vec![
            (
                "default",
                HistoryBuilder::new("order-1", "run-1", "OrderWorkflow")
                    .failing_child("payment-1", "run-2", "PaymentWorkflow", "child workflow execution error")
                    .failed("child workflow execution error")
                    .into_fixture(),
            ),
            (
                "default",
                HistoryBuilder::new("payment-1", "run-2", "PaymentWorkflow")
                    .failing_activity("ChargeCardActivity", "card declined")
                    .failed("activity error")
                    .into_fixture(),
            ),
        ])
        .await;

        let result = traverser(provider, TraverserOptions::default())
            .trace(&CallContext::new(), "default", "order-1", None)
            .await
            .unwrap();

        assert_eq!(result.chain.len(), 2);
        assert_eq!(result.depth, 1);
        assert!(!result.chain[0].is_leaf);
        assert!(result.chain[1].is_leaf);
        assert_eq!(result.chain[1].depth, 1);
        assert_eq!(result.chain[0].run_id, "run-1");

        let cause = result.root_cause.unwrap();
        assert_eq!(cause.cause_type, RootCauseType::ActivityFailed);
        assert_eq!(cause.activity.as_deref(), Some("ChargeCardActivity"));
        assert_eq!(cause.error, "card declined");
        assert_eq!(cause.workflow.workflow_id, "payment-1");
    }

    #[tokio::test]
    async fn test_first_failing_child_wins() {
        let provider = provider_with(vec![
            (
                "default",
                HistoryBuilder::new("parent", "p", "ParentWorkflow")
                    .failing_child("child-a", "a", "ChildWorkflow", "a failed")
                    .failing_child("child-b", "b", "ChildWorkflow", "b failed")
                    .failed("children failed")
                    .into_fixture(),
            ),
            (
                "default",
                HistoryBuilder::new("child-a", "a", "ChildWorkflow").failed("a broke").into_fixture(),
            ),
            (
                "default",
                HistoryBuilder::new("child-b", "b", "ChildWorkflow").failed("b broke").into_fixture(),
            ),
        ])
        .await;

        let result = traverser(provider, TraverserOptions::default())
            .trace(&CallContext::new(), "default", "parent", Some("p"))
            .await
            .unwrap();

        let ids: Vec<_> = result.chain.iter().map(|n| n.workflow_id.as_str()).collect();
        assert_eq!(ids, vec!["parent", "child-a", "child-b"]);
        let cause = result.root_cause.unwrap();
        assert_eq!(cause.cause_type, RootCauseType::WorkflowFailed);
        assert_eq!(cause.error, "a broke");
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        let provider = provider_with(vec![
            (
                "default",
                HistoryBuilder::new("a", "ra", "LoopWorkflow")
                    .failing_child("b", "rb", "LoopWorkflow", "b failed")
                    .failed("b failed")
                    .into_fixture(),
            ),
            (
                "default",
                HistoryBuilder::new("b", "rb", "LoopWorkflow")
                    .failing_child("a", "ra", "LoopWorkflow", "a failed")
                    .failed("a failed")
                    .into_fixture(),
            ),
        ])
        .await;

        let result = traverser(provider, TraverserOptions::default())
            .trace(&CallContext::new(), "default", "a", None)
            .await
            .unwrap();

        let ids: Vec<_> = result.chain.iter().map(|n| n.workflow_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(result.root_cause.unwrap().error, "a failed");
    }

    #[tokio::test]
    async fn test_deep_chain_depths_and_single_leaf() {
        let provider = provider_with(vec![
            (
                "default",
                HistoryBuilder::new("order", "r0", "OrderWorkflow")
                    .failing_child("payment", "r1", "PaymentWorkflow", "payment failed")
                    .failed("payment failed")
                    .into_fixture(),
            ),
            (
                "default",
                HistoryBuilder::new("payment", "r1", "PaymentWorkflow")
                    .failing_child("charge", "r2", "ChargeWorkflow", "charge failed")
                    .failed("charge failed")
                    .into_fixture(),
            ),
            (
                "default",
                HistoryBuilder::new("charge", "r2", "ChargeWorkflow")
                    .failing_child("gateway", "r3", "GatewayWorkflow", "gateway failed")
                    .failed("gateway failed")
                    .into_fixture(),
            ),
            (
                "default",
                HistoryBuilder::new("gateway", "r3", "GatewayWorkflow")
                    .failing_activity("CallGatewayActivity", "connection refused")
                    .failed("activity error")
                    .into_fixture(),
            ),
        ])
        .await;

        let result = traverser(provider, TraverserOptions::default())
            .trace(&CallContext::new(), "default", "order", None)
            .await
            .unwrap();

        let ids: Vec<_> = result.chain.iter().map(|n| n.workflow_id.as_str()).collect();
        assert_eq!(ids, vec!["order", "payment", "charge", "gateway"]);
        assert_eq!(result.depth, 3);
        for (i, node) in result.chain.iter().enumerate() {
            assert_eq!(node.depth, i);
            assert_eq!(node.is_leaf, i == result.chain.len() - 1);
        }
        assert_eq!(result.chain.iter().filter(|n| n.is_leaf).count(), 1);
        let cause = result.root_cause.unwrap();
        assert_eq!(cause.cause_type, RootCauseType::ActivityFailed);
        assert_eq!(cause.workflow.workflow_id, "gateway");
    }

    #[tokio::test]
    async fn test_max_depth_limits_chain() {
        let provider = provider_with(vec![
            (
                "default",
                HistoryBuilder::new("root", "r0", "W")
                    .failing_child("mid", "r1", "W", "mid failed")
                    .failed("mid failed")
                    .into_fixture(),
            ),
            (
                "default",
                HistoryBuilder::new("mid", "r1", "W")
                    .failing_activity("DeepActivity", "deep")
                    .failed("deep")
                    .into_fixture(),
            ),
        ])
        .await;

        let options = TraverserOptions {
            max_depth: 1,
            ..Default::default()
        };
        let result = traverser(provider, options)
            .trace(&CallContext::new(), "default", "root", None)
            .await
            .unwrap();

        assert_eq!(result.chain.len(), 1);
        assert_eq!(result.depth, 0);
        assert!(result.chain[0].is_leaf);
        let cause = result.root_cause.unwrap();
        assert_eq!(cause.cause_type, RootCauseType::WorkflowFailed);
        assert_eq!(cause.error, "mid failed");
    }

    #[tokio::test]
    async fn test_other_namespaces_need_allow_list() {
        let fixtures = || {
            vec![
                (
                    "default",
                    HistoryBuilder::new("root", "r0", "W")
                        .failing_child_in("billing", "invoice", "r1", "InvoiceWorkflow", "invoice failed")
                        .failed("invoice failed")
                        .into_fixture(),
                ),
                (
                    "billing",
                    HistoryBuilder::new("invoice", "r1", "InvoiceWorkflow")
                        .failing_activity("RenderInvoiceActivity", "template missing")
                        .failed("template missing")
                        .into_fixture(),
                ),
            ]
        };

        let result = traverser(provider_with(fixtures()).await, TraverserOptions::default())
            .trace(&CallContext::new(), "default", "root", None)
            .await
            .unwrap();
        assert_eq!(result.chain.len(), 1);

        let options = TraverserOptions {
            follow_namespaces: vec!["billing".to_string()],
            ..Default::default()
        };
        let result = traverser(provider_with(fixtures()).await, options)
            .trace(&CallContext::new(), "default", "root", None)
            .await
            .unwrap();
        assert_eq!(result.chain.len(), 2);
        assert_eq!(result.chain[1].namespace, "billing");
        assert_eq!(result.root_cause.unwrap().error, "template missing");
    }

    #[tokio::test]
    async fn test_nexus_target_is_followed() {
        let provider = provider_with(vec![
            (
                "default",
                HistoryBuilder::new("checkout", "c1", "CheckoutWorkflow")
                    .failing_nexus("PaymentService", "Charge", Some(("default", "charge-1", "x1")), "declined")
                    .failed("nexus failed")
                    .into_fixture(),
            ),
            (
                "default",
                HistoryBuilder::new("charge-1", "x1", "ChargeWorkflow")
                    .failing_activity("ChargeCardActivity", "insufficient funds")
                    .failed("activity error")
                    .into_fixture(),
            ),
        ])
        .await;

        let result = traverser(provider, TraverserOptions::default())
            .trace(&CallContext::new(), "default", "checkout", None)
            .await
            .unwrap();

        assert_eq!(result.chain.len(), 2);
        let cause = result.root_cause.unwrap();
        assert_eq!(cause.cause_type, RootCauseType::ActivityFailed);
        assert_eq!(cause.error, "insufficient funds");
    }

    #[tokio::test]
    async fn test_unreachable_nexus_target_is_reported_and_skipped() {
        let provider = provider_with(vec![
            (
                "default",
                HistoryBuilder::new("checkout", "c1", "CheckoutWorkflow")
                    .failing_nexus("PaymentService", "Charge", Some(("payments", "charge-1", "x1")), "declined")
                    .failed("nexus failed")
                    .into_fixture(),
            ),
            (
                "payments",
                HistoryBuilder::new("charge-1", "x1", "ChargeWorkflow").failed("hidden").into_fixture(),
            ),
        ])
        .await;
        provider.deny_namespace("payments").await;

        let skipped = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&skipped);
        let options = TraverserOptions {
            follow_namespaces: vec!["payments".to_string()],
            on_skipped_branch: Some(Arc::new(move |branch: &SkippedBranch| {
                sink.lock().unwrap().push(branch.clone());
            })),
            ..Default::default()
        };

        let result = traverser(provider, options)
            .trace(&CallContext::new(), "default", "checkout", None)
            .await
            .unwrap();

        assert_eq!(result.chain.len(), 1);
        let cause = result.root_cause.unwrap();
        assert_eq!(cause.cause_type, RootCauseType::NexusOperationFailed);
        assert_eq!(cause.error, "nexus PaymentService/Charge: declined");

        let skipped = skipped.lock().unwrap();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].namespace, "payments");
        assert_eq!(skipped[0].depth, 1);
        assert!(skipped[0].error.contains("permission denied"));
    }

    #[tokio::test]
    async fn test_child_history_failure_aborts_trace() {
        let provider = provider_with(vec![
            (
                "default",
                HistoryBuilder::new("parent", "p", "W")
                    .failing_child("child", "c", "W", "child failed")
                    .failed("child failed")
                    .into_fixture(),
            ),
            ("default", HistoryBuilder::new("child", "c", "W").failed("x").into_fixture()),
        ])
        .await;
        provider.fail_history("child").await;

        let err = traverser(provider, TraverserOptions::default())
            .trace(&CallContext::new(), "default", "parent", None)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("failed to get history event"));
    }

    #[tokio::test]
    async fn test_timeout_and_healthy_workflows() {
        let provider = provider_with(vec![
            ("default", HistoryBuilder::new("slow", "s", "W").timed_out().into_fixture()),
            ("default", HistoryBuilder::new("fine", "f", "W").activity("AActivity").completed().into_fixture()),
        ])
        .await;
        let traverser = traverser(provider, TraverserOptions::default());

        let slow = traverser
            .trace(&CallContext::new(), "default", "slow", None)
            .await
            .unwrap();
        let cause = slow.root_cause.unwrap();
        assert_eq!(cause.cause_type, RootCauseType::Timeout);
        assert_eq!(cause.error, "workflow execution timed out");

        let fine = traverser
            .trace(&CallContext::new(), "default", "fine", None)
            .await
            .unwrap();
        assert!(fine.root_cause.is_none());
        assert_eq!(fine.chain[0].status, WorkflowStatus::Completed);
        assert!(fine.chain[0].duration_ms > 0);
    }

    #[tokio::test]
    async fn test_reused_traverser_does_not_remember_visits() {
        let provider = provider_with(vec![(
            "default",
            HistoryBuilder::new("w", "r", "W").failed("boom").into_fixture(),
        )])
        .await;
        let traverser = traverser(provider, TraverserOptions::default());

        for _ in 0..2 {
            let result = traverser
                .trace(&CallContext::new(), "default", "w", Some("r"))
                .await
                .unwrap();
            assert_eq!(result.chain.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let provider = provider_with(vec![(
            "default",
            HistoryBuilder::new("w", "r", "W").completed().into_fixture(),
        )])
        .await;

        let err = traverser(provider, TraverserOptions::default())
            .trace(&CallContext::new(), "default", "nope", None)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("failed to describe workflow"));
    }
}
