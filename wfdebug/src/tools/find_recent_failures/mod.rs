//! Recent failure search tool

use crate::common::parse_duration;
use crate::error::{DiagError, Result};
use crate::failures::{FailuresFinder, FailuresOptions};
use crate::mermaid::failures_to_mermaid;
use crate::tools::types::FindRecentFailuresRequest;
use crate::tools::{parameters_schema, parse_arguments, render, require, DiagnosticTool, ToolContext};
use crate::types::WorkflowStatus;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Tool for finding and explaining recent failures
#[derive(Default)]
pub struct FindRecentFailuresTool;

impl FindRecentFailuresTool {
    /// Creates a new instance of the FindRecentFailuresTool
    pub fn new() -> Self {
        Self
    }
}

fn parse_statuses(raw: &str) -> Result<Vec<WorkflowStatus>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match WorkflowStatus::parse(s) {
            WorkflowStatus::Unspecified => Err(DiagError::InvalidArgument(format!(
                "invalid status '{s}'"
            ))),
            status => Ok(status),
        })
        .collect()
}

#[async_trait]
impl DiagnosticTool for FindRecentFailuresTool {
    fn name(&self) -> &'static str {
        "find_recent_failures"
    }

    fn description(&self) -> &'static str {
        include_str!("description.md")
    }

    fn schema(&self) -> Value {
        parameters_schema::<FindRecentFailuresRequest>()
    }

    async fn execute(&self, arguments: Map<String, Value>, context: &ToolContext) -> Result<String> {
        let request: FindRecentFailuresRequest = parse_arguments(arguments)?;
        require("namespace", &request.namespace)?;

        let options = FailuresOptions {
            since: parse_duration(&request.since).map_err(DiagError::InvalidArgument)?,
            statuses: parse_statuses(&request.status)?,
            follow_children: request.follow_children,
            follow_namespaces: context.follow_namespaces.clone(),
            max_depth: request.max_depth,
            limit: request.limit,
            error_contains: request.error_contains.filter(|s| !s.is_empty()),
            leaf_only: request.leaf_only,
            compact_errors: request.compact_errors,
            group_by: request.group_by,
        };

        let result = FailuresFinder::new(context.provider.clone(), options)
            .find_failures(&context.call, &request.namespace)
            .await?;
        render(request.format, &result, failures_to_mermaid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryClientProvider;
    use crate::context::CallContext;
    use crate::test_utils::HistoryBuilder;
    use serde_json::json;
    use std::sync::Arc;

    async fn context() -> ToolContext {
        let provider = InMemoryClientProvider::new();
        provider
            .insert(
                "default",
                HistoryBuilder::new("order-1", "run-1", "OrderWorkflow")
                    .failing_activity("ChargeCardActivity", "card declined")
                    .failed("activity error")
                    .into_fixture(),
            )
            .await;
        provider
            .insert(
                "default",
                HistoryBuilder::new("order-2", "run-2", "OrderWorkflow")
                    .timed_out()
                    .into_fixture(),
            )
            .await;
        ToolContext::new(Arc::new(provider), CallContext::new())
    }

    fn arguments(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_parse_statuses() {
        assert_eq!(
            parse_statuses("Failed, TimedOut").unwrap(),
            vec![WorkflowStatus::Failed, WorkflowStatus::TimedOut]
        );
        assert!(parse_statuses("").unwrap().is_empty());
        assert!(parse_statuses("Failed,Exploded").is_err());
    }

    #[tokio::test]
    async fn test_listing_as_json() {
        let output = FindRecentFailuresTool::new()
            .execute(arguments(json!({ "namespace": "default" })), &context().await)
            .await
            .unwrap();

        let result: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(result["total_count"], 2);
        let causes: Vec<&str> = result["failures"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["root_cause"].as_str().unwrap())
            .collect();
        assert!(causes.contains(&"ActivityFailed: ChargeCardActivity - card declined"));
        assert!(causes.contains(&"Timeout: workflow execution timed out"));
    }

    #[tokio::test]
    async fn test_grouped_as_mermaid() {
        let output = FindRecentFailuresTool::new()
            .execute(
                arguments(json!({
                    "namespace": "default",
                    "group_by": "status",
                    "format": "mermaid"
                })),
                &context().await,
            )
            .await
            .unwrap();

        assert!(output.starts_with("pie title Failures by status\n"));
        assert!(output.contains("\"Failed\" : 1"));
        assert!(output.contains("\"TimedOut\" : 1"));
    }

    #[tokio::test]
    async fn test_max_depth_bounds_followed_chains() {
        let provider = InMemoryClientProvider::new();
        for fixture in [
            HistoryBuilder::new("root", "r0", "OrderWorkflow")
                .failing_child("mid", "r1", "PaymentWorkflow", "payment failed")
                .failed("payment failed")
                .into_fixture(),
            HistoryBuilder::new("mid", "r1", "PaymentWorkflow")
                .failing_child("leaf", "r2", "ChargeWorkflow", "charge failed")
                .failed("charge failed")
                .into_fixture(),
            HistoryBuilder::new("leaf", "r2", "ChargeWorkflow")
                .failing_activity("ChargeCardActivity", "card declined")
                .failed("activity error")
                .into_fixture(),
        ] {
            provider.insert("default", fixture).await;
        }
        let ctx = ToolContext::new(Arc::new(provider), CallContext::new());

        for (max_depth, expected) in [
            (1, vec!["root"]),
            (2, vec!["root", "mid"]),
            (0, vec!["root", "mid", "leaf"]),
        ] {
            let output = FindRecentFailuresTool::new()
                .execute(
                    arguments(json!({
                        "namespace": "default",
                        "follow_children": true,
                        "max_depth": max_depth
                    })),
                    &ctx,
                )
                .await
                .unwrap();

            let result: Value = serde_json::from_str(&output).unwrap();
            let root = result["failures"]
                .as_array()
                .unwrap()
                .iter()
                .find(|f| f["root_workflow"]["workflow_id"] == "root")
                .unwrap()
                .clone();
            let chain: Vec<&str> = root["chain"]
                .as_array()
                .unwrap()
                .iter()
                .map(|id| id.as_str().unwrap())
                .collect();
            assert_eq!(chain, expected, "max_depth {max_depth}");
            assert_eq!(root["depth"].as_u64().unwrap_or(0), expected.len() as u64 - 1);
        }
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let tool = FindRecentFailuresTool::new();
        let ctx = context().await;

        for bad in [
            json!({ "namespace": "" }),
            json!({ "namespace": "default", "since": "soon" }),
            json!({ "namespace": "default", "status": "Sleeping" }),
            json!({ "namespace": "default", "group_by": "color" }),
        ] {
            let err = tool.execute(arguments(bad.clone()), &ctx).await.unwrap_err();
            assert!(matches!(err, DiagError::InvalidArgument(_)), "{bad}");
        }
    }
}
