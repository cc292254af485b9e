//! Workflow state tool

use crate::client::client_for;
use crate::error::Result;
use crate::mermaid::state_to_mermaid;
use crate::state::{StateExtractor, StateOptions};
use crate::tools::types::GetWorkflowStateRequest;
use crate::tools::{parameters_schema, parse_arguments, render, require, DiagnosticTool, ToolContext};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Tool for describing what a workflow is waiting on
#[derive(Default)]
pub struct GetWorkflowStateTool;

impl GetWorkflowStateTool {
    /// Creates a new instance of the GetWorkflowStateTool
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DiagnosticTool for GetWorkflowStateTool {
    fn name(&self) -> &'static str {
        "get_workflow_state"
    }

    fn description(&self) -> &'static str {
        include_str!("description.md")
    }

    fn schema(&self) -> Value {
        parameters_schema::<GetWorkflowStateRequest>()
    }

    async fn execute(&self, arguments: Map<String, Value>, context: &ToolContext) -> Result<String> {
        let request: GetWorkflowStateRequest = parse_arguments(arguments)?;
        require("namespace", &request.namespace)?;
        require("workflow_id", &request.workflow_id)?;

        let client = client_for(context.provider.as_ref(), &context.call, &request.namespace).await?;
        let extractor = StateExtractor::new(
            client,
            StateOptions {
                include_details: request.include_details,
            },
        );
        let result = extractor
            .get_state(&context.call, &request.workflow_id, request.run_id.as_deref())
            .await?;
        render(request.format, &result, state_to_mermaid)
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

    #[tokio::test]
    async fn test_state_with_details() {
        let provider = InMemoryClientProvider::new();
        provider
            .insert(
                "default",
                HistoryBuilder::new("order-1", "run-1", "OrderWorkflow")
                    .pending_nexus("ShippingService", "Book")
                    .memo("customer", json!("c-42"))
                    .into_fixture(),
            )
            .await;
        let ctx = ToolContext::new(Arc::new(provider), CallContext::new());
        let args = json!({ "namespace": "default", "workflow_id": "order-1", "include_details": true });

        let output = GetWorkflowStateTool::new()
            .execute(args.as_object().cloned().unwrap(), &ctx)
            .await
            .unwrap();

        let result: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(result["is_running"], true);
        assert_eq!(result["pending_nexus_operation_count"], 1);
        assert_eq!(result["pending_nexus_operations"][0]["blocked_reason"], "circuit breaker open");
        assert_eq!(result["memo"]["customer"], "c-42");
    }
}
