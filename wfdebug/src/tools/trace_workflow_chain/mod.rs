//! Failure chain tracing tool

use crate::error::Result;
use crate::mermaid::trace_to_mermaid;
use crate::tools::types::TraceWorkflowChainRequest;
use crate::tools::{parameters_schema, parse_arguments, render, require, DiagnosticTool, ToolContext};
use crate::traverser::{ChainTraverser, TraverserOptions};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Tool for tracing a workflow to its deepest failure
#[derive(Default)]
pub struct TraceWorkflowChainTool;

impl TraceWorkflowChainTool {
    /// Creates a new instance of the TraceWorkflowChainTool
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DiagnosticTool for TraceWorkflowChainTool {
    fn name(&self) -> &'static str {
        "trace_workflow_chain"
    }

    fn description(&self) -> &'static str {
        include_str!("description.md")
    }

    fn schema(&self) -> Value {
        parameters_schema::<TraceWorkflowChainRequest>()
    }

    async fn execute(&self, arguments: Map<String, Value>, context: &ToolContext) -> Result<String> {
        let request: TraceWorkflowChainRequest = parse_arguments(arguments)?;
        require("namespace", &request.namespace)?;
        require("workflow_id", &request.workflow_id)?;

        let traverser = ChainTraverser::new(
            context.provider.clone(),
            TraverserOptions {
                follow_namespaces: context.follow_namespaces.clone(),
                max_depth: request.max_depth,
                on_skipped_branch: None,
            },
        );
        let result = traverser
            .trace(
                &context.call,
                &request.namespace,
                &request.workflow_id,
                request.run_id.as_deref(),
            )
            .await?;
        render(request.format, &result, trace_to_mermaid)
    }
}
