//! Workflow timeline tool

use crate::client::client_for;
use crate::error::Result;
use crate::mermaid::timeline_to_mermaid;
use crate::timeline::{TimelineGenerator, TimelineOptions};
use crate::tools::types::GetWorkflowTimelineRequest;
use crate::tools::{parameters_schema, parse_arguments, render, require, DiagnosticTool, ToolContext};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Tool for building a workflow's event timeline
#[derive(Default)]
pub struct GetWorkflowTimelineTool;

impl GetWorkflowTimelineTool {
    /// Creates a new instance of the GetWorkflowTimelineTool
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DiagnosticTool for GetWorkflowTimelineTool {
    fn name(&self) -> &'static str {
        "get_workflow_timeline"
    }

    fn description(&self) -> &'static str {
        include_str!("description.md")
    }

    fn schema(&self) -> Value {
        parameters_schema::<GetWorkflowTimelineRequest>()
    }

    async fn execute(&self, arguments: Map<String, Value>, context: &ToolContext) -> Result<String> {
        let request: GetWorkflowTimelineRequest = parse_arguments(arguments)?;
        require("namespace", &request.namespace)?;
        require("workflow_id", &request.workflow_id)?;

        let client = client_for(context.provider.as_ref(), &context.call, &request.namespace).await?;
        let generator = TimelineGenerator::new(
            client,
            TimelineOptions {
                compact: request.compact,
                include_payloads: request.include_payloads,
                event_types: request.event_types,
                exclude_event_types: request.exclude_event_types,
            },
        );
        let result = generator
            .generate(&context.call, &request.workflow_id, request.run_id.as_deref())
            .await?;
        render(request.format, &result, timeline_to_mermaid)
    }
}
