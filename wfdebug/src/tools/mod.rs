//! Agent-facing diagnostic tools
//!
//! Every tool is a [`DiagnosticTool`] registered in a [`ToolRegistry`]. The
//! registry executes tool calls (a name plus JSON arguments) and exports the
//! tool definitions in the shapes common agent frameworks expect.

use crate::client::ClientProvider;
use crate::context::CallContext;
use crate::error::{DiagError, Result};
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub mod find_recent_failures;
pub mod get_workflow_state;
pub mod get_workflow_timeline;
pub mod trace_workflow_chain;
pub mod types;

pub use find_recent_failures::FindRecentFailuresTool;
pub use get_workflow_state::GetWorkflowStateTool;
pub use get_workflow_timeline::GetWorkflowTimelineTool;
pub use trace_workflow_chain::TraceWorkflowChainTool;
pub use types::{
    FindRecentFailuresRequest, GetWorkflowStateRequest, GetWorkflowTimelineRequest, OutputFormat,
    TraceWorkflowChainRequest,
};

/// Context shared by all tools during execution
#[derive(Clone)]
pub struct ToolContext {
    /// Source of namespace-scoped clients
    pub provider: Arc<dyn ClientProvider>,
    /// Cancellation and deadline for the call
    pub call: CallContext,
    /// Namespaces tracing may cross into
    pub follow_namespaces: Vec<String>,
}

impl ToolContext {
    /// Create a tool context
    pub fn new(provider: Arc<dyn ClientProvider>, call: CallContext) -> Self {
        Self {
            provider,
            call,
            follow_namespaces: Vec::new(),
        }
    }

    /// Allow tracing into `namespaces`
    pub fn with_follow_namespaces(mut self, namespaces: Vec<String>) -> Self {
        self.follow_namespaces = namespaces;
        self
    }
}

/// Interface implemented by every diagnostic tool
#[async_trait::async_trait]
pub trait DiagnosticTool: Send + Sync {
    /// Tool name
    fn name(&self) -> &'static str;

    /// Tool description
    fn description(&self) -> &'static str;

    /// JSON schema of the arguments
    fn schema(&self) -> Value;

    /// Run the tool, returning JSON or Mermaid text
    async fn execute(&self, arguments: Map<String, Value>, context: &ToolContext) -> Result<String>;
}

/// Parse tool arguments into a typed request
pub fn parse_arguments<T: DeserializeOwned>(arguments: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(arguments))
        .map_err(|e| DiagError::InvalidArgument(format!("invalid arguments: {e}")))
}

/// Object schema for a request type, with subschemas inlined
pub fn parameters_schema<T: JsonSchema>() -> Value {
    let generator = SchemaSettings::draft07()
        .with(|settings| {
            settings.inline_subschemas = true;
            settings.meta_schema = None;
        })
        .into_generator();
    let schema = generator.into_root_schema_for::<T>();
    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| {
        serde_json::json!({ "type": "object", "properties": {} })
    });
    if let Some(object) = value.as_object_mut() {
        object.remove("title");
        object.remove("definitions");
        object.remove("description");
    }
    value
}

/// Render `value` as pretty JSON or as the Mermaid text from `mermaid`
pub fn render<T: Serialize>(
    format: OutputFormat,
    value: &T,
    mermaid: impl FnOnce(&T) -> String,
) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        OutputFormat::Mermaid => Ok(mermaid(value)),
    }
}

pub(crate) fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DiagError::InvalidArgument(format!("{field} is required")));
    }
    Ok(())
}

/// Framework-neutral tool definition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: String,
    /// JSON schema of the arguments
    pub parameters: Value,
}

/// OpenAI `tools` array entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenAiToolSpec {
    /// Always `function`
    #[serde(rename = "type")]
    pub tool_type: String,
    /// The function definition
    pub function: ToolSpec,
}

/// LangChain tool definition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LangChainToolSpec {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: String,
    /// JSON schema of the arguments
    pub args_schema: Value,
}

/// Anthropic Claude tool definition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaudeToolSpec {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: String,
    /// JSON schema of the arguments
    pub input_schema: Value,
}

/// Shape to export tool definitions in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToolSpecFormat {
    /// `{name, description, parameters}`
    #[default]
    Generic,
    /// `{type: "function", function: {...}}`
    OpenAi,
    /// `{name, description, args_schema}`
    LangChain,
    /// `{name, description, input_schema}`
    Claude,
}

impl ToolSpecFormat {
    /// Name used on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::OpenAi => "openai",
            Self::LangChain => "langchain",
            Self::Claude => "claude",
        }
    }
}

impl fmt::Display for ToolSpecFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolSpecFormat {
    type Err = DiagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "" | "generic" => Ok(Self::Generic),
            "openai" => Ok(Self::OpenAi),
            "langchain" => Ok(Self::LangChain),
            "claude" | "anthropic" => Ok(Self::Claude),
            other => Err(DiagError::InvalidArgument(format!(
                "invalid tool spec format '{other}': expected generic, openai, langchain or claude"
            ))),
        }
    }
}

/// Registry of diagnostic tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn DiagnosticTool>>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// A registry holding the four diagnostic tools
    pub fn with_default_tools() -> Self {
        let mut registry = Self::new();
        registry.register(FindRecentFailuresTool::new());
        registry.register(TraceWorkflowChainTool::new());
        registry.register(GetWorkflowTimelineTool::new());
        registry.register(GetWorkflowStateTool::new());
        registry
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register<T: DiagnosticTool + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        self.tools.insert(name, Box::new(tool));
    }

    /// Get a tool by name
    pub fn get_tool(&self, name: &str) -> Option<&dyn DiagnosticTool> {
        self.tools.get(name).map(|tool| tool.as_ref())
    }

    /// Registered tool names, sorted
    pub fn list_tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// True when no tools are registered
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool call
    pub async fn execute(
        &self,
        name: &str,
        arguments: Map<String, Value>,
        context: &ToolContext,
    ) -> Result<String> {
        let tool = self
            .get_tool(name)
            .ok_or_else(|| DiagError::UnknownTool(name.to_string()))?;
        tracing::debug!("Executing tool {}", name);
        tool.execute(arguments, context).await
    }

    /// Tool definitions sorted by name
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().trim().to_string(),
                parameters: tool.schema(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Definitions in the OpenAI `tools` shape
    pub fn openai_specs(&self) -> Vec<OpenAiToolSpec> {
        self.specs()
            .into_iter()
            .map(|function| OpenAiToolSpec {
                tool_type: "function".to_string(),
                function,
            })
            .collect()
    }

    /// Definitions in the LangChain shape
    pub fn langchain_specs(&self) -> Vec<LangChainToolSpec> {
        self.specs()
            .into_iter()
            .map(|spec| LangChainToolSpec {
                name: spec.name,
                description: spec.description,
                args_schema: spec.parameters,
            })
            .collect()
    }

    /// Definitions in the Claude shape
    pub fn claude_specs(&self) -> Vec<ClaudeToolSpec> {
        self.specs()
            .into_iter()
            .map(|spec| ClaudeToolSpec {
                name: spec.name,
                description: spec.description,
                input_schema: spec.parameters,
            })
            .collect()
    }

    /// Definitions in `format` as pretty JSON
    pub fn specs_json(&self, format: ToolSpecFormat) -> Result<String> {
        let json = match format {
            ToolSpecFormat::Generic => serde_json::to_string_pretty(&self.specs())?,
            ToolSpecFormat::OpenAi => serde_json::to_string_pretty(&self.openai_specs())?,
            ToolSpecFormat::LangChain => serde_json::to_string_pretty(&self.langchain_specs())?,
            ToolSpecFormat::Claude => serde_json::to_string_pretty(&self.claude_specs())?,
        };
        Ok(json)
    }
}
