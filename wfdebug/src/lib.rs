//! # wfdebug
//!
//! Failure-chain tracing and history diagnostics for workflow orchestration
//! executions.
//!
//! ## Features
//!
//! - **Chain tracing**: Follow a failed workflow through failing child workflows
//!   and Nexus operations to the deepest failure and its root cause
//! - **Failure search**: List, filter and group recent failures in a namespace
//! - **Timelines**: Flat, filterable event timelines with durations
//! - **State**: Pending activities, child workflows and Nexus operations
//! - **Diagrams and tools**: Mermaid rendering and agent tool definitions
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wfdebug::{CallContext, ChainTraverser, InMemoryClientProvider, TraverserOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Serve exported histories laid out as <namespace>/<workflow_id>.json
//! let provider = InMemoryClientProvider::load_dir(
//!     std::path::Path::new("./histories"),
//!     Default::default(),
//! )?;
//!
//! let traverser = ChainTraverser::new(Arc::new(provider), TraverserOptions::default());
//! let trace = traverser
//!     .trace(&CallContext::new(), "default", "order-1234", None)
//!     .await?;
//!
//! if let Some(root_cause) = &trace.root_cause {
//!     println!("{}", root_cause.summary());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// Shared helpers
pub mod common;

/// Layered configuration
pub mod config;

/// Cancellation and deadlines for remote calls
pub mod context;

/// Error types
pub mod error;

/// Workflow history event model
pub mod history;

/// Result records shared by every diagnostic
pub mod types;

/// Orchestration service client abstractions
pub mod client;

mod state_machine;

/// Error message compaction
pub mod compact;

/// Failure chain traversal and root-cause selection
pub mod traverser;

/// Recent failure search and grouping
pub mod failures;

/// Event timelines
pub mod timeline;

/// Pending work of a workflow execution
pub mod state;

/// Mermaid diagram rendering
pub mod mermaid;

/// Agent tool definitions and registry
pub mod tools;

pub use client::{
    ClientProvider, HistoryEventFilter, InMemoryClientConfig, InMemoryClientProvider,
    WorkflowClient, WorkflowFixture,
};
pub use compact::{compact_error, compact_error_with_context};
pub use config::{ConfigError, DiagConfig};
pub use context::CallContext;
pub use error::{ClientError, DiagError, ErrorChainExt, ErrorContext, Result};
pub use failures::{FailuresFinder, FailuresOptions, GroupBy};
pub use history::{EventAttributes, EventLink, Failure, HistoryEvent, WorkflowExecution};
pub use state::{StateExtractor, StateOptions};
pub use timeline::{TimelineGenerator, TimelineOptions};
pub use tools::{DiagnosticTool, OutputFormat, ToolContext, ToolRegistry, ToolSpecFormat};
pub use traverser::{ChainTraverser, SkippedBranch, SkippedBranchCallback, TraverserOptions};
pub use types::{
    EventCategory, FailureGroup, FailureReport, FailuresResult, RootCause, RootCauseType,
    TimelineEvent, TimelineResult, TraceResult, WorkflowChainNode, WorkflowRef,
    WorkflowStateResult, WorkflowStatus,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        CallContext, ChainTraverser, ClientProvider, DiagError, FailuresFinder, FailuresOptions,
        InMemoryClientProvider, Result, StateExtractor, TimelineGenerator, ToolRegistry,
        TraceResult, TraverserOptions, WorkflowClient, WorkflowStatus,
    };
}

/// Test utilities module for testing support
#[doc(hidden)]
pub mod test_utils;
