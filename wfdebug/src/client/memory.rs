//! In-memory client provider backed by workflow fixtures
//!
//! Serves describe, history and visibility calls from [`WorkflowFixture`]s
//! held in memory, either inserted directly or loaded from a directory of
//! exported JSON files laid out as `<namespace>/<workflow_id>.json`.
//!
//! Behavior can be tuned through [`InMemoryClientConfig`] to exercise paging,
//! namespace authorization failures, history fetch failures and slow calls.

use super::{
    ClientProvider, HistoryEventFilter, HistoryPage, HistoryPageRequest, ListWorkflowsPage,
    ListWorkflowsRequest, WorkflowClient, WorkflowExecutionDescription, WorkflowExecutionInfo,
};
use crate::error::{ClientError, ErrorContext, Result};
use crate::history::HistoryEvent;
use crate::types::WorkflowStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

static STATUS_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"ExecutionStatus\s*=\s*"(\w+)""#).expect("status clause regex should be valid")
});
static CLOSE_TIME_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"CloseTime\s*>\s*"([^"]+)""#).expect("close time clause regex should be valid")
});
static TYPE_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"WorkflowType\s*=\s*"([^"]+)""#).expect("type clause regex should be valid")
});

/// One workflow run: its description and full history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowFixture {
    /// What describe returns for this run
    pub description: WorkflowExecutionDescription,
    /// Full history in event order
    #[serde(default)]
    pub history: Vec<HistoryEvent>,
}

impl WorkflowFixture {
    fn workflow_id(&self) -> &str {
        &self.description.info.execution.workflow_id
    }

    fn run_id(&self) -> &str {
        &self.description.info.execution.run_id
    }
}

/// Knobs for simulating service behavior
#[derive(Debug, Clone)]
pub struct InMemoryClientConfig {
    /// Events per history page
    pub history_page_size: usize,
    /// Executions per visibility page
    pub list_page_size: usize,
    /// Namespaces that reject `get_client` with permission denied
    pub denied_namespaces: HashSet<String>,
    /// Workflow IDs whose history fetch fails with unavailable
    pub failing_histories: HashSet<String>,
    /// Simulated latency added to every call
    pub operation_delay_ms: Option<u64>,
}

impl Default for InMemoryClientConfig {
    fn default() -> Self {
        Self {
            history_page_size: 256,
            list_page_size: 100,
            denied_namespaces: HashSet::new(),
            failing_histories: HashSet::new(),
            operation_delay_ms: None,
        }
    }
}

type FixtureMap = HashMap<String, Vec<WorkflowFixture>>;

/// Provider handing out [`InMemoryWorkflowClient`]s over shared fixtures
#[derive(Debug, Clone, Default)]
pub struct InMemoryClientProvider {
    fixtures: Arc<RwLock<FixtureMap>>,
    config: Arc<RwLock<InMemoryClientConfig>>,
}

impl InMemoryClientProvider {
    /// An empty provider with default behavior
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty provider with custom behavior
    pub fn new_with_config(config: InMemoryClientConfig) -> Self {
        Self {
            fixtures: Arc::default(),
            config: Arc::new(RwLock::new(config)),
        }
    }

    /// Load every `<namespace>/<workflow_id>.json` under `dir`
    ///
    /// Each file holds either a single [`WorkflowFixture`] or an array of
    /// runs ordered oldest first.
    pub fn load_dir(dir: &Path, config: InMemoryClientConfig) -> Result<Self> {
        let mut fixtures = FixtureMap::new();

        let namespaces = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read history directory {}", dir.display()))?;
        for ns_entry in namespaces {
            let ns_path = ns_entry?.path();
            if !ns_path.is_dir() {
                continue;
            }
            let Some(namespace) = ns_path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            let mut files: Vec<_> = std::fs::read_dir(&ns_path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            files.sort();

            for file in files {
                let content = std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read fixture {}", file.display()))?;
                let runs = parse_fixture_file(&content)
                    .with_context(|| format!("Invalid fixture {}", file.display()))?;
                tracing::debug!("Loaded {} run(s) from {}", runs.len(), file.display());
                fixtures
                    .entry(namespace.to_string())
                    .or_default()
                    .extend(runs);
            }
        }

        tracing::info!(
            "Loaded fixtures for {} namespace(s) from {}",
            fixtures.len(),
            dir.display()
        );
        Ok(Self {
            fixtures: Arc::new(RwLock::new(fixtures)),
            config: Arc::new(RwLock::new(config)),
        })
    }

    /// Add a run; later inserts for the same workflow ID are newer runs
    pub async fn insert(&self, namespace: &str, fixture: WorkflowFixture) {
        self.fixtures
            .write()
            .await
            .entry(namespace.to_string())
            .or_default()
            .push(fixture);
    }

    /// Replace the behavior configuration
    pub async fn set_config(&self, config: InMemoryClientConfig) {
        *self.config.write().await = config;
    }

    /// Reject future `get_client` calls for `namespace`
    pub async fn deny_namespace(&self, namespace: &str) {
        self.config
            .write()
            .await
            .denied_namespaces
            .insert(namespace.to_string());
    }

    /// Make history fetches for `workflow_id` fail
    pub async fn fail_history(&self, workflow_id: &str) {
        self.config
            .write()
            .await
            .failing_histories
            .insert(workflow_id.to_string());
    }

    #[cfg(test)]
    async fn run_count(&self, namespace: &str) -> usize {
        self.fixtures
            .read()
            .await
            .get(namespace)
            .map_or(0, Vec::len)
    }
}

fn parse_fixture_file(content: &str) -> std::result::Result<Vec<WorkflowFixture>, serde_json::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FixtureFile {
        Many(Vec<WorkflowFixture>),
        One(Box<WorkflowFixture>),
    }

    Ok(match serde_json::from_str(content)? {
        FixtureFile::Many(runs) => runs,
        FixtureFile::One(run) => vec![*run],
    })
}

#[async_trait]
impl ClientProvider for InMemoryClientProvider {
    async fn get_client(
        &self,
        namespace: &str,
    ) -> std::result::Result<Arc<dyn WorkflowClient>, ClientError> {
        if self.config.read().await.denied_namespaces.contains(namespace) {
            return Err(ClientError::PermissionDenied {
                namespace: namespace.to_string(),
            });
        }
        if !self.fixtures.read().await.contains_key(namespace) {
            return Err(ClientError::NotFound(format!("namespace {namespace}")));
        }

        Ok(Arc::new(InMemoryWorkflowClient {
            namespace: namespace.to_string(),
            fixtures: Arc::clone(&self.fixtures),
            config: Arc::clone(&self.config),
        }))
    }
}

/// Namespace-scoped client over the provider's fixtures
#[derive(Debug, Clone)]
pub struct InMemoryWorkflowClient {
    namespace: String,
    fixtures: Arc<RwLock<FixtureMap>>,
    config: Arc<RwLock<InMemoryClientConfig>>,
}

impl InMemoryWorkflowClient {
    async fn simulate_delay(&self) {
        let delay = self.config.read().await.operation_delay_ms;
        if let Some(delay_ms) = delay {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        }
    }

    /// Find a run: the named one, or the latest for an empty run ID
    fn find<'a>(
        runs: &'a [WorkflowFixture],
        workflow_id: &str,
        run_id: &str,
    ) -> Option<&'a WorkflowFixture> {
        runs.iter()
            .rev()
            .filter(|f| f.workflow_id() == workflow_id)
            .find(|f| run_id.is_empty() || f.run_id() == run_id)
    }

    fn not_found(&self, workflow_id: &str, run_id: &str) -> ClientError {
        if run_id.is_empty() {
            ClientError::NotFound(format!("workflow {}/{}", self.namespace, workflow_id))
        } else {
            ClientError::NotFound(format!(
                "workflow {}/{} run {}",
                self.namespace, workflow_id, run_id
            ))
        }
    }
}

fn parse_page_token(token: Option<&String>) -> std::result::Result<usize, ClientError> {
    match token {
        None => Ok(0),
        Some(t) => t
            .parse()
            .map_err(|_| ClientError::InvalidArgument(format!("invalid page token: {t}"))),
    }
}

/// The subset of visibility query syntax the failures finder emits
#[derive(Debug, Default)]
struct VisibilityFilter {
    statuses: Vec<WorkflowStatus>,
    closed_after: Option<DateTime<Utc>>,
    workflow_type: Option<String>,
}

impl VisibilityFilter {
    fn parse(query: &str) -> std::result::Result<Self, ClientError> {
        let statuses = STATUS_CLAUSE
            .captures_iter(query)
            .map(|c| WorkflowStatus::parse(&c[1]))
            .collect();

        let closed_after = match CLOSE_TIME_CLAUSE.captures(query) {
            Some(c) => Some(
                DateTime::parse_from_rfc3339(&c[1])
                    .map_err(|e| {
                        ClientError::InvalidArgument(format!("invalid CloseTime '{}': {e}", &c[1]))
                    })?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        let workflow_type = TYPE_CLAUSE.captures(query).map(|c| c[1].to_string());

        Ok(Self {
            statuses,
            closed_after,
            workflow_type,
        })
    }

    fn matches(&self, info: &WorkflowExecutionInfo) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&info.status) {
            return false;
        }
        if let Some(after) = self.closed_after {
            match info.close_time {
                Some(close) if close > after => {}
                _ => return false,
            }
        }
        if let Some(ref wf_type) = self.workflow_type {
            if &info.workflow_type != wf_type {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl WorkflowClient for InMemoryWorkflowClient {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn describe_workflow_execution(
        &self,
        workflow_id: &str,
        run_id: Option<&str>,
    ) -> std::result::Result<WorkflowExecutionDescription, ClientError> {
        self.simulate_delay().await;

        let run_id = run_id.unwrap_or_default();
        let fixtures = self.fixtures.read().await;
        let runs = fixtures.get(&self.namespace).map(Vec::as_slice).unwrap_or_default();
        Self::find(runs, workflow_id, run_id)
            .map(|f| f.description.clone())
            .ok_or_else(|| self.not_found(workflow_id, run_id))
    }

    async fn get_workflow_history_page(
        &self,
        request: &HistoryPageRequest,
    ) -> std::result::Result<HistoryPage, ClientError> {
        self.simulate_delay().await;

        let config = self.config.read().await.clone();
        if config.failing_histories.contains(&request.workflow_id) {
            return Err(ClientError::Unavailable(format!(
                "simulated history failure for {}",
                request.workflow_id
            )));
        }

        let fixtures = self.fixtures.read().await;
        let runs = fixtures.get(&self.namespace).map(Vec::as_slice).unwrap_or_default();
        let fixture = Self::find(runs, &request.workflow_id, &request.run_id)
            .ok_or_else(|| self.not_found(&request.workflow_id, &request.run_id))?;

        if request.filter == HistoryEventFilter::CloseEvent {
            let close = fixture
                .history
                .iter()
                .rev()
                .find(|e| e.attributes.is_close_event())
                .cloned();
            return Ok(HistoryPage {
                events: close.into_iter().collect(),
                next_page_token: None,
            });
        }

        let page_size = config.history_page_size.max(1);
        let start = parse_page_token(request.next_page_token.as_ref())?;
        let end = (start + page_size).min(fixture.history.len());
        let events = fixture.history.get(start..end).unwrap_or_default().to_vec();
        let next_page_token = (end < fixture.history.len()).then(|| end.to_string());

        Ok(HistoryPage {
            events,
            next_page_token,
        })
    }

    async fn list_workflow_executions(
        &self,
        request: &ListWorkflowsRequest,
    ) -> std::result::Result<ListWorkflowsPage, ClientError> {
        self.simulate_delay().await;

        let filter = VisibilityFilter::parse(&request.query)?;
        let page_size = self.config.read().await.list_page_size.max(1);

        let fixtures = self.fixtures.read().await;
        let mut matching: Vec<&WorkflowExecutionInfo> = fixtures
            .get(&self.namespace)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|f| &f.description.info)
            .filter(|info| filter.matches(info))
            .collect();
        // newest close first, like a visibility store
        matching.sort_by(|a, b| b.close_time.cmp(&a.close_time));

        let start = parse_page_token(request.next_page_token.as_ref())?;
        let end = (start + page_size).min(matching.len());
        let executions = matching
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .map(|info| (*info).clone())
            .collect();
        let next_page_token = (end < matching.len()).then(|| end.to_string());

        Ok(ListWorkflowsPage {
            executions,
            next_page_token,
        })
    }
}
