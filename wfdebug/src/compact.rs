//! Error message compaction
//!
//! Failures that bubble up through child workflows and activities arrive as
//! long chains such as
//! `child workflow execution error (type: X, workflowID: w1, ...): activity
//! error (...): database connection refused`. [`compact_error`] reduces such a
//! chain to its core message.

use once_cell::sync::Lazy;
use regex::Regex;

static METADATA_GROUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\s*\([^)]*(?:type:|workflowID:|runID:|initiatedEventID:|startedEventID:|scheduledEventID:|identity:|retryable:)[^)]*\)",
    )
    .expect("metadata group regex should be valid")
});

static INLINE_METADATA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*\(type:\s*\w+(?:,\s*retryable:\s*\w+)?\)")
        .expect("inline metadata regex should be valid")
});

static ACTIVITY_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z][a-zA-Z]+Activity\s*-\s*").expect("activity prefix regex should be valid")
});

static ACTIVITY_FAILED_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^ActivityFailed:\s*[A-Z][a-zA-Z]+Activity\s*-\s*")
        .expect("activity failed prefix regex should be valid")
});

/// Segments starting with one of these (case-insensitive) only wrap the
/// real error
const WRAPPER_PHRASES: &[&str] = &[
    "child workflow execution error",
    "activity error",
    "child workflow at depth",
    "leaf workflow failed at depth",
    "order failed",
    "payment error",
    "shipping error",
    "validation failed",
    "timeout workflow failed",
    "retry exhaustion",
    "activityfailed",
    "workflowfailed",
    "timeout",
];

fn is_wrapper(segment: &str) -> bool {
    let lower = segment.to_lowercase();
    WRAPPER_PHRASES.iter().any(|phrase| lower.starts_with(phrase))
}

fn compact_once(message: &str) -> String {
    let stripped = message.strip_prefix("WorkflowFailed: ").unwrap_or(message);
    let stripped = stripped.strip_prefix("Timeout: ").unwrap_or(stripped);
    let stripped = METADATA_GROUP.replace_all(stripped, "");

    let segments: Vec<&str> = stripped.split(": ").collect();
    let core = segments
        .iter()
        .rev()
        .map(|s| s.trim())
        .find(|s| !s.is_empty() && !is_wrapper(s))
        .or_else(|| segments.last().map(|s| s.trim()))
        .unwrap_or_default();

    let core = INLINE_METADATA.replace_all(core, "");
    let core = ACTIVITY_PREFIX.replace(&core, "");
    let core = ACTIVITY_FAILED_PREFIX.replace(&core, "");

    core.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract the core error from a chained failure message
///
/// Strips `WorkflowFailed: `/`Timeout: ` prefixes and parenthesized metadata,
/// picks the last chain segment that is not a known wrapper phrase, drops an
/// `XxxActivity - ` prefix and collapses whitespace. Applying it to its own
/// output returns the same string.
pub fn compact_error(message: &str) -> String {
    let mut current = compact_once(message);
    loop {
        let next = compact_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// [`compact_error`] plus a short hint for timeouts
///
/// Activity timeouts whose core no longer mentions a timeout get an
/// `activity timeout: ` prefix. Workflow execution timeouts become
/// `workflow timeout`.
pub fn compact_error_with_context(message: &str) -> String {
    if message.is_empty() {
        return String::new();
    }

    let core = compact_error(message);
    let lower = message.to_lowercase();

    if lower.contains("activity")
        && lower.contains("timeout")
        && !core.to_lowercase().contains("timeout")
    {
        return format!("activity timeout: {core}");
    }

    if lower.contains("workflow execution timed out") {
        return "workflow timeout".to_string();
    }

    core
}
