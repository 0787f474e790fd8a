//! Error types for control tree aggregation.

use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// A data fetcher call failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed: {message}")]
pub struct FetchError {
    /// Name of the fetcher operation.
    pub operation: String,
    pub message: String,
}

impl FetchError {
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// A merge or shape rule could not be built or applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("rule '{rule}' has an invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        rule: String,
        pattern: String,
        reason: String,
    },

    #[error("group '{id}' is defined twice under '{parent}'")]
    DuplicateGroup { parent: String, id: String },

    #[error("group id '{id}' under '{parent}' must be non-empty and must not contain '/'")]
    InvalidGroupId { parent: String, id: String },

    #[error("monitoring parameter '{parameter}' is listed in both '{first}' and '{second}'")]
    SharedParameter {
        parameter: String,
        first: String,
        second: String,
    },

    #[error("node id '{id}' collides within tree '{root}'")]
    IdCollision { root: String, id: String },
}

/// Any failure while building part of a control tree.
#[derive(Error, Debug)]
pub enum ControlTreeError {
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("worker error: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, ControlTreeError>;

/// The branch of the build that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Tasks,
    Summary,
    Details,
    SessionScope,
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::Tasks => write!(f, "tasks"),
            Branch::Summary => write!(f, "summary"),
            Branch::Details => write!(f, "details"),
            Branch::SessionScope => write!(f, "session scope plots"),
        }
    }
}

/// The single error surfaced for a failed control tree request.
#[derive(Error, Debug)]
#[error("failed to build control tree for sessions [{}] in {branch} branch: {source}", .sessions.join(", "))]
pub struct AggregationError {
    /// Requested sessions, sorted.
    pub sessions: Vec<String>,
    pub branch: Branch,
    #[source]
    pub source: ControlTreeError,
}

impl AggregationError {
    pub fn new(sessions: &BTreeSet<String>, branch: Branch, source: ControlTreeError) -> Self {
        Self {
            sessions: sessions.iter().cloned().collect(),
            branch,
            source,
        }
    }
}
