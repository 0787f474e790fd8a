//! Control tree output.
//!
//! This module wraps a built tree with request metadata and renders it
//! as JSON or as a Markdown outline.

pub mod generator;

pub use generator::*;

use crate::models::RootNode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata about one control tree request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Requested sessions, sorted.
    pub sessions: Vec<String>,
    /// When the tree was built.
    pub generated_at: DateTime<Utc>,
    /// Number of tests in the tree.
    pub tests: usize,
    /// Build duration in seconds.
    pub duration_seconds: f64,
}

/// A control tree with its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub tree: RootNode,
}
