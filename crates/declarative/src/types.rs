//! Core types for declarative resource management

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::deferred::Outputs;

/// Type tag of a declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Service identity attached to compute nodes
    Identity,
    /// Managed Kubernetes control plane
    Cluster,
    /// Compute pool attached to a cluster
    NodePool,
    /// Authenticated client handle to a cluster API server
    Provider,
    /// In-cluster namespace
    Namespace,
    /// Chart-based application bundle
    Chart,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        Self::Identity,
        Self::Cluster,
        Self::NodePool,
        Self::Provider,
        Self::Namespace,
        Self::Chart,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Cluster => "cluster",
            Self::NodePool => "node-pool",
            Self::Provider => "provider",
            Self::Namespace => "namespace",
            Self::Chart => "chart",
        }
    }

    /// Whether declarations of this kind live inside a cluster and need a provider
    pub fn is_in_cluster(&self) -> bool {
        matches!(self, Self::Namespace | Self::Chart)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown resource kind: {s}"))
    }
}

/// Current or desired state of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceState {
    /// Resource exists; `details` carries its config fingerprint when known
    Present { details: Option<String> },
    /// Resource does not exist
    Absent,
    /// State cannot be determined
    Unknown,
}

impl ResourceState {
    /// Check if state represents presence
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present { .. })
    }

    /// Check if state represents absence
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// Result of applying a declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// No changes needed
    NoChange,
    /// Resource was created
    Created,
    /// Resource was modified
    Modified,
    /// Apply failed
    Failed { error: String },
    /// Apply was skipped
    Skipped { reason: String },
}

impl ApplyResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Created | Self::Modified)
    }
}

/// What an engine hands back after converging one declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub result: ApplyResult,
    /// Runtime attributes of the resource (endpoint, email, ...)
    pub outputs: Outputs,
}

impl Applied {
    pub fn new(result: ApplyResult, outputs: Outputs) -> Self {
        Self { result, outputs }
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of declarations processed
    pub fn total(&self) -> usize {
        self.created + self.modified + self.skipped + self.failed + self.no_change
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ExecuteSummary) {
        self.created += other.created;
        self.modified += other.modified;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.no_change += other.no_change;
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Upper bound on declarations applied concurrently within one level
    pub jobs: usize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.as_str().parse::<ResourceKind>(), Ok(kind));
        }
        assert!("vm".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&ResourceKind::NodePool).unwrap();
        assert_eq!(json, "\"node-pool\"");
    }

    #[test]
    fn test_summary_add_and_merge() {
        let mut summary = ExecuteSummary::default();
        summary.add_result(&ApplyResult::Created);
        summary.add_result(&ApplyResult::NoChange);
        summary.add_result(&ApplyResult::Failed {
            error: "quota".into(),
        });

        let mut other = ExecuteSummary::default();
        other.add_result(&ApplyResult::Modified);
        summary.merge(&other);

        assert_eq!(summary.total_changes(), 2);
        assert_eq!(summary.total(), 4);
        assert!(!summary.is_success());
    }
}
