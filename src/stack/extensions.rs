//! Named extension points of the stack
//!
//! Each point marks where a future part of the platform attaches to the
//! graph. None of them declares anything yet.

use declarative::{DeclarationGraph, DeclarationId};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::provider::ProviderHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtensionPoint {
    /// Roles and bindings for cluster users
    Rbac,
    /// Cluster and workload autoscaling
    Autoscaling,
    /// Cloud SQL instances consumed by workloads
    ManagedDatabase,
    /// Operators installed after the base charts
    Operators,
}

impl ExtensionPoint {
    pub const ALL: [ExtensionPoint; 4] = [
        Self::Rbac,
        Self::Autoscaling,
        Self::ManagedDatabase,
        Self::Operators,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rbac => "rbac",
            Self::Autoscaling => "autoscaling",
            Self::ManagedDatabase => "managed-database",
            Self::Operators => "operators",
        }
    }
}

impl fmt::Display for ExtensionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run the extension point against the graph, returning what it declared.
///
/// Declarations added here would be submitted through `provider`.
pub fn extend(
    graph: &DeclarationGraph,
    point: ExtensionPoint,
    provider: &ProviderHandle,
) -> declarative::Result<Vec<DeclarationId>> {
    log::debug!(
        "extension point `{point}` has no declarations ({} declared so far, provider `{}`)",
        graph.len(),
        provider.id
    );
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_points_declare_nothing() {
        let graph = DeclarationGraph::new();
        let provider = ProviderHandle {
            id: DeclarationId::new("k8sprovider"),
        };
        for point in ExtensionPoint::ALL {
            assert!(extend(&graph, point, &provider).unwrap().is_empty());
        }
        assert!(graph.is_empty());
    }

    #[test]
    fn test_names() {
        assert_eq!(ExtensionPoint::ManagedDatabase.to_string(), "managed-database");
        assert_eq!(
            serde_json::to_string(&ExtensionPoint::Rbac).unwrap(),
            "\"rbac\""
        );
    }
}
