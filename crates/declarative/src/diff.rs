//! Diff computation for declarations

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::context::Engine;
use crate::deferred::ResolvedOutputs;
use crate::error::{Error, Result};
use crate::graph::DeclarationGraph;
use crate::planner::ExecutionPlan;
use crate::types::ResourceState;

/// A diff between current and desired state of a declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDiff {
    /// Logical name of the declaration
    pub resource_id: String,
    /// Kind of the declaration
    pub resource_type: String,
    /// Human-readable description
    pub description: String,
    /// Current state
    pub current: ResourceState,
    /// Desired state; `details` is `None` while inputs are pending
    pub desired: ResourceState,
    /// Inputs that are only known after upstream declarations apply
    pub unknown_inputs: Vec<String>,
}

impl ResourceDiff {
    /// Check if this diff represents an addition
    pub fn is_addition(&self) -> bool {
        matches!(
            (&self.current, &self.desired),
            (ResourceState::Absent, ResourceState::Present { .. })
        )
    }

    /// Check if this diff represents a modification
    pub fn is_modification(&self) -> bool {
        matches!(
            (&self.current, &self.desired),
            (ResourceState::Present { .. }, ResourceState::Present { .. })
        )
    }

    /// Whether the outcome depends on values not known yet
    pub fn is_pending(&self) -> bool {
        !self.unknown_inputs.is_empty()
    }
}

/// Compute diffs for every declaration in the plan
///
/// Walks the plan in order. Outputs of declarations that will not change
/// are taken from the engine so downstream inputs can be resolved;
/// anything downstream of a change is reported as pending.
/// Returns only declarations whose current and desired state differ.
pub fn compute_diffs<E: Engine + ?Sized>(
    graph: &DeclarationGraph,
    plan: &ExecutionPlan,
    engine: &E,
) -> Result<Vec<ResourceDiff>> {
    let mut outputs = ResolvedOutputs::new();
    let mut diffs = Vec::new();

    for id in plan.order() {
        let decl = graph
            .get(id)
            .ok_or_else(|| Error::UnknownDeclaration(id.clone()))?;

        let observed = engine
            .current_state(decl.kind, id)
            .map_err(|e| Error::Provisioning {
                id: id.clone(),
                kind: decl.kind,
                message: format!("{e:#}"),
            })?;

        let (config, unknown_inputs) =
            decl.preview(&outputs)
                .map_err(|source| Error::Resolution {
                    id: id.to_string(),
                    source,
                })?;
        let desired = ResourceState::Present {
            details: unknown_inputs
                .is_empty()
                .then(|| decl.fingerprint(&config)),
        };

        if observed.state == desired {
            if let Some(existing) = observed.outputs {
                outputs.insert(id.clone(), existing);
            }
            continue;
        }

        diffs.push(ResourceDiff {
            resource_id: id.to_string(),
            resource_type: decl.kind.to_string(),
            description: decl.description.clone(),
            current: observed.state,
            desired,
            unknown_inputs,
        });
    }

    Ok(diffs)
}

/// Diff summary statistics
#[derive(Debug, Clone, Default)]
pub struct DiffSummary {
    /// Number of declarations to create
    pub additions: usize,
    /// Number of declarations to update
    pub modifications: usize,
    /// Number of changes whose inputs are not known yet
    pub pending: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs
    pub fn from_diffs(diffs: &[ResourceDiff]) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            if diff.is_addition() {
                summary.additions += 1;
            } else {
                summary.modifications += 1;
            }
            if diff.is_pending() {
                summary.pending += 1;
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.modifications
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group diffs by resource type
pub fn group_by_type(diffs: &[ResourceDiff]) -> HashMap<String, Vec<&ResourceDiff>> {
    let mut groups: HashMap<String, Vec<&ResourceDiff>> = HashMap::new();
    for diff in diffs {
        groups
            .entry(diff.resource_type.clone())
            .or_default()
            .push(diff);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Observed;
    use crate::deferred::{Deferred, Outputs};
    use crate::resource::{Declaration, DeclarationId, ResourceRequest};
    use crate::types::{Applied, ResourceKind};
    use serde_json::json;
    use std::collections::BTreeMap;

    /// Engine that knows a fixed set of existing resources
    struct Existing(BTreeMap<DeclarationId, Observed>);

    impl Engine for Existing {
        fn current_state(
            &self,
            _kind: ResourceKind,
            id: &DeclarationId,
        ) -> anyhow::Result<Observed> {
            Ok(self.0.get(id).cloned().unwrap_or_else(Observed::absent))
        }

        fn apply(&self, _request: &ResourceRequest) -> anyhow::Result<Applied> {
            anyhow::bail!("not used")
        }
    }

    fn graph() -> DeclarationGraph {
        let mut graph = DeclarationGraph::new();
        let cluster = graph
            .declare(Declaration::new("gitops", ResourceKind::Cluster).with("location", "us-east1"))
            .unwrap();
        graph
            .declare(
                Declaration::new("pool", ResourceKind::NodePool)
                    .with("cluster", Deferred::<String>::output(&cluster, "name"))
                    .depends_on(&cluster),
            )
            .unwrap();
        graph
    }

    fn cluster_outputs() -> Outputs {
        let serde_json::Value::Object(map) = json!({ "name": "gitops" }) else {
            unreachable!()
        };
        map
    }

    #[test]
    fn test_fresh_graph_is_all_additions() {
        let graph = graph();
        let plan = ExecutionPlan::from_graph(&graph).unwrap();
        let diffs = compute_diffs(&graph, &plan, &Existing(BTreeMap::new())).unwrap();

        assert_eq!(diffs.len(), 2);
        assert!(diffs.iter().all(ResourceDiff::is_addition));
        assert!(!diffs[0].is_pending());
        assert_eq!(diffs[1].unknown_inputs, vec!["cluster".to_string()]);

        let summary = DiffSummary::from_diffs(&diffs);
        assert_eq!(summary.additions, 2);
        assert_eq!(summary.pending, 1);
    }

    #[test]
    fn test_unchanged_upstream_resolves_downstream() {
        let graph = graph();
        let plan = ExecutionPlan::from_graph(&graph).unwrap();
        let cluster = graph.get(&DeclarationId::new("gitops")).unwrap();
        let request = cluster.resolve(&ResolvedOutputs::new()).unwrap();

        let mut existing = BTreeMap::new();
        existing.insert(
            DeclarationId::new("gitops"),
            Observed::present(request.fingerprint(), cluster_outputs()),
        );

        let diffs = compute_diffs(&graph, &plan, &Existing(existing)).unwrap();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].resource_id, "pool");
        assert!(!diffs[0].is_pending());
    }

    #[test]
    fn test_group_by_type() {
        let graph = graph();
        let plan = ExecutionPlan::from_graph(&graph).unwrap();
        let diffs = compute_diffs(&graph, &plan, &Existing(BTreeMap::new())).unwrap();
        let groups = group_by_type(&diffs);
        assert_eq!(groups["cluster"].len(), 1);
        assert_eq!(groups["node-pool"].len(), 1);
    }
}
