//! Execution planner - orders declarations into provisioning levels

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::graph::DeclarationGraph;
use crate::resource::{Declaration, DeclarationId};
use crate::types::ResourceKind;

/// Declarations grouped into levels that may be provisioned concurrently
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionPlan {
    levels: Vec<Vec<DeclarationId>>,
}

impl ExecutionPlan {
    /// Plan every declaration in the graph
    pub fn from_graph(graph: &DeclarationGraph) -> Result<Self> {
        graph.validate()?;
        Ok(Self {
            levels: graph.levels()?,
        })
    }

    /// Plan only the declarations matching `target`, plus everything they depend on
    ///
    /// Target format: "kind" or "kind.name"
    pub fn for_target(graph: &DeclarationGraph, target: Option<&str>) -> Result<Self> {
        let plan = Self::from_graph(graph)?;
        let Some(target) = target else {
            return Ok(plan);
        };

        let (kind, name) = parse_target(target);
        let selected: Vec<&DeclarationId> = graph
            .declarations()
            .filter(|decl| matches_filter(decl, kind.as_deref(), name.as_deref()))
            .map(|decl| &decl.id)
            .collect();
        if selected.is_empty() {
            return Err(Error::UnknownTarget(target.to_string()));
        }

        let mut keep: BTreeSet<DeclarationId> = BTreeSet::new();
        for id in selected {
            keep.insert(id.clone());
            keep.extend(graph.ancestors(id));
        }

        Ok(plan.retain(|id| keep.contains(id)))
    }

    fn retain<F>(self, predicate: F) -> Self
    where
        F: Fn(&DeclarationId) -> bool,
    {
        Self {
            levels: self
                .levels
                .into_iter()
                .map(|level| level.into_iter().filter(|id| predicate(id)).collect())
                .filter(|level: &Vec<DeclarationId>| !level.is_empty())
                .collect(),
        }
    }

    pub fn levels(&self) -> &[Vec<DeclarationId>] {
        &self.levels
    }

    /// Declarations in execution order
    pub fn order(&self) -> impl Iterator<Item = &DeclarationId> {
        self.levels.iter().flatten()
    }

    pub fn contains(&self, id: &DeclarationId) -> bool {
        self.order().any(|planned| planned == id)
    }

    /// Total number of declarations in the plan
    pub fn total_resources(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Parse a target string like "kind.name" into (kind, name)
fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    let parts: Vec<&str> = target.splitn(2, '.').collect();
    match parts.as_slice() {
        [kind] => (Some((*kind).to_string()), None),
        [kind, name] => (Some((*kind).to_string()), Some((*name).to_string())),
        _ => (None, Some(target.to_string())),
    }
}

/// Check if a declaration matches the filter criteria
fn matches_filter(decl: &Declaration, kind: Option<&str>, name: Option<&str>) -> bool {
    if let Some(k) = kind {
        // Allow common aliases
        let matches_kind = match k {
            "infra" => !decl.kind.is_in_cluster() && decl.kind != ResourceKind::Provider,
            "workloads" => decl.kind.is_in_cluster(),
            "charts" => decl.kind == ResourceKind::Chart,
            "namespaces" => decl.kind == ResourceKind::Namespace,
            _ => decl.kind.as_str() == k,
        };
        if !matches_kind {
            return false;
        }
    }

    if let Some(n) = name
        && decl.id.as_str() != n
    {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> DeclarationGraph {
        let mut graph = DeclarationGraph::new();
        let cluster = graph
            .declare(Declaration::new("gitops", ResourceKind::Cluster))
            .unwrap();
        let provider = graph
            .declare(Declaration::new("k8sprovider", ResourceKind::Provider).depends_on(&cluster))
            .unwrap();
        let ns = graph
            .declare(
                Declaration::new("pulumi-test", ResourceKind::Namespace).with_provider(&provider),
            )
            .unwrap();
        graph
            .declare(
                Declaration::new("ingress-nginx", ResourceKind::Chart)
                    .with_provider(&provider)
                    .depends_on(&ns),
            )
            .unwrap();
        graph
            .declare(Declaration::new("side", ResourceKind::Identity))
            .unwrap();
        graph
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("chart"), (Some("chart".to_string()), None));
        assert_eq!(
            parse_target("chart.ingress-nginx"),
            (Some("chart".to_string()), Some("ingress-nginx".to_string()))
        );
        assert_eq!(
            parse_target("chart.a.b"),
            (Some("chart".to_string()), Some("a.b".to_string()))
        );
    }

    #[test]
    fn test_full_plan_levels() {
        let plan = ExecutionPlan::from_graph(&graph()).unwrap();
        assert_eq!(plan.total_resources(), 5);
        assert_eq!(plan.levels().len(), 4);
        assert!(plan.levels()[0].contains(&DeclarationId::new("side")));
    }

    #[test]
    fn test_target_keeps_dependencies() {
        let plan = ExecutionPlan::for_target(&graph(), Some("chart.ingress-nginx")).unwrap();
        let order: Vec<&str> = plan.order().map(DeclarationId::as_str).collect();
        assert_eq!(
            order,
            vec!["gitops", "k8sprovider", "pulumi-test", "ingress-nginx"]
        );
        assert!(!plan.contains(&DeclarationId::new("side")));
    }

    #[test]
    fn test_target_aliases() {
        let plan = ExecutionPlan::for_target(&graph(), Some("infra")).unwrap();
        assert_eq!(plan.total_resources(), 2);

        let err = ExecutionPlan::for_target(&graph(), Some("chart.missing")).unwrap_err();
        assert!(matches!(err, Error::UnknownTarget(_)));
    }
}
