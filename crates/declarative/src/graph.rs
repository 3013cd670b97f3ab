//! Declaration graph built on `petgraph`.
//!
//! Declarations are added in program order and may only reference
//! declarations that are already in the graph, so program order is
//! always a valid topological order. Every reference becomes a
//! first-class [`Edge`], which lets the graph be checked and inspected
//! without executing anything.

use petgraph::Direction;
use petgraph::algo;
use petgraph::dot::{Config as DotConfig, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::deferred::Deferred;
use crate::error::{Error, Result};
use crate::resource::{Declaration, DeclarationId};

/// Why one declaration is sequenced after another
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// An input reads the dependency's outputs
    Data,
    /// Declared through `depends_on`
    Explicit,
    /// The dependency is the provider the declaration is submitted through
    Provider,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Data => "data",
            Self::Explicit => "explicit",
            Self::Provider => "provider",
        })
    }
}

/// `to` must not be provisioned before `from`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Edge {
    pub from: DeclarationId,
    pub to: DeclarationId,
    pub kind: EdgeKind,
}

/// Declarations plus the dependency edges between them
#[derive(Debug, Default)]
pub struct DeclarationGraph {
    graph: DiGraph<DeclarationId, EdgeKind>,
    index: HashMap<DeclarationId, NodeIndex>,
    declarations: Vec<Declaration>,
    exports: BTreeMap<String, Deferred<String>>,
}

impl DeclarationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a declaration after everything it references.
    ///
    /// Rejects duplicate names, self references and references to
    /// declarations that are not in the graph yet.
    pub fn declare(&mut self, declaration: Declaration) -> Result<DeclarationId> {
        let id = declaration.id.clone();
        if self.index.contains_key(&id) {
            return Err(Error::DuplicateDeclaration(id));
        }

        let mut incoming: BTreeSet<(DeclarationId, EdgeKind)> = BTreeSet::new();
        for source in declaration.data_sources() {
            incoming.insert((source, EdgeKind::Data));
        }
        for dependency in &declaration.depends_on {
            incoming.insert((dependency.clone(), EdgeKind::Explicit));
        }
        if let Some(provider) = &declaration.provider {
            incoming.insert((provider.clone(), EdgeKind::Provider));
        }

        for (dependency, _) in &incoming {
            if *dependency == id {
                return Err(Error::SelfDependency(id));
            }
            if !self.index.contains_key(dependency) {
                return Err(Error::UnknownDependency {
                    id,
                    dependency: dependency.clone(),
                });
            }
        }

        let node = self.graph.add_node(id.clone());
        for (dependency, kind) in &incoming {
            self.graph.add_edge(self.index[dependency], node, *kind);
        }
        self.index.insert(id.clone(), node);

        log::debug!(
            "declared {} `{}` after [{}]",
            declaration.kind,
            id,
            incoming
                .iter()
                .map(|(dep, kind)| format!("{dep} ({kind})"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.declarations.push(declaration);
        Ok(id)
    }

    /// Publish a deferred value under `key` once the run succeeds
    pub fn export(&mut self, key: &str, value: Deferred<String>) -> Result<()> {
        if self.exports.contains_key(key) {
            return Err(Error::DuplicateExport(key.to_string()));
        }
        if let Some(unknown) = value.sources().iter().find(|id| !self.contains(id)) {
            return Err(Error::UnknownDependency {
                id: DeclarationId::new(format!("export:{key}")),
                dependency: unknown.clone(),
            });
        }
        self.exports.insert(key.to_string(), value);
        Ok(())
    }

    pub fn exports(&self) -> &BTreeMap<String, Deferred<String>> {
        &self.exports
    }

    pub fn get(&self, id: &DeclarationId) -> Option<&Declaration> {
        self.index
            .get(id)
            .map(|idx| &self.declarations[idx.index()])
    }

    pub fn contains(&self, id: &DeclarationId) -> bool {
        self.index.contains_key(id)
    }

    /// Declarations in program order
    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations.iter()
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Every edge, sorted by source, target and kind
    pub fn edges(&self) -> Vec<Edge> {
        let mut edges: Vec<Edge> = self
            .graph
            .edge_indices()
            .filter_map(|edge| {
                let (from, to) = self.graph.edge_endpoints(edge)?;
                Some(Edge {
                    from: self.graph[from].clone(),
                    to: self.graph[to].clone(),
                    kind: self.graph[edge],
                })
            })
            .collect();
        edges.sort();
        edges
    }

    /// Direct dependencies of `id`, with the reason for each
    pub fn dependencies_of(&self, id: &DeclarationId) -> Vec<(DeclarationId, EdgeKind)> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut deps: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|edge| (self.graph[edge.source()].clone(), *edge.weight()))
            .collect();
        deps.sort();
        deps
    }

    /// All transitive dependencies of `id`
    pub fn ancestors(&self, id: &DeclarationId) -> BTreeSet<DeclarationId> {
        let mut seen = BTreeSet::new();
        let Some(&start) = self.index.get(id) else {
            return seen;
        };
        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            for dep in self.graph.neighbors_directed(idx, Direction::Incoming) {
                if seen.insert(self.graph[dep].clone()) {
                    stack.push(dep);
                }
            }
        }
        seen
    }

    /// Returns `true` if the graph contains at least one cycle.
    pub fn has_cycle(&self) -> bool {
        algo::is_cyclic_directed(&self.graph)
    }

    /// Topological sort of the graph. Returns an error if a cycle exists.
    pub fn topological_order(&self) -> Result<Vec<DeclarationId>> {
        let sorted = algo::toposort(&self.graph, None).map_err(|_| Error::CycleDetected)?;
        Ok(sorted
            .into_iter()
            .map(|idx| self.graph[idx].clone())
            .collect())
    }

    /// Compute provisioning levels using Kahn's algorithm.
    ///
    /// Every declaration in a level only depends on declarations in
    /// earlier levels, so a level may be provisioned concurrently.
    /// Within a level, program order is kept.
    pub fn levels(&self) -> Result<Vec<Vec<DeclarationId>>> {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                (
                    idx,
                    self.graph
                        .neighbors_directed(idx, Direction::Incoming)
                        .count(),
                )
            })
            .collect();

        let mut levels = Vec::new();
        let mut remaining: Vec<NodeIndex> = self.graph.node_indices().collect();

        while !remaining.is_empty() {
            let current: Vec<NodeIndex> = remaining
                .iter()
                .filter(|idx| in_degree[*idx] == 0)
                .copied()
                .collect();

            if current.is_empty() {
                return Err(Error::CycleDetected);
            }

            for &idx in &current {
                for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                    in_degree.entry(next).and_modify(|deg| *deg -= 1);
                }
            }

            remaining.retain(|idx| !current.contains(idx));
            levels.push(
                current
                    .into_iter()
                    .map(|idx| self.graph[idx].clone())
                    .collect(),
            );
        }

        Ok(levels)
    }

    /// Check the graph is acyclic and every export is reachable
    pub fn validate(&self) -> Result<()> {
        if self.has_cycle() {
            return Err(Error::CycleDetected);
        }
        for (key, value) in &self.exports {
            if let Some(unknown) = value.sources().iter().find(|id| !self.contains(id)) {
                return Err(Error::UnknownDependency {
                    id: DeclarationId::new(format!("export:{key}")),
                    dependency: unknown.clone(),
                });
            }
        }
        Ok(())
    }

    /// Graphviz rendering, edges labelled with their kind
    pub fn to_dot(&self) -> String {
        format!("{}", Dot::with_config(&self.graph, &[DotConfig::GraphContentOnly]))
            .lines()
            .map(|line| format!("  {line}"))
            .fold(String::from("digraph declarations {\n"), |mut acc, line| {
                acc.push_str(&line);
                acc.push('\n');
                acc
            })
            + "}\n"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceKind;

    fn cluster_then_pool() -> DeclarationGraph {
        let mut graph = DeclarationGraph::new();
        let sa = graph
            .declare(Declaration::new("sa", ResourceKind::Identity))
            .unwrap();
        let cluster = graph
            .declare(Declaration::new("gitops", ResourceKind::Cluster))
            .unwrap();
        graph
            .declare(
                Declaration::new("pool", ResourceKind::NodePool)
                    .with("cluster", Deferred::<String>::output(&cluster, "name"))
                    .with("serviceAccount", Deferred::<String>::output(&sa, "email"))
                    .depends_on(&cluster),
            )
            .unwrap();
        graph
    }

    #[test]
    fn test_duplicate_declaration_rejected() {
        let mut graph = DeclarationGraph::new();
        graph
            .declare(Declaration::new("gitops", ResourceKind::Cluster))
            .unwrap();
        let err = graph
            .declare(Declaration::new("gitops", ResourceKind::Cluster))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateDeclaration(_)));
    }

    #[test]
    fn test_forward_reference_rejected() {
        let mut graph = DeclarationGraph::new();
        let err = graph
            .declare(
                Declaration::new("pool", ResourceKind::NodePool)
                    .depends_on(&DeclarationId::new("gitops")),
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnknownDependency { .. }));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_self_reference_rejected() {
        let mut graph = DeclarationGraph::new();
        let err = graph
            .declare(
                Declaration::new("gitops", ResourceKind::Cluster)
                    .depends_on(&DeclarationId::new("gitops")),
            )
            .unwrap_err();
        assert!(matches!(err, Error::SelfDependency(_)));
    }

    #[test]
    fn test_edges_record_data_and_explicit_dependencies() {
        let graph = cluster_then_pool();
        let edges = graph.edges();

        let pool = DeclarationId::new("pool");
        let gitops = DeclarationId::new("gitops");
        assert!(edges.contains(&Edge {
            from: gitops.clone(),
            to: pool.clone(),
            kind: EdgeKind::Data,
        }));
        assert!(edges.contains(&Edge {
            from: gitops.clone(),
            to: pool.clone(),
            kind: EdgeKind::Explicit,
        }));
        assert_eq!(graph.dependencies_of(&pool).len(), 3);
        assert_eq!(
            graph.ancestors(&pool),
            BTreeSet::from([gitops, DeclarationId::new("sa")])
        );
    }

    #[test]
    fn test_levels_place_pool_after_cluster() {
        let graph = cluster_then_pool();
        let levels = graph.levels().unwrap();
        assert_eq!(
            levels,
            vec![
                vec![DeclarationId::new("sa"), DeclarationId::new("gitops")],
                vec![DeclarationId::new("pool")],
            ]
        );
        assert!(!graph.has_cycle());
        graph.validate().unwrap();

        let order = graph.topological_order().unwrap();
        let pos = |id: &str| order.iter().position(|d| d.as_str() == id).unwrap();
        assert!(pos("gitops") < pos("pool"));
    }

    #[test]
    fn test_export_requires_known_sources() {
        let mut graph = cluster_then_pool();
        let endpoint = Deferred::<String>::output(&DeclarationId::new("gitops"), "endpoint");
        graph.export("endpoint", endpoint.clone()).unwrap();
        assert!(matches!(
            graph.export("endpoint", endpoint),
            Err(Error::DuplicateExport(_))
        ));

        let stray = Deferred::<String>::output(&DeclarationId::new("other"), "endpoint");
        assert!(graph.export("stray", stray).is_err());
    }

    #[test]
    fn test_dot_output_names_every_declaration() {
        let dot = cluster_then_pool().to_dot();
        assert!(dot.starts_with("digraph declarations {"));
        assert!(dot.contains("gitops"));
        assert!(dot.contains("explicit"));
        assert!(dot.trim_end().ends_with('}'));
    }
}
