//! Preemptible compute pool attached to a cluster

use declarative::{Declaration, DeclarationGraph, DeclarationId, Error, ResourceKind};
use serde_json::json;

use super::cluster::ClusterHandle;
use super::identity::IdentityHandle;
use super::naming;

/// Broad platform scope; access is narrowed through IAM on the service account
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Node pool arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePoolSpec {
    pub name: String,
    pub node_count: u32,
    pub machine_type: String,
    pub oauth_scopes: Vec<String>,
}

impl NodePoolSpec {
    pub fn new(name: impl Into<String>, node_count: u32, machine_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node_count,
            machine_type: machine_type.into(),
            oauth_scopes: vec![CLOUD_PLATFORM_SCOPE.to_string()],
        }
    }
}

/// Declare a preemptible pool on `cluster`, running as `identity`.
///
/// The pool reads the cluster's name, and is also ordered after the
/// cluster resource explicitly.
pub fn create_node_pool(
    graph: &mut DeclarationGraph,
    spec: &NodePoolSpec,
    cluster: &ClusterHandle,
    identity: &IdentityHandle,
) -> declarative::Result<DeclarationId> {
    let id = DeclarationId::new(spec.name.as_str());
    naming::check_gke_name(&spec.name)
        .map_err(|message| Error::invalid(&id, ResourceKind::NodePool, message))?;
    if spec.node_count == 0 {
        return Err(Error::invalid(
            &id,
            ResourceKind::NodePool,
            "node count must be at least 1",
        ));
    }
    if spec.oauth_scopes.is_empty() {
        return Err(Error::invalid(
            &id,
            ResourceKind::NodePool,
            "at least one OAuth scope is required",
        ));
    }

    let node_config = identity.email.apply({
        let machine_type = spec.machine_type.clone();
        let scopes = spec.oauth_scopes.clone();
        move |email| {
            json!({
                "preemptible": true,
                "machineType": machine_type,
                "serviceAccount": email,
                "oauthScopes": scopes,
            })
        }
    });

    graph.declare(
        Declaration::new(id, ResourceKind::NodePool)
            .describe(format!(
                "{} x {} preemptible nodes",
                spec.node_count, spec.machine_type
            ))
            .with("location", cluster.location.as_str())
            .with("cluster", cluster.name.clone())
            .with("nodeCount", spec.node_count)
            .with("nodeConfig", node_config)
            .depends_on(&cluster.id),
    )
}
