//! Managed Kubernetes control plane

use declarative::{Declaration, DeclarationGraph, DeclarationId, Deferred, Error, ResourceKind};
use serde::{Deserialize, Serialize};

use super::naming;

/// Credentials the control plane hands out once it is up
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterAuth {
    /// Base64-encoded PEM of the cluster CA
    pub cluster_ca_certificate: String,
    #[serde(default)]
    pub client_certificate: Option<String>,
    #[serde(default)]
    pub client_key: Option<String>,
}

impl MasterAuth {
    /// Whether the control plane issued a client certificate and key
    pub fn has_client_credentials(&self) -> bool {
        self.client_certificate.as_deref().is_some_and(|c| !c.is_empty())
            && self.client_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// Control plane arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSpec {
    pub name: String,
    pub location: String,
    /// Drop the default pool right after creation so capacity comes only from declared pools
    pub remove_default_node_pool: bool,
    pub initial_node_count: u32,
}

impl ClusterSpec {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            remove_default_node_pool: true,
            initial_node_count: 1,
        }
    }
}

/// A declared cluster and its pending runtime attributes
#[derive(Debug, Clone)]
pub struct ClusterHandle {
    pub id: DeclarationId,
    pub location: String,
    pub endpoint: Deferred<String>,
    pub name: Deferred<String>,
    pub master_auth: Deferred<MasterAuth>,
}

/// Declare a control plane.
pub fn create_cluster(
    graph: &mut DeclarationGraph,
    spec: &ClusterSpec,
) -> declarative::Result<ClusterHandle> {
    let id = DeclarationId::new(spec.name.as_str());
    naming::check_gke_name(&spec.name)
        .and_then(|()| naming::check_location(&spec.location))
        .map_err(|message| Error::invalid(&id, ResourceKind::Cluster, message))?;
    if spec.initial_node_count == 0 {
        return Err(Error::invalid(
            &id,
            ResourceKind::Cluster,
            "initial node count must be at least 1",
        ));
    }

    let id = graph.declare(
        Declaration::new(id, ResourceKind::Cluster)
            .describe(format!("GKE cluster {} in {}", spec.name, spec.location))
            .with("name", spec.name.as_str())
            .with("location", spec.location.as_str())
            .with("removeDefaultNodePool", spec.remove_default_node_pool)
            .with("initialNodeCount", spec.initial_node_count),
    )?;

    Ok(ClusterHandle {
        endpoint: Deferred::output(&id, "endpoint"),
        name: Deferred::output(&id, "name"),
        master_auth: Deferred::output(&id, "masterAuth"),
        location: spec.location.clone(),
        id,
    })
}
