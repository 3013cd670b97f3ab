//! Kubernetes client bound to a cluster

use declarative::{Declaration, DeclarationGraph, DeclarationId, Deferred, Error, ResourceKind};

use super::cluster::ClusterHandle;

/// Handle for submitting in-cluster declarations
#[derive(Debug, Clone)]
pub struct ProviderHandle {
    pub id: DeclarationId,
}

/// Declare a client for the cluster described by `kubeconfig`.
///
/// The kubeconfig already carries a data edge on the cluster's outputs,
/// but outputs can be known before the control plane serves requests,
/// so the provider is also ordered after each cluster resource.
pub fn bind_provider(
    graph: &mut DeclarationGraph,
    name: &str,
    kubeconfig: Deferred<String>,
    depends_on: &[&ClusterHandle],
) -> declarative::Result<ProviderHandle> {
    let id = DeclarationId::new(name);
    if depends_on.is_empty() {
        return Err(Error::invalid(
            &id,
            ResourceKind::Provider,
            "a provider must be ordered after the cluster it targets",
        ));
    }

    let declaration = depends_on.iter().fold(
        Declaration::new(id, ResourceKind::Provider)
            .describe("Kubernetes provider")
            .with("kubeconfig", kubeconfig),
        |declaration, cluster| declaration.depends_on(&cluster.id),
    );

    Ok(ProviderHandle {
        id: graph.declare(declaration)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::cluster::{ClusterSpec, create_cluster};
    use crate::stack::kubeconfig::synthesize_kubeconfig;
    use declarative::EdgeKind;

    #[test]
    fn test_provider_depends_on_cluster_resource_and_outputs() {
        let mut graph = DeclarationGraph::new();
        let cluster = create_cluster(&mut graph, &ClusterSpec::new("gitops", "us-east1")).unwrap();
        let kubeconfig =
            synthesize_kubeconfig(&cluster.endpoint, &cluster.name, &cluster.master_auth);
        let provider = bind_provider(&mut graph, "k8sprovider", kubeconfig, &[&cluster]).unwrap();

        let deps = graph.dependencies_of(&provider.id);
        assert_eq!(
            deps,
            vec![
                (cluster.id.clone(), EdgeKind::Data),
                (cluster.id.clone(), EdgeKind::Explicit),
            ]
        );
    }

    #[test]
    fn test_provider_requires_a_cluster() {
        let mut graph = DeclarationGraph::new();
        let err = bind_provider(&mut graph, "k8sprovider", Deferred::known(String::new()), &[])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDeclaration { .. }));
    }
}
