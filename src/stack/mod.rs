//! The gitops stack as a declaration graph
//!
//! Declares, in order: a service account, a control plane without its
//! default pool, a preemptible node pool, a kubeconfig derived from the
//! control plane's outputs, a Kubernetes provider bound to that
//! kubeconfig, and the namespace and charts installed through it.

pub mod cluster;
pub mod extensions;
pub mod identity;
pub mod kubeconfig;
pub mod naming;
pub mod node_pool;
pub mod provider;
pub mod transform;
pub mod workload;

use declarative::{DeclarationGraph, Transformation};
use std::sync::Arc;

use crate::config::StackConfig;

use cluster::{ClusterSpec, create_cluster};
use extensions::{ExtensionPoint, extend};
use identity::create_service_identity;
use kubeconfig::{KUBECONFIG_EXPORT, synthesize_kubeconfig};
use node_pool::{NodePoolSpec, create_node_pool};
use provider::bind_provider;
use transform::RewriteApiVersion;
use workload::{ChartSpec, create_namespace, install_chart};

/// Declare the whole stack described by `config`
pub fn declare_gitops_stack(config: &StackConfig) -> declarative::Result<DeclarationGraph> {
    let mut graph = DeclarationGraph::new();

    let identity = create_service_identity(
        &mut graph,
        &config.identity.name,
        &config.identity.account_id,
        &config.identity.display_name,
    )?;

    let cluster = create_cluster(
        &mut graph,
        &ClusterSpec {
            remove_default_node_pool: config.cluster.remove_default_node_pool,
            initial_node_count: config.cluster.initial_node_count,
            ..ClusterSpec::new(&config.cluster.name, &config.region)
        },
    )?;

    let pool = create_node_pool(
        &mut graph,
        &NodePoolSpec {
            oauth_scopes: config.node_pool.oauth_scopes.clone(),
            ..NodePoolSpec::new(
                &config.node_pool.name,
                config.node_pool.node_count,
                &config.node_pool.machine_type,
            )
        },
        &cluster,
        &identity,
    )?;

    log::debug!("node pool `{pool}` runs as `{}`", identity.id);

    let kubeconfig = synthesize_kubeconfig(&cluster.endpoint, &cluster.name, &cluster.master_auth);
    graph.export(KUBECONFIG_EXPORT, kubeconfig.clone())?;

    let provider = bind_provider(&mut graph, &config.provider.name, kubeconfig, &[&cluster])?;

    let namespace = create_namespace(
        &mut graph,
        &config.namespace.name,
        &config.namespace.metadata_name,
        &provider,
    )?;

    let rewrite: Arc<dyn Transformation> = Arc::new(RewriteApiVersion::deprecated_ingress());
    let mut releases = Vec::with_capacity(config.charts.len());
    for chart in &config.charts {
        let transformations = if chart.rewrite_deprecated_apis {
            vec![Arc::clone(&rewrite)]
        } else {
            Vec::new()
        };
        let release = install_chart(
            &mut graph,
            &ChartSpec {
                name: chart.name.clone(),
                chart: chart.chart.clone(),
                repo_url: chart.repo.clone(),
                version: chart.version.clone(),
                values: chart.values.clone(),
            },
            &namespace,
            &transformations,
            &provider,
        )?;
        releases.push(release.id.to_string());
    }

    for point in ExtensionPoint::ALL {
        extend(&graph, point, &provider)?;
    }

    log::info!(
        "declared {} resources with {} edges (charts: {})",
        graph.len(),
        graph.edges().len(),
        releases.join(", ")
    );
    Ok(graph)
}
