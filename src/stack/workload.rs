//! In-cluster workloads: namespaces and chart releases

use declarative::{
    Declaration, DeclarationGraph, DeclarationId, Error, ResourceKind, Transformation,
};
use serde_json::{Value, json};
use std::sync::Arc;

use super::naming;
use super::provider::ProviderHandle;

/// A declared namespace
#[derive(Debug, Clone)]
pub struct NamespaceHandle {
    pub id: DeclarationId,
    /// `metadata.name` of the namespace object
    pub name: String,
}

/// A declared chart release
#[derive(Debug, Clone)]
pub struct ChartHandle {
    pub id: DeclarationId,
}

/// Chart release arguments
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    /// Logical name, also the release name
    pub name: String,
    pub chart: String,
    pub repo_url: String,
    pub version: Option<String>,
    /// Chart values; must be an object
    pub values: Value,
}

/// Declare a namespace through `provider`.
pub fn create_namespace(
    graph: &mut DeclarationGraph,
    name: &str,
    metadata_name: &str,
    provider: &ProviderHandle,
) -> declarative::Result<NamespaceHandle> {
    let id = DeclarationId::new(name);
    naming::check_dns_label(metadata_name)
        .map_err(|message| Error::invalid(&id, ResourceKind::Namespace, message))?;

    let id = graph.declare(
        Declaration::new(id, ResourceKind::Namespace)
            .describe(format!("Namespace {metadata_name}"))
            .with("metadata", json!({ "name": metadata_name }))
            .with_provider(&provider.id),
    )?;

    Ok(NamespaceHandle {
        id,
        name: metadata_name.to_string(),
    })
}

/// Install a chart into `namespace` through `provider`.
///
/// Chart objects are namespaced, so the release is ordered after the
/// namespace explicitly. `transformations` run over every rendered
/// object, in order, before submission.
pub fn install_chart(
    graph: &mut DeclarationGraph,
    spec: &ChartSpec,
    namespace: &NamespaceHandle,
    transformations: &[Arc<dyn Transformation>],
    provider: &ProviderHandle,
) -> declarative::Result<ChartHandle> {
    let id = DeclarationId::new(spec.name.as_str());
    let invalid = |message: String| Error::invalid(&id, ResourceKind::Chart, message);

    naming::check_dns_label(&spec.name).map_err(invalid)?;
    if spec.chart.is_empty() {
        return Err(invalid("chart name is empty".into()));
    }
    if !(spec.repo_url.starts_with("https://") || spec.repo_url.starts_with("http://")) {
        return Err(invalid(format!(
            "repository `{}` is not an http(s) URL",
            spec.repo_url
        )));
    }
    if !spec.values.is_object() {
        return Err(invalid("values must be a table".into()));
    }

    let mut declaration = Declaration::new(id.clone(), ResourceKind::Chart)
        .describe(format!("Chart {} from {}", spec.chart, spec.repo_url))
        .with("chart", spec.chart.as_str())
        .with("namespace", namespace.name.as_str())
        .with("repo", spec.repo_url.as_str())
        .with("values", spec.values.clone())
        .depends_on(&namespace.id)
        .with_provider(&provider.id);
    if let Some(version) = &spec.version {
        declaration = declaration.with("version", version.as_str());
    }
    for transformation in transformations {
        declaration = declaration.with_transformation(Arc::clone(transformation));
    }

    Ok(ChartHandle {
        id: graph.declare(declaration)?,
    })
}
