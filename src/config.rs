//! Stack configuration
//!
//! Every field has a default, so an empty or missing `stack.toml`
//! declares the stock gitops stack.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;
use crate::stack::naming;
use crate::stack::node_pool::CLOUD_PLATFORM_SCOPE;

pub const CONFIG_FILE: &str = "stack.toml";

// ============================================================================
// Config Schema
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// GCP project the resources live in
    pub project: String,
    /// Region of the cluster and its node pool
    pub region: String,
    pub identity: IdentityConfig,
    pub cluster: ClusterConfig,
    pub node_pool: NodePoolConfig,
    pub provider: ProviderConfig,
    pub namespace: NamespaceConfig,
    pub charts: Vec<ChartConfig>,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            project: "gitops-stack".into(),
            region: "us-east1".into(),
            identity: IdentityConfig::default(),
            cluster: ClusterConfig::default(),
            node_pool: NodePoolConfig::default(),
            provider: ProviderConfig::default(),
            namespace: NamespaceConfig::default(),
            charts: vec![ChartConfig::ingress_nginx(), ChartConfig::argo_cd()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Logical name in the graph
    pub name: String,
    pub account_id: String,
    pub display_name: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: "_default".into(),
            account_id: "service-account-id".into(),
            display_name: "Service Account".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub name: String,
    pub remove_default_node_pool: bool,
    pub initial_node_count: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: "gitops".into(),
            remove_default_node_pool: true,
            initial_node_count: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodePoolConfig {
    pub name: String,
    pub node_count: u32,
    pub machine_type: String,
    pub oauth_scopes: Vec<String>,
}

impl Default for NodePoolConfig {
    fn default() -> Self {
        Self {
            name: "gitops-preemptiblenodes".into(),
            node_count: 1,
            machine_type: "e2-medium".into(),
            oauth_scopes: vec![CLOUD_PLATFORM_SCOPE.into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub name: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "k8sprovider".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
    /// Logical name in the graph
    pub name: String,
    /// `metadata.name` of the namespace object
    pub metadata_name: String,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            name: "pulumi-test".into(),
            metadata_name: "pulumi-test-ns".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    /// Release name
    pub name: String,
    pub chart: String,
    pub repo: String,
    #[serde(default)]
    pub version: Option<String>,
    /// Rewrite `extensions/v1beta1` objects to `networking.k8s.io/v1beta1`
    #[serde(default = "default_true")]
    pub rewrite_deprecated_apis: bool,
    #[serde(default = "empty_values")]
    pub values: Value,
}

fn empty_values() -> Value {
    Value::Object(serde_json::Map::new())
}

const fn default_true() -> bool {
    true
}

impl ChartConfig {
    pub fn ingress_nginx() -> Self {
        Self {
            name: "ingress-nginx".into(),
            chart: "ingress-nginx".into(),
            repo: "https://kubernetes.github.io/ingress-nginx".into(),
            version: None,
            rewrite_deprecated_apis: true,
            values: json!({ "controller": { "publishService": { "enabled": true } } }),
        }
    }

    pub fn argo_cd() -> Self {
        Self {
            name: "argo-cd".into(),
            chart: "argo-cd".into(),
            repo: "https://argoproj.github.io/argo-helm".into(),
            version: None,
            rewrite_deprecated_apis: true,
            values: json!({ "server": { "ingress": { "enabled": true } } }),
        }
    }
}

// ============================================================================
// Loading and Validation
// ============================================================================

impl StackConfig {
    /// Default config file location
    pub fn default_path() -> Result<PathBuf> {
        Ok(paths::config_dir()?.join(CONFIG_FILE))
    }

    /// Load from `path`, or from the default location when it exists.
    ///
    /// Returns the file that was read, if any.
    pub fn load(path: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = Self::default_path()?;
                if !default.exists() {
                    log::debug!(
                        "No config at {}, using built-in defaults",
                        default.display()
                    );
                    return Ok((Self::default(), None));
                }
                default
            }
        };

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        log::debug!("Loaded config from {}", path.display());
        Ok((config, Some(path)))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Invalid TOML format")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate names against GCP and Kubernetes rules
    pub fn validate(&self) -> Result<()> {
        if self.project.is_empty() {
            anyhow::bail!("Project cannot be empty");
        }
        naming::check_location(&self.region).map_err(anyhow::Error::msg)?;
        naming::check_account_id(&self.identity.account_id)
            .map_err(anyhow::Error::msg)
            .context("Invalid identity")?;
        naming::check_gke_name(&self.cluster.name)
            .map_err(anyhow::Error::msg)
            .context("Invalid cluster")?;
        naming::check_gke_name(&self.node_pool.name)
            .map_err(anyhow::Error::msg)
            .context("Invalid node pool")?;
        naming::check_dns_label(&self.namespace.metadata_name)
            .map_err(anyhow::Error::msg)
            .context("Invalid namespace")?;

        let mut seen = HashSet::new();
        for chart in &self.charts {
            naming::check_dns_label(&chart.name)
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("Invalid chart '{}'", chart.name))?;
            if !seen.insert(chart.name.as_str()) {
                anyhow::bail!("Chart '{}' is declared twice", chart.name);
            }
            if !chart.values.is_object() {
                anyhow::bail!("Values of chart '{}' must be a table", chart.name);
            }
        }
        Ok(())
    }

    /// Serialize as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_stock_stack() {
        let config = StackConfig::default();
        assert_eq!(config.region, "us-east1");
        assert_eq!(config.cluster.name, "gitops");
        assert!(config.cluster.remove_default_node_pool);
        assert_eq!(config.node_pool.machine_type, "e2-medium");
        assert_eq!(config.node_pool.oauth_scopes, vec![CLOUD_PLATFORM_SCOPE]);
        assert_eq!(config.namespace.metadata_name, "pulumi-test-ns");
        assert_eq!(config.charts.len(), 2);
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(StackConfig::from_toml("").unwrap(), StackConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = StackConfig::from_toml(
            r#"
region = "europe-west4"

[cluster]
name = "platform"

[[charts]]
name = "podinfo"
chart = "podinfo"
repo = "https://stefanprodan.github.io/podinfo"
values = { replicaCount = 2 }
"#,
        )
        .unwrap();

        assert_eq!(config.region, "europe-west4");
        assert_eq!(config.cluster.name, "platform");
        assert_eq!(config.cluster.initial_node_count, 1);
        assert_eq!(config.charts.len(), 1);
        assert_eq!(config.charts[0].values["replicaCount"], 2);
        assert!(config.charts[0].rewrite_deprecated_apis);
    }

    #[test]
    fn test_two_digit_regions_accepted() {
        let config = StackConfig::from_toml("region = \"europe-west10\"").unwrap();
        assert_eq!(config.region, "europe-west10");
        assert!(StackConfig::from_toml("region = \"europe-west\"").is_err());
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = StackConfig::default();
        let text = config.to_toml().unwrap();
        assert_eq!(StackConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_names_rejected() {
        let err = StackConfig::from_toml("[identity]\naccount_id = \"sa\"").unwrap_err();
        assert!(format!("{err:#}").contains("Invalid identity"));

        let duplicate = r#"
[[charts]]
name = "argo-cd"
chart = "argo-cd"
repo = "https://argoproj.github.io/argo-helm"

[[charts]]
name = "argo-cd"
chart = "argo-cd"
repo = "https://argoproj.github.io/argo-helm"
"#;
        assert!(StackConfig::from_toml(duplicate).is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "project = \"acme-platform\"\n").unwrap();

        let (config, loaded) = StackConfig::load(Some(&path)).unwrap();
        assert_eq!(config.project, "acme-platform");
        assert_eq!(loaded, Some(path));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(StackConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
