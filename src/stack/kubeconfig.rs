//! Kubeconfig synthesis
//!
//! The document is a fixed template: one cluster, one context and one
//! user, all keyed by `pulumi_<cluster name>`. The user authenticates
//! through the gcloud credential helper, so no token is ever embedded.
//! Rendering is pure; [`synthesize_kubeconfig`] lifts it over the
//! cluster's pending outputs.

use declarative::{Deferred, ResolveError};
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use thiserror::Error;

use super::cluster::MasterAuth;

/// Prefix of the identifier shared by the cluster, context and user entries
pub const CONTEXT_PREFIX: &str = "pulumi_";

/// Key under which the rendered document is exported
pub const KUBECONFIG_EXPORT: &str = "kubeconfig";

pub const AUTH_PROVIDER: &str = "gcp";
pub const CMD_PATH: &str = "gcloud";
pub const CMD_ARGS: &str = "config config-helper --format=json";
pub const EXPIRY_KEY: &str = "{.credential.token_expiry}";
pub const TOKEN_KEY: &str = "{.credential.access_token}";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KubeconfigError {
    #[error("cannot render kubeconfig: {0} is empty")]
    EmptyInput(&'static str),

    #[error("kubeconfig is not valid YAML: {0}")]
    Parse(String),

    #[error("invalid kubeconfig: {0}")]
    Invalid(String),
}

/// Identifier used in all five name positions of the document
pub fn context_name(cluster_name: &str) -> String {
    format!("{CONTEXT_PREFIX}{cluster_name}")
}

/// Render the kubeconfig for a resolved cluster.
///
/// Output is byte-identical for identical inputs. Empty inputs are
/// rejected, and so is anything that would not read back as a complete
/// document.
pub fn render_kubeconfig(
    endpoint: &str,
    cluster_name: &str,
    ca_certificate: &str,
) -> Result<String, KubeconfigError> {
    for (field, value) in [
        ("endpoint", endpoint),
        ("cluster name", cluster_name),
        ("CA certificate", ca_certificate),
    ] {
        if value.trim().is_empty() {
            return Err(KubeconfigError::EmptyInput(field));
        }
    }

    let id = context_name(cluster_name);
    let document = format!(
        "apiVersion: v1
clusters:
- cluster:
    certificate-authority-data: {ca_certificate}
    server: https://{endpoint}
  name: {id}
contexts:
- context:
    cluster: {id}
    user: {id}
  name: {id}
current-context: {id}
kind: Config
preferences: {{}}
users:
- name: {id}
  user:
    auth-provider:
      config:
        cmd-args: {CMD_ARGS}
        cmd-path: {CMD_PATH}
        expiry-key: '{EXPIRY_KEY}'
        token-key: '{TOKEN_KEY}'
      name: {AUTH_PROVIDER}"
    );

    let parsed = Kubeconfig::parse(&document)?;
    if parsed.validate()? != id {
        return Err(KubeconfigError::Invalid(format!(
            "context does not read back as `{id}`"
        )));
    }
    Ok(document)
}

/// Lift [`render_kubeconfig`] over the cluster's pending outputs.
///
/// Returns immediately; the document exists once all three inputs
/// resolve. A rendering failure surfaces as a resolution error.
pub fn synthesize_kubeconfig(
    endpoint: &Deferred<String>,
    cluster_name: &Deferred<String>,
    master_auth: &Deferred<MasterAuth>,
) -> Deferred<String> {
    endpoint
        .zip(cluster_name)
        .zip(master_auth)
        .try_apply(|((endpoint, name), auth)| {
            if auth.has_client_credentials() {
                log::debug!(
                    "ignoring client credentials of cluster `{name}`, kubeconfig uses gcloud"
                );
            }
            render_kubeconfig(&endpoint, &name, &auth.cluster_ca_certificate)
                .map_err(|e| ResolveError::invalid(e.to_string()))
        })
}

/// Typed view of a kubeconfig, used to check documents we render and accept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kubeconfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub clusters: Vec<NamedCluster>,
    pub contexts: Vec<NamedContext>,
    #[serde(rename = "current-context")]
    pub current_context: String,
    pub kind: String,
    #[serde(default)]
    pub preferences: Mapping,
    pub users: Vec<NamedUser>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCluster {
    pub cluster: ClusterEntry,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterEntry {
    pub certificate_authority_data: String,
    pub server: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedContext {
    pub context: ContextEntry,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub cluster: String,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    pub user: UserEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserEntry {
    pub auth_provider: AuthProvider,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthProvider {
    pub config: AuthProviderConfig,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthProviderConfig {
    pub cmd_args: String,
    pub cmd_path: String,
    pub expiry_key: String,
    pub token_key: String,
}

impl Kubeconfig {
    pub fn parse(text: &str) -> Result<Self, KubeconfigError> {
        serde_yaml::from_str(text).map_err(|e| KubeconfigError::Parse(e.to_string()))
    }

    /// Check the single-cluster shape and return the shared identifier
    pub fn validate(&self) -> Result<&str, KubeconfigError> {
        if self.kind != "Config" {
            return Err(KubeconfigError::Invalid(format!(
                "kind is `{}`, expected `Config`",
                self.kind
            )));
        }
        let ([cluster], [context], [user]) = (
            self.clusters.as_slice(),
            self.contexts.as_slice(),
            self.users.as_slice(),
        ) else {
            return Err(KubeconfigError::Invalid(
                "expected exactly one cluster, context and user".into(),
            ));
        };

        let id = self.current_context.as_str();
        let positions = [
            ("cluster name", cluster.name.as_str()),
            ("context name", context.name.as_str()),
            ("context cluster", context.context.cluster.as_str()),
            ("context user", context.context.user.as_str()),
            ("user name", user.name.as_str()),
        ];
        if let Some((position, value)) = positions.iter().find(|(_, value)| *value != id) {
            return Err(KubeconfigError::Invalid(format!(
                "{position} `{value}` does not match current-context `{id}`"
            )));
        }

        if !cluster.cluster.server.starts_with("https://") {
            return Err(KubeconfigError::Invalid(format!(
                "server `{}` is not an https URL",
                cluster.cluster.server
            )));
        }
        if user.user.auth_provider.name != AUTH_PROVIDER {
            return Err(KubeconfigError::Invalid(format!(
                "unsupported auth provider `{}`",
                user.user.auth_provider.name
            )));
        }
        Ok(id)
    }

    /// API server URL of the only cluster entry
    pub fn server(&self) -> Option<&str> {
        self.clusters.first().map(|c| c.cluster.server.as_str())
    }
}
