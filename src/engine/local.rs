//! Local provisioning engine
//!
//! Converges declarations against a state file instead of a cloud API.
//! Outputs are derived deterministically from the project and the
//! resolved config, so repeated runs produce identical documents. The
//! checks a real control plane would make (unknown cluster, missing
//! namespace, unserved API version) are enforced here too.

use anyhow::{Context, Result, bail};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use declarative::{
    Applied, ApplyResult, DeclarationId, Engine, Observed, Outputs, ResourceKind, ResourceRequest,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::state::StackState;
use crate::stack::kubeconfig::Kubeconfig;
use crate::stack::naming;

/// API versions the simulated API server accepts
const SERVED_API_VERSIONS: &[&str] = &[
    "v1",
    "apps/v1",
    "networking.k8s.io/v1beta1",
    "networking.k8s.io/v1",
];

pub struct LocalEngine {
    project: String,
    state: Mutex<StackState>,
    path: Option<PathBuf>,
}

impl LocalEngine {
    /// Engine whose state lives only as long as the value
    #[cfg(test)]
    pub fn in_memory(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            state: Mutex::new(StackState::default()),
            path: None,
        }
    }

    /// Engine backed by the state file at `path`
    pub fn open(project: impl Into<String>, path: &Path) -> Result<Self> {
        Ok(Self {
            project: project.into(),
            state: Mutex::new(StackState::load(path)?),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Persist the state, stamping the run time
    pub fn save(&self) -> Result<()> {
        let mut state = self.lock();
        state.last_run = Some(Utc::now());
        match &self.path {
            Some(path) => state.save(path),
            None => Ok(()),
        }
    }

    pub fn record_exports(&self, exports: &BTreeMap<String, String>) {
        let mut state = self.lock();
        for (key, value) in exports {
            state.exports.insert(key.clone(), value.clone());
        }
    }

    pub fn snapshot(&self) -> StackState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, StackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn provision(&self, request: &ResourceRequest, state: &StackState) -> Result<Outputs> {
        let outputs = match request.kind {
            ResourceKind::Identity => self.provision_identity(request)?,
            ResourceKind::Cluster => self.provision_cluster(request)?,
            ResourceKind::NodePool => provision_node_pool(request, state)?,
            ResourceKind::Provider => provision_provider(request, state)?,
            ResourceKind::Namespace => provision_namespace(request, state)?,
            ResourceKind::Chart => provision_chart(request, state)?,
        };
        match outputs {
            Value::Object(map) => Ok(map),
            other => bail!("engine produced non-object outputs: {other}"),
        }
    }

    fn provision_identity(&self, request: &ResourceRequest) -> Result<Value> {
        let account_id = required(request, "accountId")?;
        naming::check_account_id(account_id).map_err(anyhow::Error::msg)?;
        let email = format!("{account_id}@{}.iam.gserviceaccount.com", self.project);
        Ok(json!({
            "accountId": account_id,
            "displayName": request.str_param("displayName").unwrap_or_default(),
            "email": email,
            "name": format!("projects/{}/serviceAccounts/{email}", self.project),
        }))
    }

    fn provision_cluster(&self, request: &ResourceRequest) -> Result<Value> {
        let name = required(request, "name")?;
        let location = required(request, "location")?;

        let digest = blake3::hash(format!("{}/{location}/{name}", self.project).as_bytes());
        let bytes = digest.as_bytes();
        let endpoint = format!("34.{}.{}.{}", bytes[0], bytes[1], bytes[2]);
        let pem = format!(
            "-----BEGIN CERTIFICATE-----\n{}\n-----END CERTIFICATE-----\n",
            BASE64.encode(bytes)
        );

        Ok(json!({
            "name": name,
            "location": location,
            "endpoint": endpoint,
            "masterAuth": {
                "clusterCaCertificate": BASE64.encode(pem),
                "clientCertificate": null,
                "clientKey": null,
            },
        }))
    }
}

impl Engine for LocalEngine {
    fn current_state(&self, kind: ResourceKind, id: &DeclarationId) -> Result<Observed> {
        let state = self.lock();
        match state.get(id.as_str()) {
            Some(record) if record.kind != kind => bail!(
                "`{id}` is recorded as a {}, not a {kind}",
                record.kind
            ),
            Some(record) => Ok(Observed::present(
                record.fingerprint.clone(),
                record.outputs.clone(),
            )),
            None => Ok(Observed::absent()),
        }
    }

    fn apply(&self, request: &ResourceRequest) -> Result<Applied> {
        let fingerprint = request.fingerprint();
        let snapshot = {
            let state = self.lock();
            if let Some(record) = state.get(request.id.as_str())
                && record.fingerprint == fingerprint
            {
                log::debug!("{} `{}` is up to date", request.kind, request.id);
                return Ok(Applied::new(ApplyResult::NoChange, record.outputs.clone()));
            }
            state.clone()
        };

        let outputs = self
            .provision(request, &snapshot)
            .with_context(|| format!("{} `{}`", request.kind, request.id))?;

        let created = self.lock().record(
            request.id.as_str(),
            request.kind,
            fingerprint,
            outputs.clone(),
        );
        log::info!(
            "{} {} `{}`",
            if created { "created" } else { "updated" },
            request.kind,
            request.id
        );
        let result = if created {
            ApplyResult::Created
        } else {
            ApplyResult::Modified
        };
        Ok(Applied::new(result, outputs))
    }
}

fn required<'a>(request: &'a ResourceRequest, key: &str) -> Result<&'a str> {
    request
        .str_param(key)
        .filter(|value| !value.is_empty())
        .with_context(|| format!("missing required parameter `{key}`"))
}

fn provision_node_pool(request: &ResourceRequest, state: &StackState) -> Result<Value> {
    let cluster = required(request, "cluster")?;
    let known = state
        .of_kind(ResourceKind::Cluster)
        .any(|(_, record)| record.outputs.get("name").and_then(Value::as_str) == Some(cluster));
    if !known {
        bail!("cluster `{cluster}` does not exist");
    }

    let node_config = request
        .config
        .get("nodeConfig")
        .context("missing required parameter `nodeConfig`")?;
    let service_account = node_config
        .get("serviceAccount")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let has_identity = state.of_kind(ResourceKind::Identity).any(|(_, record)| {
        record.outputs.get("email").and_then(Value::as_str) == Some(service_account)
    });
    if !has_identity {
        bail!("service account `{service_account}` does not exist");
    }

    Ok(json!({
        "name": request.id.as_str(),
        "cluster": cluster,
        "nodeCount": request.config.get("nodeCount").cloned().unwrap_or(Value::Null),
        "nodeConfig": node_config,
    }))
}

fn provision_provider(request: &ResourceRequest, state: &StackState) -> Result<Value> {
    let text = required(request, "kubeconfig")?;
    let kubeconfig = Kubeconfig::parse(text)?;
    let context = kubeconfig.validate()?.to_string();
    let server = kubeconfig.server().unwrap_or_default();

    let reachable = state.of_kind(ResourceKind::Cluster).any(|(_, record)| {
        record
            .outputs
            .get("endpoint")
            .and_then(Value::as_str)
            .is_some_and(|endpoint| server == format!("https://{endpoint}"))
    });
    if !reachable {
        bail!("no known cluster serves {server}");
    }

    Ok(json!({ "context": context, "server": server }))
}

fn require_provider(request: &ResourceRequest, state: &StackState) -> Result<()> {
    let provider = request
        .provider
        .as_ref()
        .context("in-cluster resource has no provider")?;
    match state.get(provider.as_str()) {
        Some(record) if record.kind == ResourceKind::Provider => Ok(()),
        _ => bail!("provider `{provider}` is not configured"),
    }
}

fn provision_namespace(request: &ResourceRequest, state: &StackState) -> Result<Value> {
    require_provider(request, state)?;
    let name = request
        .config
        .get("metadata")
        .and_then(|metadata| metadata.get("name"))
        .and_then(Value::as_str)
        .context("missing required parameter `metadata.name`")?;
    naming::check_dns_label(name).map_err(anyhow::Error::msg)?;
    Ok(json!({ "metadata": { "name": name }, "status": "Active" }))
}

fn provision_chart(request: &ResourceRequest, state: &StackState) -> Result<Value> {
    require_provider(request, state)?;
    let chart = required(request, "chart")?;
    let namespace = required(request, "namespace")?;
    let release = request.id.as_str();

    let exists = state.of_kind(ResourceKind::Namespace).any(|(_, record)| {
        record
            .outputs
            .get("metadata")
            .and_then(|metadata| metadata.get("name"))
            .and_then(Value::as_str)
            == Some(namespace)
    });
    if !exists {
        bail!("namespaces \"{namespace}\" not found");
    }

    let values = request.config.get("values").cloned().unwrap_or(json!({}));
    let mut objects = render_chart(release, chart, namespace, &values);
    for object in &mut objects {
        for transformation in &request.transformations {
            transformation.transform(object)?;
        }
    }

    let mut resources = Vec::with_capacity(objects.len());
    for object in &objects {
        let api_version = object
            .get("apiVersion")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let kind = object.get("kind").and_then(Value::as_str).unwrap_or_default();
        if !SERVED_API_VERSIONS.contains(&api_version) {
            bail!("no matches for kind \"{kind}\" in version \"{api_version}\"");
        }
        resources.push(json!({
            "apiVersion": api_version,
            "kind": kind,
            "name": object["metadata"]["name"],
        }));
    }

    Ok(json!({
        "release": release,
        "chart": chart,
        "namespace": namespace,
        "version": request.config.get("version").cloned().unwrap_or(Value::Null),
        "status": "deployed",
        "resources": resources,
    }))
}

/// Objects a chart renders: a deployment, its service and an ingress
/// still on the legacy extensions API
fn render_chart(release: &str, chart: &str, namespace: &str, values: &Value) -> Vec<Value> {
    let metadata = json!({
        "name": release,
        "namespace": namespace,
        "labels": {
            "app.kubernetes.io/name": chart,
            "app.kubernetes.io/instance": release,
        },
    });
    let replicas = values
        .get("replicaCount")
        .and_then(Value::as_u64)
        .unwrap_or(1);

    vec![
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": metadata,
            "spec": { "replicas": replicas },
        }),
        json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": metadata,
            "spec": { "ports": [{ "port": 80 }] },
        }),
        json!({
            "apiVersion": "extensions/v1beta1",
            "kind": "Ingress",
            "metadata": metadata,
            "spec": { "backend": { "serviceName": release, "servicePort": 80 } },
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StackConfig;
    use crate::stack::declare_gitops_stack;
    use crate::stack::kubeconfig::{KUBECONFIG_EXPORT, render_kubeconfig};
    use declarative::{Error, ExecuteOptions, execute_simple};
    use pretty_assertions::assert_eq;

    fn opts() -> ExecuteOptions {
        ExecuteOptions {
            jobs: 2,
            ..Default::default()
        }
    }

    fn outputs_of<'a>(state: &'a StackState, id: &str) -> &'a Outputs {
        &state.get(id).unwrap().outputs
    }

    #[test]
    fn test_stock_stack_applies_end_to_end() {
        let config = StackConfig::default();
        let graph = declare_gitops_stack(&config).unwrap();
        let engine = LocalEngine::in_memory(&config.project);

        let execution = execute_simple(&graph, &engine, &opts()).unwrap();
        assert_eq!(execution.summary.created, 7);

        let state = engine.snapshot();
        let cluster = outputs_of(&state, "gitops");
        let expected = render_kubeconfig(
            cluster["endpoint"].as_str().unwrap(),
            cluster["name"].as_str().unwrap(),
            cluster["masterAuth"]["clusterCaCertificate"].as_str().unwrap(),
        )
        .unwrap();
        assert_eq!(execution.exports[KUBECONFIG_EXPORT], expected);

        assert_eq!(
            outputs_of(&state, "_default")["email"],
            "service-account-id@gitops-stack.iam.gserviceaccount.com"
        );
        let pool = outputs_of(&state, "gitops-preemptiblenodes");
        assert_eq!(pool["nodeConfig"]["preemptible"], true);
        assert_eq!(
            pool["nodeConfig"]["serviceAccount"],
            outputs_of(&state, "_default")["email"]
        );

        let ingress = &outputs_of(&state, "argo-cd")["resources"][2];
        assert_eq!(ingress["kind"], "Ingress");
        assert_eq!(ingress["apiVersion"], "networking.k8s.io/v1beta1");
    }

    #[test]
    fn test_second_run_changes_nothing() {
        let config = StackConfig::default();
        let graph = declare_gitops_stack(&config).unwrap();
        let engine = LocalEngine::in_memory(&config.project);

        let first = execute_simple(&graph, &engine, &opts()).unwrap();
        let second = execute_simple(&graph, &engine, &opts()).unwrap();
        assert_eq!(second.summary.total_changes(), 0);
        assert_eq!(second.summary.no_change, 7);
        assert_eq!(second.exports, first.exports);
    }

    #[test]
    fn test_legacy_ingress_rejected_without_rewrite() {
        let mut config = StackConfig::default();
        config.charts[1].rewrite_deprecated_apis = false;
        let graph = declare_gitops_stack(&config).unwrap();
        let engine = LocalEngine::in_memory(&config.project);

        // One job, so the sibling release runs before the failing one
        let sequential = ExecuteOptions {
            jobs: 1,
            ..Default::default()
        };
        let err = execute_simple(&graph, &engine, &sequential).unwrap_err();
        match err {
            Error::Provisioning { id, message, .. } => {
                assert_eq!(id.as_str(), "argo-cd");
                assert!(message.contains("no matches for kind \"Ingress\""));
            }
            other => panic!("unexpected error: {other}"),
        }

        // Fatal for that release only
        let state = engine.snapshot();
        assert!(state.get("pulumi-test").is_some());
        assert_eq!(outputs_of(&state, "ingress-nginx")["status"], "deployed");
        assert!(state.get("argo-cd").is_none());
    }

    /// Delegates to a local engine, failing every declaration of one kind
    struct FailingKind<'a> {
        inner: &'a LocalEngine,
        kind: ResourceKind,
    }

    impl Engine for FailingKind<'_> {
        fn current_state(&self, kind: ResourceKind, id: &DeclarationId) -> Result<Observed> {
            self.inner.current_state(kind, id)
        }

        fn apply(&self, request: &ResourceRequest) -> Result<Applied> {
            if request.kind == self.kind {
                bail!("namespaces is forbidden: caller lacks permission");
            }
            self.inner.apply(request)
        }
    }

    #[test]
    fn test_namespace_failure_stops_its_charts() {
        let config = StackConfig::default();
        let graph = declare_gitops_stack(&config).unwrap();
        let local = LocalEngine::in_memory(&config.project);
        let engine = FailingKind {
            inner: &local,
            kind: ResourceKind::Namespace,
        };

        let err = execute_simple(&graph, &engine, &opts()).unwrap_err();
        assert!(matches!(err, Error::Provisioning { kind: ResourceKind::Namespace, .. }));

        let state = local.snapshot();
        assert!(state.get("k8sprovider").is_some());
        assert_eq!(state.of_kind(ResourceKind::Chart).count(), 0);
        assert!(state.exports.is_empty());
    }

    #[test]
    fn test_changed_config_is_modified() {
        let mut config = StackConfig::default();
        let engine = LocalEngine::in_memory(&config.project);
        execute_simple(&declare_gitops_stack(&config).unwrap(), &engine, &opts()).unwrap();

        config.node_pool.node_count = 3;
        let execution =
            execute_simple(&declare_gitops_stack(&config).unwrap(), &engine, &opts()).unwrap();
        assert_eq!(execution.summary.modified, 1);
        assert_eq!(
            outputs_of(&engine.snapshot(), "gitops-preemptiblenodes")["nodeCount"],
            3
        );
    }

    #[test]
    fn test_state_persists_between_engines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let config = StackConfig::default();
        let graph = declare_gitops_stack(&config).unwrap();

        let engine = LocalEngine::open(&config.project, &path).unwrap();
        let execution = execute_simple(&graph, &engine, &opts()).unwrap();
        engine.record_exports(&execution.exports);
        engine.save().unwrap();

        let reopened = LocalEngine::open(&config.project, &path).unwrap();
        let state = reopened.snapshot();
        assert_eq!(state.resources.len(), 7);
        assert!(state.last_run.is_some());
        assert_eq!(state.exports, execution.exports);

        let again = execute_simple(&graph, &reopened, &opts()).unwrap();
        assert_eq!(again.summary.no_change, 7);
    }

    #[test]
    fn test_provider_rejects_unknown_server() {
        let engine = LocalEngine::in_memory("gitops-stack");
        let kubeconfig = render_kubeconfig("10.0.0.1", "gitops", "Q0EK").unwrap();
        let request = ResourceRequest {
            id: DeclarationId::new("k8sprovider"),
            kind: ResourceKind::Provider,
            config: json!({ "kubeconfig": kubeconfig })
                .as_object()
                .cloned()
                .unwrap(),
            provider: None,
            transformations: Vec::new(),
        };
        let err = engine.apply(&request).unwrap_err();
        assert!(format!("{err:#}").contains("no known cluster serves https://10.0.0.1"));
    }
}
