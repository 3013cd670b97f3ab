//! Resource declarations
//!
//! A [`Declaration`] is a named, typed request to create or maintain one
//! resource. Its configuration mixes literal values with [`Deferred`]
//! inputs; the declarations those inputs read from become data
//! dependencies. Explicit ordering that is not carried by data goes in
//! `depends_on`, and in-cluster declarations name their provider.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::deferred::{Deferred, ResolvedOutputs};
use crate::error::{ResolveError, TransformError};
use crate::types::ResourceKind;

/// Logical name of a declaration, unique within a graph
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeclarationId(String);

impl DeclarationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeclarationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeclarationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeclarationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Structural rewrite applied to each rendered object before submission.
///
/// Implementations must be idempotent and must not touch anything but
/// the object they are given.
pub trait Transformation: Send + Sync + fmt::Debug {
    /// Stable name, part of the declaration fingerprint
    fn name(&self) -> &str;

    /// Mutate one rendered object in place
    fn transform(&self, object: &mut Value) -> Result<(), TransformError>;
}

/// One configuration parameter of a declaration
#[derive(Debug, Clone)]
pub enum Input {
    Literal(Value),
    Deferred(Deferred<Value>),
}

impl Input {
    /// Declarations this input waits on
    pub fn sources(&self) -> BTreeSet<DeclarationId> {
        match self {
            Self::Literal(_) => BTreeSet::new(),
            Self::Deferred(deferred) => deferred.sources().clone(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Deferred(deferred) if deferred.is_pending())
    }

    pub fn resolve(&self, outputs: &ResolvedOutputs) -> Result<Value, ResolveError> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Deferred(deferred) => deferred.resolve(outputs),
        }
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<String> for Input {
    fn from(value: String) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<bool> for Input {
    fn from(value: bool) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<u32> for Input {
    fn from(value: u32) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<Vec<String>> for Input {
    fn from(values: Vec<String>) -> Self {
        Self::Literal(Value::from(values))
    }
}

impl From<Deferred<Value>> for Input {
    fn from(value: Deferred<Value>) -> Self {
        Self::Deferred(value)
    }
}

impl From<Deferred<String>> for Input {
    fn from(value: Deferred<String>) -> Self {
        Self::Deferred(value.into_value())
    }
}

/// A named, typed request to create or maintain one resource
#[derive(Debug, Clone)]
pub struct Declaration {
    pub id: DeclarationId,
    pub kind: ResourceKind,
    pub description: String,
    pub config: BTreeMap<String, Input>,
    /// Explicit ordering edges, independent of data flow
    pub depends_on: BTreeSet<DeclarationId>,
    /// Client handle used to reach the cluster, for in-cluster kinds
    pub provider: Option<DeclarationId>,
    pub transformations: Vec<Arc<dyn Transformation>>,
}

impl Declaration {
    pub fn new(id: impl Into<DeclarationId>, kind: ResourceKind) -> Self {
        let id = id.into();
        Self {
            description: format!("{kind} {id}"),
            id,
            kind,
            config: BTreeMap::new(),
            depends_on: BTreeSet::new(),
            provider: None,
            transformations: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set a configuration parameter
    pub fn with(mut self, key: &str, input: impl Into<Input>) -> Self {
        self.config.insert(key.to_string(), input.into());
        self
    }

    pub fn depends_on(mut self, id: &DeclarationId) -> Self {
        self.depends_on.insert(id.clone());
        self
    }

    pub fn with_provider(mut self, provider: &DeclarationId) -> Self {
        self.provider = Some(provider.clone());
        self
    }

    pub fn with_transformation(mut self, transformation: Arc<dyn Transformation>) -> Self {
        self.transformations.push(transformation);
        self
    }

    /// Declarations read by this declaration's inputs
    pub fn data_sources(&self) -> BTreeSet<DeclarationId> {
        self.config.values().flat_map(Input::sources).collect()
    }

    /// Resolve every input; all of them must be known
    pub fn resolve(&self, outputs: &ResolvedOutputs) -> Result<ResourceRequest, ResolveError> {
        let config = self
            .config
            .iter()
            .map(|(key, input)| Ok((key.clone(), input.resolve(outputs)?)))
            .collect::<Result<Map<_, _>, ResolveError>>()?;

        Ok(ResourceRequest {
            id: self.id.clone(),
            kind: self.kind,
            config,
            provider: self.provider.clone(),
            transformations: self.transformations.clone(),
        })
    }

    /// Resolve what can be resolved; pending inputs are returned by name.
    ///
    /// Inputs that fail for any reason other than being pending are errors.
    pub fn preview(
        &self,
        outputs: &ResolvedOutputs,
    ) -> Result<(Map<String, Value>, Vec<String>), ResolveError> {
        let mut config = Map::new();
        let mut unknown = Vec::new();
        for (key, input) in &self.config {
            match input.resolve(outputs) {
                Ok(value) => {
                    config.insert(key.clone(), value);
                }
                Err(e) if e.is_pending() => unknown.push(key.clone()),
                Err(e) => return Err(e),
            }
        }
        Ok((config, unknown))
    }

    pub fn fingerprint(&self, config: &Map<String, Value>) -> String {
        fingerprint(
            self.kind,
            config,
            self.provider.as_ref(),
            &self.transformations,
        )
    }
}

/// A declaration with every input resolved, as handed to an engine
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    pub id: DeclarationId,
    pub kind: ResourceKind,
    pub config: Map<String, Value>,
    pub provider: Option<DeclarationId>,
    pub transformations: Vec<Arc<dyn Transformation>>,
}

impl ResourceRequest {
    pub fn fingerprint(&self) -> String {
        fingerprint(
            self.kind,
            &self.config,
            self.provider.as_ref(),
            &self.transformations,
        )
    }

    /// String parameter, if present and a string
    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }
}

/// Content hash of a resolved declaration, used to detect drift
pub fn fingerprint(
    kind: ResourceKind,
    config: &Map<String, Value>,
    provider: Option<&DeclarationId>,
    transformations: &[Arc<dyn Transformation>],
) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b"\0");
    // serde_json maps are ordered, so this is canonical
    hasher.update(Value::Object(config.clone()).to_string().as_bytes());
    if let Some(provider) = provider {
        hasher.update(b"\0provider=");
        hasher.update(provider.as_str().as_bytes());
    }
    for transformation in transformations {
        hasher.update(b"\0transform=");
        hasher.update(transformation.name().as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outputs_for(id: &str, value: Value) -> ResolvedOutputs {
        let mut outputs = ResolvedOutputs::new();
        if let Value::Object(map) = value {
            outputs.insert(DeclarationId::new(id), map);
        }
        outputs
    }

    #[test]
    fn test_data_sources_come_from_deferred_inputs() {
        let cluster = DeclarationId::new("gitops");
        let decl = Declaration::new("pool", ResourceKind::NodePool)
            .with("cluster", Deferred::<String>::output(&cluster, "name"))
            .with("nodeCount", 1u32)
            .depends_on(&cluster);

        assert_eq!(decl.data_sources(), BTreeSet::from([cluster.clone()]));
        assert!(decl.config["cluster"].is_pending());
        assert!(!decl.config["nodeCount"].is_pending());
    }

    #[test]
    fn test_resolve_requires_all_inputs() {
        let cluster = DeclarationId::new("gitops");
        let decl = Declaration::new("pool", ResourceKind::NodePool)
            .with("cluster", Deferred::<String>::output(&cluster, "name"));

        assert!(decl.resolve(&ResolvedOutputs::new()).is_err());

        let request = decl
            .resolve(&outputs_for("gitops", json!({ "name": "gitops-1a2b" })))
            .unwrap();
        assert_eq!(request.str_param("cluster"), Some("gitops-1a2b"));
    }

    #[test]
    fn test_preview_reports_pending_inputs() {
        let cluster = DeclarationId::new("gitops");
        let decl = Declaration::new("pool", ResourceKind::NodePool)
            .with("cluster", Deferred::<String>::output(&cluster, "name"))
            .with("machineType", "e2-medium");

        let (config, unknown) = decl.preview(&ResolvedOutputs::new()).unwrap();
        assert_eq!(config.get("machineType"), Some(&json!("e2-medium")));
        assert_eq!(unknown, vec!["cluster".to_string()]);
    }

    #[test]
    fn test_fingerprint_is_stable_and_sensitive() {
        let decl = Declaration::new("pool", ResourceKind::NodePool).with("nodeCount", 1u32);
        let first = decl.resolve(&ResolvedOutputs::new()).unwrap().fingerprint();
        let second = decl.resolve(&ResolvedOutputs::new()).unwrap().fingerprint();
        assert_eq!(first, second);

        let changed = decl
            .with("nodeCount", 2u32)
            .resolve(&ResolvedOutputs::new())
            .unwrap()
            .fingerprint();
        assert_ne!(first, changed);
    }
}
