//! Deferred values
//!
//! A [`Deferred`] stands for a value that only exists once the engine has
//! provisioned the declaration that owns it: a cluster endpoint, a
//! generated name, a CA certificate. Deferred values can be combined with
//! [`Deferred::apply`], [`Deferred::try_apply`] and [`Deferred::zip`], but
//! never read directly. Reading requires a [`ResolvedOutputs`] table,
//! which only exists on the execution side of the graph.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::error::ResolveError;
use crate::resource::DeclarationId;

/// Runtime attributes reported by the engine for one declaration
pub type Outputs = serde_json::Map<String, Value>;

/// Outputs of every declaration provisioned so far, keyed by declaration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedOutputs {
    outputs: BTreeMap<DeclarationId, Outputs>,
}

impl ResolvedOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: DeclarationId, outputs: Outputs) {
        self.outputs.insert(id, outputs);
    }

    pub fn get(&self, id: &DeclarationId) -> Option<&Outputs> {
        self.outputs.get(id)
    }

    pub fn contains(&self, id: &DeclarationId) -> bool {
        self.outputs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DeclarationId, &Outputs)> {
        self.outputs.iter()
    }
}

type Resolver<T> = dyn Fn(&ResolvedOutputs) -> Result<T, ResolveError> + Send + Sync;

/// A value that is unknown until its owning declarations are provisioned
pub struct Deferred<T> {
    sources: BTreeSet<DeclarationId>,
    resolver: Arc<Resolver<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            sources: self.sources.clone(),
            resolver: Arc::clone(&self.resolver),
        }
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("sources", &self.sources)
            .finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> Deferred<T> {
    /// A value that is already known at declaration time
    pub fn known(value: T) -> Self
    where
        T: Clone,
    {
        Self {
            sources: BTreeSet::new(),
            resolver: Arc::new(move |_| Ok(value.clone())),
        }
    }

    /// Declarations whose outputs this value reads
    pub fn sources(&self) -> &BTreeSet<DeclarationId> {
        &self.sources
    }

    /// Whether resolving this value waits on any declaration
    pub fn is_pending(&self) -> bool {
        !self.sources.is_empty()
    }

    /// Lift a pure function over the pending value
    pub fn apply<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Send + Sync + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.try_apply(move |value| Ok(f(value)))
    }

    /// Lift a fallible pure function over the pending value
    pub fn try_apply<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Send + Sync + 'static,
        F: Fn(T) -> Result<U, ResolveError> + Send + Sync + 'static,
    {
        let inner = Arc::clone(&self.resolver);
        Deferred {
            sources: self.sources.clone(),
            resolver: Arc::new(move |outputs| inner(outputs).and_then(&f)),
        }
    }

    /// Pair two pending values; the pair resolves once both do
    pub fn zip<U: Send + Sync + 'static>(&self, other: &Deferred<U>) -> Deferred<(T, U)> {
        let left = Arc::clone(&self.resolver);
        let right = Arc::clone(&other.resolver);
        Deferred {
            sources: self.sources.union(&other.sources).cloned().collect(),
            resolver: Arc::new(move |outputs| Ok((left(outputs)?, right(outputs)?))),
        }
    }

    /// Resolve against the outputs provisioned so far.
    ///
    /// Fails with [`ResolveError::Unresolved`] if any source has not been
    /// provisioned, without evaluating any lifted function.
    pub fn resolve(&self, outputs: &ResolvedOutputs) -> Result<T, ResolveError> {
        if let Some(missing) = self.sources.iter().find(|id| !outputs.contains(id)) {
            return Err(ResolveError::Unresolved(missing.clone()));
        }
        (self.resolver)(outputs)
    }
}

impl<T: DeserializeOwned + Send + Sync + 'static> Deferred<T> {
    /// Output `path` (dot separated) of the declaration `owner`
    pub fn output(owner: &DeclarationId, path: &str) -> Self {
        let id = owner.clone();
        let path = path.to_string();
        Self {
            sources: BTreeSet::from([owner.clone()]),
            resolver: Arc::new(move |outputs| {
                let value = lookup(outputs, &id, &path)?;
                serde_json::from_value(value.clone()).map_err(|e| ResolveError::Type {
                    id: id.clone(),
                    path: path.clone(),
                    message: e.to_string(),
                })
            }),
        }
    }
}

impl Deferred<String> {
    /// Erase to a JSON value so it can be used as a declaration input
    pub fn into_value(self) -> Deferred<Value> {
        self.apply(Value::String)
    }
}

fn lookup<'a>(
    outputs: &'a ResolvedOutputs,
    id: &DeclarationId,
    path: &str,
) -> Result<&'a Value, ResolveError> {
    let root = outputs
        .get(id)
        .ok_or_else(|| ResolveError::Unresolved(id.clone()))?;

    let mut segments = path.split('.');
    let mut current = segments.next().and_then(|first| root.get(first));
    for segment in segments {
        current = current.and_then(|value| value.get(segment));
    }

    current.ok_or_else(|| ResolveError::MissingOutput {
        id: id.clone(),
        path: path.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cluster_outputs() -> ResolvedOutputs {
        let mut outputs = ResolvedOutputs::new();
        let Value::Object(map) = json!({
            "endpoint": "1.2.3.4",
            "name": "gitops",
            "masterAuth": { "clusterCaCertificate": "QUJD" },
        }) else {
            unreachable!()
        };
        outputs.insert(DeclarationId::new("gitops"), map);
        outputs
    }

    #[test]
    fn test_output_is_pending_until_owner_resolves() {
        let endpoint = Deferred::<String>::output(&DeclarationId::new("gitops"), "endpoint");
        assert!(endpoint.is_pending());
        assert_eq!(
            endpoint.resolve(&ResolvedOutputs::new()),
            Err(ResolveError::Unresolved(DeclarationId::new("gitops")))
        );
        assert_eq!(endpoint.resolve(&cluster_outputs()).unwrap(), "1.2.3.4");
    }

    #[test]
    fn test_nested_output_path() {
        let ca = Deferred::<String>::output(
            &DeclarationId::new("gitops"),
            "masterAuth.clusterCaCertificate",
        );
        assert_eq!(ca.resolve(&cluster_outputs()).unwrap(), "QUJD");
    }

    #[test]
    fn test_missing_output_and_type_mismatch() {
        let id = DeclarationId::new("gitops");
        let missing = Deferred::<String>::output(&id, "masterAuth.clientKey");
        assert!(matches!(
            missing.resolve(&cluster_outputs()),
            Err(ResolveError::MissingOutput { .. })
        ));

        let wrong = Deferred::<u32>::output(&id, "name");
        assert!(matches!(
            wrong.resolve(&cluster_outputs()),
            Err(ResolveError::Type { .. })
        ));
    }

    #[test]
    fn test_zip_unions_sources_and_preserves_order() {
        let a = Deferred::<String>::output(&DeclarationId::new("gitops"), "endpoint");
        let b = Deferred::known("suffix".to_string());
        let joined = a.zip(&b).apply(|(left, right)| format!("{left}/{right}"));

        assert_eq!(joined.sources().len(), 1);
        assert_eq!(joined.resolve(&cluster_outputs()).unwrap(), "1.2.3.4/suffix");
    }

    #[test]
    fn test_lifted_function_not_called_while_pending() {
        let called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&called);
        let value = Deferred::<String>::output(&DeclarationId::new("gitops"), "name").apply(
            move |name| {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                name
            },
        );

        assert!(value.resolve(&ResolvedOutputs::new()).is_err());
        assert!(!called.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_try_apply_propagates_rejection() {
        let value = Deferred::known(String::new()).try_apply(|s| {
            if s.is_empty() {
                Err(ResolveError::invalid("empty"))
            } else {
                Ok(s)
            }
        });
        assert_eq!(
            value.resolve(&ResolvedOutputs::new()),
            Err(ResolveError::Invalid("empty".into()))
        );
    }
}
