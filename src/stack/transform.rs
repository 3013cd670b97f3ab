//! Transformations applied to rendered chart objects

use declarative::{TransformError, Transformation};
use serde_json::Value;

pub const DEPRECATED_INGRESS_API: &str = "extensions/v1beta1";
pub const NETWORKING_INGRESS_API: &str = "networking.k8s.io/v1beta1";

/// Replace one `apiVersion` with another.
///
/// `List` objects are rewritten item by item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteApiVersion {
    name: String,
    from: String,
    to: String,
}

impl RewriteApiVersion {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        let to = to.into();
        Self {
            name: format!("rewrite-api-version({from} -> {to})"),
            from,
            to,
        }
    }

    /// `extensions/v1beta1` to `networking.k8s.io/v1beta1`
    pub fn deprecated_ingress() -> Self {
        Self::new(DEPRECATED_INGRESS_API, NETWORKING_INGRESS_API)
    }

    fn rewrite(&self, object: &mut Value) -> Result<(), TransformError> {
        let Some(map) = object.as_object_mut() else {
            return Err(TransformError::new(
                &self.name,
                format!("expected an object, got `{object}`"),
            ));
        };

        if map.get("apiVersion").and_then(Value::as_str) == Some(self.from.as_str()) {
            map.insert("apiVersion".into(), Value::String(self.to.clone()));
        }

        if map.get("kind").and_then(Value::as_str) == Some("List")
            && let Some(items) = map.get_mut("items").and_then(Value::as_array_mut)
        {
            for item in items {
                self.rewrite(item)?;
            }
        }
        Ok(())
    }
}

impl Transformation for RewriteApiVersion {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, object: &mut Value) -> Result<(), TransformError> {
        self.rewrite(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ingress() -> Value {
        json!({
            "apiVersion": "extensions/v1beta1",
            "kind": "Ingress",
            "metadata": { "name": "ingress-nginx" },
        })
    }

    #[test]
    fn test_rewrites_deprecated_ingress() {
        let mut object = ingress();
        RewriteApiVersion::deprecated_ingress()
            .transform(&mut object)
            .unwrap();
        assert_eq!(object["apiVersion"], "networking.k8s.io/v1beta1");
        assert_eq!(object["metadata"]["name"], "ingress-nginx");
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let rewrite = RewriteApiVersion::deprecated_ingress();
        let mut once = ingress();
        rewrite.transform(&mut once).unwrap();
        let mut twice = once.clone();
        rewrite.transform(&mut twice).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_other_versions_untouched() {
        let mut object = json!({ "apiVersion": "apps/v1", "kind": "Deployment" });
        let before = object.clone();
        RewriteApiVersion::deprecated_ingress()
            .transform(&mut object)
            .unwrap();
        assert_eq!(object, before);
    }

    #[test]
    fn test_list_items_rewritten() {
        let mut list = json!({
            "apiVersion": "v1",
            "kind": "List",
            "items": [ingress(), ingress()],
        });
        RewriteApiVersion::deprecated_ingress()
            .transform(&mut list)
            .unwrap();
        assert_eq!(list["apiVersion"], "v1");
        assert_eq!(list["items"][1]["apiVersion"], "networking.k8s.io/v1beta1");
    }

    #[test]
    fn test_non_object_is_an_error() {
        let mut scalar = json!("extensions/v1beta1");
        let err = RewriteApiVersion::deprecated_ingress()
            .transform(&mut scalar)
            .unwrap_err();
        assert!(err.to_string().contains("expected an object"));
    }
}
