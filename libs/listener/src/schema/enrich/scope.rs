use super::{set_extension, Enricher};
use crate::discovery::RestMapper;
use crate::error::Result;
use crate::schema::set::SchemaSet;

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

/// Extension naming whether a kind is namespace- or cluster-scoped
pub const SCOPE_EXTENSION: &str = "x-kubernetes-scope";

/// Annotates every schema that has a GVK with its resource scope.
///
/// GVKs the mapper does not know, and entries without a GVK, are skipped.
pub struct ScopeEnricher {
    mapper: Arc<dyn RestMapper>,
}

impl ScopeEnricher {
    pub fn new(mapper: Arc<dyn RestMapper>) -> Self {
        Self { mapper }
    }
}

impl Enricher for ScopeEnricher {
    fn name(&self) -> &'static str {
        "scope"
    }

    fn enrich(&self, schemas: &mut SchemaSet) -> Result<()> {
        let mut scopes = Vec::new();
        for entry in schemas.iter() {
            let Some(gvk) = entry.gvk() else { continue };
            match self.mapper.scope(gvk) {
                Some(scope) => scopes.push((entry.key().to_string(), scope)),
                None => {
                    debug!(key = entry.key(), kind = %gvk.kind, "kind unknown to the rest mapper, skipping scope");
                }
            }
        }
        for (key, scope) in scopes {
            if let Some(schema) = schemas.schema_mut(&key) {
                set_extension(schema, SCOPE_EXTENSION, Value::String(scope.as_str().to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::discovery::fake::{resource_list, FakeDiscovery};
    use crate::discovery::DiscoveryRestMapper;
    use crate::schema::set::GVK_EXTENSION;

    use serde_json::json;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_scope_annotation() {
        let discovery = FakeDiscovery {
            resources: vec![resource_list(
                "v1",
                &[("Pod", "pods", true, &[]), ("Namespace", "namespaces", false, &[])],
            )],
            ..FakeDiscovery::default()
        };
        let mapper = DiscoveryRestMapper::from_discovery(&discovery).await.unwrap();

        let mut schemas = SchemaSet::new(BTreeMap::from([
            (
                "v1.Pod".to_string(),
                json!({GVK_EXTENSION: [{"group": "", "version": "v1", "kind": "Pod"}]}),
            ),
            (
                "v1.Namespace".to_string(),
                json!({GVK_EXTENSION: [{"group": "", "version": "v1", "kind": "Namespace"}]}),
            ),
            (
                "v1.Unknown".to_string(),
                json!({GVK_EXTENSION: [{"group": "", "version": "v1", "kind": "Unknown"}]}),
            ),
            ("v1.ObjectMeta".to_string(), json!({"type": "object"})),
        ]));

        ScopeEnricher::new(Arc::new(mapper))
            .enrich(&mut schemas)
            .unwrap();

        assert_eq!(
            schemas.get("v1.Pod").unwrap().schema[SCOPE_EXTENSION],
            "Namespaced"
        );
        assert_eq!(
            schemas.get("v1.Namespace").unwrap().schema[SCOPE_EXTENSION],
            "Cluster"
        );
        // unknown to the mapper and schemas without a GVK stay untouched
        assert!(schemas.get("v1.Unknown").unwrap().schema.get(SCOPE_EXTENSION).is_none());
        assert!(schemas.get("v1.ObjectMeta").unwrap().schema.get(SCOPE_EXTENSION).is_none());
    }
}
