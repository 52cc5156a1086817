use crate::discovery::{Discovery, RestMapper};
use crate::error::Result;
use crate::schema::enrich::categories::CategoriesEnricher;
use crate::schema::enrich::preferred::PreferredVersionsEnricher;
use crate::schema::enrich::relationships::RelationshipsEnricher;
use crate::schema::enrich::scope::ScopeEnricher;
use crate::schema::enrich::{self, Enricher, PreferredVersionMap};
use crate::schema::loader;

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

/// Produces the serialized schema document for one cluster: load every
/// OpenAPI document, run the enricher chain in fixed order (scope,
/// categories, preferred versions, relationships), marshal.
pub async fn resolve(discovery: &dyn Discovery, mapper: Arc<dyn RestMapper>) -> Result<Bytes> {
    let mut schemas = loader::load(discovery).await?;

    let groups = discovery.groups().await?;
    let resources = discovery.resources().await?;
    let preferred: PreferredVersionMap = Arc::new(RwLock::new(HashMap::new()));
    let enrichers: Vec<Box<dyn Enricher>> = vec![
        Box::new(ScopeEnricher::new(mapper)),
        Box::new(CategoriesEnricher::new(resources.clone())),
        Box::new(PreferredVersionsEnricher::new(
            groups,
            resources,
            preferred.clone(),
        )),
        Box::new(RelationshipsEnricher::new(preferred)),
    ];
    enrich::run(&enrichers, &mut schemas)?;

    schemas.marshal()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::discovery::fake::{resource_list, FakeDiscovery};
    use crate::discovery::{ApiGroupInfo, DiscoveryRestMapper};
    use crate::schema::enrich::scope::SCOPE_EXTENSION;
    use crate::schema::set::GVK_EXTENSION;

    use serde_json::{json, Value};

    fn discovery() -> FakeDiscovery {
        FakeDiscovery {
            documents: [(
                "/openapi/v3/api/v1".to_string(),
                json!({
                    "components": {
                        "schemas": {
                            "io.k8s.api.core.v1.Pod": {
                                "type": "object",
                                GVK_EXTENSION: [{"group": "", "version": "v1", "kind": "Pod"}],
                            },
                        },
                    },
                }),
            )]
            .into(),
            groups: vec![ApiGroupInfo {
                group: String::new(),
                preferred_version: Some("v1".to_string()),
                versions: vec!["v1".to_string()],
            }],
            resources: vec![resource_list("v1", &[("Pod", "pods", true, &[])])],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_resolve_produces_enriched_document() {
        let discovery = discovery();
        let mapper = Arc::new(DiscoveryRestMapper::from_discovery(&discovery).await.unwrap());

        let bytes = resolve(&discovery, mapper).await.unwrap();
        let doc: Value = serde_json::from_slice(&bytes).unwrap();

        let pod = &doc["components"]["schemas"]["v1.Pod"];
        assert_eq!(pod[SCOPE_EXTENSION], "Namespaced");
        assert_eq!(pod[GVK_EXTENSION][0]["kind"], "Pod");
    }

    #[tokio::test]
    async fn test_resolve_is_deterministic() {
        let discovery = discovery();
        let mapper: Arc<dyn crate::discovery::RestMapper> =
            Arc::new(DiscoveryRestMapper::from_discovery(&discovery).await.unwrap());

        let first = resolve(&discovery, mapper.clone()).await.unwrap();
        let second = resolve(&discovery, mapper).await.unwrap();
        assert_eq!(first, second);
    }
}
