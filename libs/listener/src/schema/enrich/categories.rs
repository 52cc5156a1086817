use super::{set_extension, Enricher};
use crate::discovery::split_group_version;
use crate::error::Result;
use crate::schema::set::SchemaSet;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResourceList;
use kube::core::GroupVersionKind;
use serde_json::json;

/// Extension listing the discovery categories of a kind (e.g. `all`)
pub const CATEGORIES_EXTENSION: &str = "x-kubernetes-categories";

/// Copies non-empty discovery `categories` onto the matching schemas.
///
/// Unknown GVKs and resources without categories are skipped silently.
pub struct CategoriesEnricher {
    resources: Vec<APIResourceList>,
}

impl CategoriesEnricher {
    pub fn new(resources: Vec<APIResourceList>) -> Self {
        Self { resources }
    }
}

impl Enricher for CategoriesEnricher {
    fn name(&self) -> &'static str {
        "categories"
    }

    fn enrich(&self, schemas: &mut SchemaSet) -> Result<()> {
        for list in &self.resources {
            let (group, version) = split_group_version(&list.group_version);
            for resource in &list.resources {
                if resource.name.contains('/') {
                    continue;
                }
                let Some(categories) = resource.categories.as_ref().filter(|c| !c.is_empty())
                else {
                    continue;
                };
                let group = resource.group.clone().unwrap_or_else(|| group.to_string());
                let version = resource
                    .version
                    .clone()
                    .unwrap_or_else(|| version.to_string());
                let gvk = GroupVersionKind::gvk(&group, &version, &resource.kind);
                let Some(key) = schemas.get_by_gvk(&gvk).map(|e| e.key().to_string()) else {
                    continue;
                };
                if let Some(schema) = schemas.schema_mut(&key) {
                    set_extension(schema, CATEGORIES_EXTENSION, json!(categories));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::discovery::fake::resource_list;
    use crate::schema::set::GVK_EXTENSION;

    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_categories_annotation() {
        let mut schemas = SchemaSet::new(BTreeMap::from([
            (
                "apps.v1.Deployment".to_string(),
                json!({GVK_EXTENSION: [{"group": "apps", "version": "v1", "kind": "Deployment"}]}),
            ),
            (
                "v1.Secret".to_string(),
                json!({GVK_EXTENSION: [{"group": "", "version": "v1", "kind": "Secret"}]}),
            ),
        ]));

        let enricher = CategoriesEnricher::new(vec![
            resource_list("apps/v1", &[("Deployment", "deployments", true, &["all", "apps"])]),
            resource_list("v1", &[("Secret", "secrets", true, &[])]),
            // unknown GVKs are skipped silently
            resource_list("batch/v1", &[("Job", "jobs", true, &["all"])]),
        ]);
        enricher.enrich(&mut schemas).unwrap();

        assert_eq!(
            schemas.get("apps.v1.Deployment").unwrap().schema[CATEGORIES_EXTENSION],
            json!(["all", "apps"])
        );
        assert!(schemas
            .get("v1.Secret")
            .unwrap()
            .schema
            .get(CATEGORIES_EXTENSION)
            .is_none());
    }
}
