use super::{Enricher, PreferredVersionMap};
use crate::discovery::{split_group_version, ApiGroupInfo};
use crate::error::Result;
use crate::schema::set::SchemaSet;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResourceList;

/// Records `(group, kind)` → preferred version.
///
/// This enricher does not touch the schemas; it fills the shared map the
/// relationships enricher reads when several groups provide the same kind.
pub struct PreferredVersionsEnricher {
    groups: Vec<ApiGroupInfo>,
    resources: Vec<APIResourceList>,
    preferred: PreferredVersionMap,
}

impl PreferredVersionsEnricher {
    pub fn new(
        groups: Vec<ApiGroupInfo>,
        resources: Vec<APIResourceList>,
        preferred: PreferredVersionMap,
    ) -> Self {
        Self {
            groups,
            resources,
            preferred,
        }
    }
}

impl Enricher for PreferredVersionsEnricher {
    fn name(&self) -> &'static str {
        "preferredversions"
    }

    fn enrich(&self, _schemas: &mut SchemaSet) -> Result<()> {
        let mut preferred = self.preferred.write();
        for list in &self.resources {
            let (group, version) = split_group_version(&list.group_version);
            let group_preferred = self
                .groups
                .iter()
                .find(|g| g.group == group)
                .and_then(|g| g.preferred_version.as_deref());
            if group_preferred != Some(version) {
                continue;
            }
            for resource in &list.resources {
                if resource.name.contains('/') {
                    continue;
                }
                preferred.insert(
                    (group.to_string(), resource.kind.clone()),
                    version.to_string(),
                );
            }
        }
        Ok(())
    }
}
