use crate::error::{Error, Result};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResourceList;
use kube::core::GroupVersionKind;
use kube::{Client, Config};
use serde_json::Value;

/// One served API group with its version set
#[derive(Clone, Debug, PartialEq)]
pub struct ApiGroupInfo {
    /// Group name; empty for the core group
    pub group: String,
    pub preferred_version: Option<String>,
    pub versions: Vec<String>,
}

/// Read-only discovery surface of one cluster.
///
/// This is the capability the schema pipeline consumes; the production
/// implementation wraps a [`kube::Client`], tests substitute fakes.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Server-relative URLs of the served OpenAPI v3 group-version documents
    async fn openapi_paths(&self) -> Result<Vec<String>>;

    /// Fetches one OpenAPI v3 document
    async fn openapi_document(&self, path: &str) -> Result<Value>;

    /// All served API groups, core group included
    async fn groups(&self) -> Result<Vec<ApiGroupInfo>>;

    /// API-resource lists for every served group version
    async fn resources(&self) -> Result<Vec<APIResourceList>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceScope {
    Namespaced,
    Cluster,
}

impl ResourceScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceScope::Namespaced => "Namespaced",
            ResourceScope::Cluster => "Cluster",
        }
    }
}

/// Maps a GVK to its scope, the only mapping the enrichers need
pub trait RestMapper: Send + Sync {
    fn scope(&self, gvk: &GroupVersionKind) -> Option<ResourceScope>;
}

/// Rest mapper materialized from one discovery sweep
pub struct DiscoveryRestMapper {
    scopes: HashMap<GroupVersionKind, ResourceScope>,
}

impl DiscoveryRestMapper {
    pub async fn from_discovery(discovery: &dyn Discovery) -> Result<Self> {
        let mut scopes = HashMap::new();
        for list in discovery.resources().await? {
            let (group, version) = split_group_version(&list.group_version);
            for resource in &list.resources {
                // subresources such as `pods/status` carry no schema
                if resource.name.contains('/') {
                    continue;
                }
                let group = resource.group.clone().unwrap_or_else(|| group.to_string());
                let version = resource
                    .version
                    .clone()
                    .unwrap_or_else(|| version.to_string());
                let scope = if resource.namespaced {
                    ResourceScope::Namespaced
                } else {
                    ResourceScope::Cluster
                };
                scopes.insert(
                    GroupVersionKind::gvk(&group, &version, &resource.kind),
                    scope,
                );
            }
        }
        Ok(Self { scopes })
    }
}

impl RestMapper for DiscoveryRestMapper {
    fn scope(&self, gvk: &GroupVersionKind) -> Option<ResourceScope> {
        self.scopes.get(gvk).copied()
    }
}

/// Splits `apps/v1` style group versions; a bare `v1` is the core group
pub(crate) fn split_group_version(group_version: &str) -> (&str, &str) {
    match group_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", group_version),
    }
}

/// Discovery backed by a live API server connection
pub struct ClientDiscovery {
    client: Client,
}

impl ClientDiscovery {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let request = http::Request::builder()
            .uri(path)
            .body(Vec::new())
            .map_err(Error::InvalidUri)?;
        let text = self
            .client
            .request_text(request)
            .await
            .map_err(Error::DiscoveryError)?;
        serde_json::from_str(&text).map_err(Error::SerializationError)
    }
}

#[async_trait]
impl Discovery for ClientDiscovery {
    async fn openapi_paths(&self) -> Result<Vec<String>> {
        let index = self.get_json("/openapi/v3").await?;
        let mut paths: Vec<String> = index
            .get("paths")
            .and_then(Value::as_object)
            .map(|paths| {
                paths
                    .values()
                    .filter_map(|entry| entry.get("serverRelativeURL").and_then(Value::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        paths.sort();
        Ok(paths)
    }

    async fn openapi_document(&self, path: &str) -> Result<Value> {
        self.get_json(path).await
    }

    async fn groups(&self) -> Result<Vec<ApiGroupInfo>> {
        let mut groups = Vec::new();
        let core = self
            .client
            .list_core_api_versions()
            .await
            .map_err(Error::DiscoveryError)?;
        groups.push(ApiGroupInfo {
            group: String::new(),
            preferred_version: core.versions.first().cloned(),
            versions: core.versions,
        });
        let named = self
            .client
            .list_api_groups()
            .await
            .map_err(Error::DiscoveryError)?;
        for group in named.groups {
            groups.push(ApiGroupInfo {
                group: group.name,
                preferred_version: group.preferred_version.map(|v| v.version),
                versions: group.versions.into_iter().map(|v| v.version).collect(),
            });
        }
        Ok(groups)
    }

    async fn resources(&self) -> Result<Vec<APIResourceList>> {
        let mut lists = Vec::new();
        let core = self
            .client
            .list_core_api_versions()
            .await
            .map_err(Error::DiscoveryError)?;
        for version in &core.versions {
            lists.push(
                self.client
                    .list_core_api_resources(version)
                    .await
                    .map_err(Error::DiscoveryError)?,
            );
        }
        let named = self
            .client
            .list_api_groups()
            .await
            .map_err(Error::DiscoveryError)?;
        for group in named.groups {
            for version in &group.versions {
                lists.push(
                    self.client
                        .list_api_group_resources(&version.group_version)
                        .await
                        .map_err(Error::DiscoveryError)?,
                );
            }
        }
        Ok(lists)
    }
}

/// Produces discovery clients bound to a given cluster config.
///
/// Every call builds a fresh client and transport so connections are never
/// shared across clusters.
#[async_trait]
pub trait DiscoveryFactory: Send + Sync {
    async fn create(&self, config: &Config) -> Result<Arc<dyn Discovery>>;
}

#[derive(Default)]
pub struct ClientDiscoveryFactory;

#[async_trait]
impl DiscoveryFactory for ClientDiscoveryFactory {
    async fn create(&self, config: &Config) -> Result<Arc<dyn Discovery>> {
        let client = Client::try_from(config.clone()).map_err(Error::KubeError)?;
        Ok(Arc::new(ClientDiscovery::new(client)))
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;

    use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResource;
    use std::collections::BTreeMap;

    /// Canned discovery data for pipeline tests
    #[derive(Default)]
    pub struct FakeDiscovery {
        pub documents: BTreeMap<String, Value>,
        /// Served paths with no document behind them; fetching one errors
        pub broken_paths: Vec<String>,
        pub groups: Vec<ApiGroupInfo>,
        pub resources: Vec<APIResourceList>,
    }

    #[async_trait]
    impl Discovery for FakeDiscovery {
        async fn openapi_paths(&self) -> Result<Vec<String>> {
            let mut paths: Vec<String> = self.documents.keys().cloned().collect();
            paths.extend(self.broken_paths.iter().cloned());
            paths.sort();
            Ok(paths)
        }

        async fn openapi_document(&self, path: &str) -> Result<Value> {
            self.documents
                .get(path)
                .cloned()
                .ok_or_else(|| Error::UserInputError(format!("no document for {path}")))
        }

        async fn groups(&self) -> Result<Vec<ApiGroupInfo>> {
            Ok(self.groups.clone())
        }

        async fn resources(&self) -> Result<Vec<APIResourceList>> {
            Ok(self.resources.clone())
        }
    }

    pub struct FakeDiscoveryFactory {
        pub discovery: Arc<FakeDiscovery>,
    }

    #[async_trait]
    impl DiscoveryFactory for FakeDiscoveryFactory {
        async fn create(&self, _config: &Config) -> Result<Arc<dyn Discovery>> {
            Ok(self.discovery.clone())
        }
    }

    pub fn resource_list(
        group_version: &str,
        resources: &[(&str, &str, bool, &[&str])],
    ) -> APIResourceList {
        APIResourceList {
            group_version: group_version.to_string(),
            resources: resources
                .iter()
                .map(|(kind, name, namespaced, categories)| APIResource {
                    kind: kind.to_string(),
                    name: name.to_string(),
                    namespaced: *namespaced,
                    singular_name: kind.to_lowercase(),
                    verbs: vec!["get".to_string(), "list".to_string()],
                    categories: if categories.is_empty() {
                        None
                    } else {
                        Some(categories.iter().map(|c| c.to_string()).collect())
                    },
                    ..APIResource::default()
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_mapper_scopes_from_resource_lists() {
        let discovery = FakeDiscovery {
            resources: vec![
                resource_list("v1", &[("Pod", "pods", true, &[]), ("Namespace", "namespaces", false, &[])]),
                resource_list("apps/v1", &[("Deployment", "deployments", true, &["all"])]),
            ],
            ..FakeDiscovery::default()
        };
        let mapper = DiscoveryRestMapper::from_discovery(&discovery).await.unwrap();

        assert_eq!(
            mapper.scope(&GroupVersionKind::gvk("", "v1", "Pod")),
            Some(ResourceScope::Namespaced)
        );
        assert_eq!(
            mapper.scope(&GroupVersionKind::gvk("", "v1", "Namespace")),
            Some(ResourceScope::Cluster)
        );
        assert_eq!(
            mapper.scope(&GroupVersionKind::gvk("apps", "v1", "Deployment")),
            Some(ResourceScope::Namespaced)
        );
        assert_eq!(mapper.scope(&GroupVersionKind::gvk("", "v1", "Unknown")), None);
    }

    #[test]
    fn test_split_group_version() {
        assert_eq!(split_group_version("v1"), ("", "v1"));
        assert_eq!(split_group_version("apps/v1"), ("apps", "v1"));
    }
}
