use crate::crd::kcp::{LogicalCluster, PATH_ANNOTATION};
use crate::error::{Error, Result};

use kube::api::Api;
use kube::{Client, Config, Resource, ResourceExt};
use schema_listener_k8s_util::cluster::config_for_cluster;
use tracing::debug;

/// Maps an internal cluster name or hash to its human workspace path.
///
/// The path lives in the `kcp.io/path` annotation of the `LogicalCluster`
/// singleton; looking it up requires a client scoped to the cluster itself.
pub struct ClusterPathResolver {
    config: Config,
}

impl ClusterPathResolver {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Resolves `name` to the workspace path.
    ///
    /// A deleted cluster resolves to [`Error::ClusterDeleted`] carrying the
    /// path, so the caller can still clean up the schema written under it.
    pub async fn resolve(&self, name: &str) -> Result<String> {
        if name == "root" {
            return Ok("root".to_string());
        }
        let config = config_for_cluster(&self.config, name).map_err(Error::InvalidUri)?;
        let client = Client::try_from(config).map_err(Error::KubeError)?;
        Self::resolve_with(client, name).await
    }

    async fn resolve_with(client: Client, name: &str) -> Result<String> {
        let api: Api<LogicalCluster> = Api::all(client);
        let cluster = api.get("cluster").await.map_err(Error::KubeError)?;
        let path = path_from(&cluster);
        debug!(%name, path = ?path, "resolved logical cluster");
        path
    }
}

/// Reads the workspace path off a logical cluster, distinguishing a cluster
/// in deletion from a live one.
fn path_from(cluster: &LogicalCluster) -> Result<String> {
    let path = cluster
        .annotations()
        .get(PATH_ANNOTATION)
        .cloned()
        .ok_or(Error::MissingPathAnnotation)?;
    if cluster.meta().deletion_timestamp.is_some() {
        return Err(Error::ClusterDeleted { path });
    }
    Ok(path)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crd::kcp::LogicalClusterSpec;

    use http::{Request, Response};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube::client::Body;
    use kube::Resource;

    fn logical_cluster(path: Option<&str>, deleted: bool) -> LogicalCluster {
        let mut lc = LogicalCluster::new("cluster", LogicalClusterSpec::default());
        if let Some(path) = path {
            lc.annotations_mut()
                .insert(PATH_ANNOTATION.to_string(), path.to_string());
        }
        if deleted {
            lc.meta_mut().deletion_timestamp = Some(Time(
                chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
                    .unwrap()
                    .into(),
            ));
        }
        lc
    }

    #[tokio::test]
    async fn test_root_is_returned_verbatim() {
        let resolver =
            ClusterPathResolver::new(Config::new("https://kcp.example.com".parse().unwrap()));
        assert_eq!(resolver.resolve("root").await.unwrap(), "root");
    }

    #[test]
    fn test_annotation_is_resolved() {
        let path = path_from(&logical_cluster(Some("root:orgs:acme"), false)).unwrap();
        assert_eq!(path, "root:orgs:acme");
    }

    #[test]
    fn test_missing_annotation_fails() {
        let result = path_from(&logical_cluster(None, false));
        assert!(matches!(result, Err(Error::MissingPathAnnotation)));
    }

    #[test]
    fn test_deleted_cluster_carries_path_in_error() {
        match path_from(&logical_cluster(Some("root:orgs:acme"), true)) {
            Err(Error::ClusterDeleted { path }) => assert_eq!(path, "root:orgs:acme"),
            other => panic!("expected ClusterDeleted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lookup_fetches_the_singleton() {
        let (mock_service, mut handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(
                request.uri().to_string(),
                "/apis/core.kcp.io/v1alpha1/logicalclusters/cluster"
            );
            let body =
                serde_json::to_vec(&logical_cluster(Some("root:orgs:acme"), false)).unwrap();
            send.send_response(Response::builder().body(Body::from(body)).unwrap());
        });

        let client = Client::new(mock_service, "default");
        let path = ClusterPathResolver::resolve_with(client, "abc123")
            .await
            .unwrap();
        assert_eq!(path, "root:orgs:acme");
        server.await.unwrap();
    }
}
