use crate::controller::Context;
use crate::crd::kcp::{
    LogicalCluster, CLUSTER_ANNOTATION, PATH_ANNOTATION, SYSTEM_WORKSPACE_PREFIX,
};
use crate::error::{Error, Result};
use crate::schema::metadata::ClusterMetadata;
use crate::telemetry;

use std::sync::Arc;

use chrono::Utc;
use kube::api::{Api, Patch, PatchParams, ResourceExt};
use kube::runtime::controller::Action;
use kube::{Client, Resource};
use schema_listener_k8s_util::cluster::config_for_cluster;
use serde_json::json;
use tracing::{debug, field, info, instrument, warn, Span};

/// Context of the workspace controller: the common context plus the
/// initializer this listener owns.
pub struct WorkspaceContext {
    pub common: Arc<Context>,
    pub initializer: String,
}

/// Reconciles a logical cluster carrying this listener's initializer: write
/// its schema, then release the initializer so the workspace can go ready.
#[instrument(skip(ctx, cluster), fields(trace_id))]
pub async fn reconcile(cluster: Arc<LogicalCluster>, ctx: Arc<WorkspaceContext>) -> Result<Action> {
    let trace_id = telemetry::get_trace_id();
    Span::current().record("trace_id", field::display(&trace_id));

    let _timer = ctx.common.metrics.reconcile_count_and_measure(&trace_id);
    ctx.common.diagnostics.write().await.last_event = Utc::now();

    let Some(cluster_name) = cluster.annotations().get(CLUSTER_ANNOTATION).cloned() else {
        debug!("logical cluster carries no cluster annotation, ignoring");
        return Ok(Action::await_change());
    };
    let path = cluster
        .annotations()
        .get(PATH_ANNOTATION)
        .cloned()
        .ok_or(Error::MissingPathAnnotation)?;

    if path.starts_with(SYSTEM_WORKSPACE_PREFIX)
        || cluster_name.starts_with(SYSTEM_WORKSPACE_PREFIX)
    {
        debug!(%path, "system workspace, ignoring");
        return Ok(Action::await_change());
    }

    if cluster.meta().deletion_timestamp.is_some() {
        info!(msg = "workspace is being deleted, cleaning up schema", %path);
        ctx.common.schemas.cleanup(&[path]).await?;
        return Ok(Action::await_change());
    }

    if !cluster.has_initializer(&ctx.initializer) {
        debug!(%path, "workspace does not carry our initializer");
        return Ok(Action::await_change());
    }

    info!(msg = "reconciling initializing workspace", %path);
    let config = config_for_cluster(&ctx.common.config, &path).map_err(Error::InvalidUri)?;
    let metadata = ClusterMetadata::new(config.cluster_url.to_string(), path.clone());
    ctx.common
        .schemas
        .reconcile(&[path.clone()], &config, Some(&metadata))
        .await?;

    remove_initializer(&ctx, &path, &cluster).await?;
    Ok(Action::await_change())
}

/// Removes the owned initializer from the workspace's spec and, best-effort,
/// from its status.
async fn remove_initializer(
    ctx: &WorkspaceContext,
    path: &str,
    cluster: &LogicalCluster,
) -> Result<()> {
    let config = config_for_cluster(&ctx.common.config, path).map_err(Error::InvalidUri)?;
    let client = Client::try_from(config).map_err(Error::KubeError)?;
    let api: Api<LogicalCluster> = Api::all(client);

    let remaining: Vec<&String> = cluster
        .spec
        .initializers
        .iter()
        .filter(|i| **i != ctx.initializer)
        .collect();
    api.patch(
        "cluster",
        &PatchParams::default(),
        &Patch::Merge(json!({"spec": {"initializers": remaining}})),
    )
    .await
    .map_err(Error::KubeError)?;

    if let Some(initializers) = cluster
        .status
        .as_ref()
        .and_then(|status| status.initializers.as_ref())
    {
        let remaining: Vec<&String> = initializers
            .iter()
            .filter(|i| **i != ctx.initializer)
            .collect();
        if let Err(e) = api
            .patch_status(
                "cluster",
                &PatchParams::default(),
                &Patch::Merge(json!({"status": {"initializers": remaining}})),
            )
            .await
        {
            warn!(%path, error = %e, "failed to remove initializer from status");
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crd::kcp::LogicalClusterSpec;
    use crate::store::SchemaStore;

    use bytes::Bytes;

    const INITIALIZER: &str = "gateway.platform-mesh.io/schema";

    fn workspace(
        cluster: Option<&str>,
        path: Option<&str>,
        initializers: &[&str],
    ) -> LogicalCluster {
        let mut lc = LogicalCluster::new(
            "cluster",
            LogicalClusterSpec {
                directly_deletable: false,
                initializers: initializers.iter().map(|i| i.to_string()).collect(),
            },
        );
        if let Some(cluster) = cluster {
            lc.annotations_mut()
                .insert(CLUSTER_ANNOTATION.to_string(), cluster.to_string());
        }
        if let Some(path) = path {
            lc.annotations_mut()
                .insert(PATH_ANNOTATION.to_string(), path.to_string());
        }
        lc
    }

    fn context() -> (Arc<WorkspaceContext>, Arc<crate::store::memory::InMemoryStore>) {
        let (common, _verifier, store) = Context::test();
        (
            Arc::new(WorkspaceContext {
                common,
                initializer: INITIALIZER.to_string(),
            }),
            store,
        )
    }

    #[tokio::test]
    async fn test_system_workspaces_are_ignored() {
        let (ctx, store) = context();
        let lc = workspace(Some("abc"), Some("system:shard"), &[INITIALIZER]);

        reconcile(Arc::new(lc), ctx).await.unwrap();
        assert!(store.read("system:shard").await.unwrap_err().is_not_exist());
    }

    #[tokio::test]
    async fn test_workspace_without_cluster_annotation_is_ignored() {
        let (ctx, _store) = context();
        let lc = workspace(None, Some("root:orgs"), &[INITIALIZER]);
        reconcile(Arc::new(lc), ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_path_annotation_is_an_error() {
        let (ctx, _store) = context();
        let lc = workspace(Some("abc"), None, &[INITIALIZER]);
        let result = reconcile(Arc::new(lc), ctx).await;
        assert!(matches!(result, Err(Error::MissingPathAnnotation)));
    }

    #[tokio::test]
    async fn test_workspace_without_initializer_is_ignored() {
        let (ctx, store) = context();
        let lc = workspace(Some("abc"), Some("root:orgs"), &[]);

        reconcile(Arc::new(lc), ctx).await.unwrap();
        assert!(store.read("root:orgs").await.unwrap_err().is_not_exist());
    }

    #[tokio::test]
    async fn test_deleted_workspace_cleans_up_schema() {
        let (ctx, store) = context();
        store
            .write("root:orgs", Bytes::from_static(b"{}"))
            .await
            .unwrap();
        let mut lc = workspace(Some("abc"), Some("root:orgs"), &[INITIALIZER]);
        use chrono::prelude::{TimeZone, Utc};
        use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
        lc.meta_mut().deletion_timestamp =
            Some(Time(Utc.with_ymd_and_hms(2017, 4, 2, 12, 50, 32).unwrap()));

        reconcile(Arc::new(lc), ctx).await.unwrap();
        assert!(store.read("root:orgs").await.unwrap_err().is_not_exist());
    }
}
