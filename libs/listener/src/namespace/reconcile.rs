use crate::clusterpath::ClusterPathResolver;
use crate::controller::Context;
use crate::crd::kcp::{APIBinding, CLUSTER_ANNOTATION, PATH_ANNOTATION, SYSTEM_WORKSPACE_PREFIX};
use crate::error::{Error, Result};
use crate::schema::metadata::ClusterMetadata;
use crate::telemetry;

use std::sync::Arc;

use chrono::Utc;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, ListParams, ResourceExt};
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Event as Finalizer};
use kube::{Client, Config};
use schema_listener_k8s_util::cluster::config_for_cluster;
use tokio::time::Duration;
use tracing::{debug, field, info, instrument, Span};

pub static NAMESPACE_FINALIZER: &str = "gateway.platform-mesh.io/schema";

/// Key used when the cluster carries no API binding with a workspace path
pub const DEFAULT_KEY: &str = "default";

const REQUEUE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Schema key of the cluster an anchor namespace lives in: the workspace
/// path annotated on any bound API binding, `default` otherwise.
pub async fn derive_key(client: &Client) -> String {
    let bindings: Api<APIBinding> = Api::all(client.clone());
    match bindings.list(&ListParams::default()).await {
        Ok(list) => list
            .items
            .iter()
            .find_map(|binding| binding.annotations().get(PATH_ANNOTATION).cloned())
            .unwrap_or_else(|| DEFAULT_KEY.to_string()),
        Err(e) => {
            debug!(error = %e, "api bindings not listable, using default schema key");
            DEFAULT_KEY.to_string()
        }
    }
}

/// Config and client for the cluster the namespace was observed in
fn target(ctx: &Context, namespace: &Namespace) -> Result<(Config, Client)> {
    match namespace.annotations().get(CLUSTER_ANNOTATION) {
        Some(cluster) => {
            let config = config_for_cluster(&ctx.config, cluster).map_err(Error::InvalidUri)?;
            let client = Client::try_from(config.clone()).map_err(Error::KubeError)?;
            Ok((config, client))
        }
        None => Ok((ctx.config.clone(), ctx.client.clone())),
    }
}

#[instrument(skip(ctx, namespace), fields(trace_id))]
pub async fn reconcile(namespace: Arc<Namespace>, ctx: Arc<Context>) -> Result<Action> {
    let trace_id = telemetry::get_trace_id();
    Span::current().record("trace_id", field::display(&trace_id));

    let _timer = ctx.metrics.reconcile_count_and_measure(&trace_id);
    ctx.diagnostics.write().await.last_event = Utc::now();

    info!(msg = "reconciling anchor namespace", name = %namespace.name_any());

    let api: Api<Namespace> = Api::all(ctx.client.clone());
    finalizer(&api, NAMESPACE_FINALIZER, namespace, |event| async {
        match event {
            Finalizer::Apply(namespace) => apply(namespace, ctx.clone()).await,
            Finalizer::Cleanup(namespace) => cleanup(namespace, ctx.clone()).await,
        }
    })
    .await
    .map_err(|e| Error::FinalizerError(Box::new(e)))
}

async fn apply(namespace: Arc<Namespace>, ctx: Arc<Context>) -> Result<Action> {
    let (config, client) = target(&ctx, &namespace)?;
    let mut key = derive_key(&client).await;

    // without an annotated binding, a workspace-observed namespace can
    // still be keyed by its workspace path
    if key == DEFAULT_KEY {
        if let Some(cluster) = namespace.annotations().get(CLUSTER_ANNOTATION) {
            match ClusterPathResolver::new(ctx.config.clone())
                .resolve(cluster)
                .await
            {
                Ok(path) => key = path,
                Err(Error::ClusterDeleted { path }) => {
                    ctx.schemas.cleanup(&[path]).await?;
                    return Ok(Action::await_change());
                }
                Err(e) => {
                    debug!(%cluster, error = %e, "workspace path not resolvable, using default schema key");
                }
            }
        }
    }

    if key.starts_with(SYSTEM_WORKSPACE_PREFIX) {
        debug!(%key, "system workspace, ignoring");
        return Ok(Action::await_change());
    }

    let metadata = ClusterMetadata::new(config.cluster_url.to_string(), key.clone());
    ctx.schemas
        .reconcile(&[key], &config, Some(&metadata))
        .await?;
    Ok(Action::requeue(REQUEUE_INTERVAL))
}

async fn cleanup(namespace: Arc<Namespace>, ctx: Arc<Context>) -> Result<Action> {
    // the bindings may already be gone with the cluster; the fallback key
    // still cleans up single-cluster deployments
    let key = match target(&ctx, &namespace) {
        Ok((_, client)) => derive_key(&client).await,
        Err(_) => DEFAULT_KEY.to_string(),
    };
    ctx.schemas.cleanup(&[key]).await?;
    Ok(Action::await_change())
}
