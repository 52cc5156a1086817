use crate::anchor::predicate::Predicate;
use crate::controller::Context;
use crate::crd::kcp::CLUSTER_ANNOTATION;
use crate::error::{Error, Result};
use crate::schema::metadata::ClusterMetadata;
use crate::telemetry;

use std::sync::Arc;

use chrono::Utc;
use kube::api::{Api, ApiResource, DynamicObject, ResourceExt};
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Event as Finalizer};
use kube::{Client, Config};
use schema_listener_k8s_util::cluster::config_for_cluster;
use tokio::time::Duration;
use tracing::{debug, field, info, instrument, Span};

pub static ANCHOR_FINALIZER: &str = "gateway.platform-mesh.io/schema";

/// Key used for anchors observed outside any logical cluster
pub const DEFAULT_KEY: &str = "default";

const REQUEUE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Context of the anchor-resource controller: the common context plus the
/// watched resource type and the compiled predicate.
pub struct AnchorContext {
    pub common: Arc<Context>,
    pub resource: ApiResource,
    pub predicate: Predicate,
}

/// Schema key owned by an anchor object: the logical cluster it was
/// observed in, `default` otherwise.
pub fn schema_key(object: &DynamicObject) -> String {
    object
        .annotations()
        .get(CLUSTER_ANNOTATION)
        .cloned()
        .unwrap_or_else(|| DEFAULT_KEY.to_string())
}

/// Config and client for the cluster the anchor was observed in
fn target(ctx: &AnchorContext, object: &DynamicObject) -> Result<(Config, Client)> {
    match object.annotations().get(CLUSTER_ANNOTATION) {
        Some(cluster) => {
            let config =
                config_for_cluster(&ctx.common.config, cluster).map_err(Error::InvalidUri)?;
            let client = Client::try_from(config.clone()).map_err(Error::KubeError)?;
            Ok((config, client))
        }
        None => Ok((ctx.common.config.clone(), ctx.common.client.clone())),
    }
}

#[instrument(skip(ctx, object), fields(trace_id))]
pub async fn reconcile(object: Arc<DynamicObject>, ctx: Arc<AnchorContext>) -> Result<Action> {
    let trace_id = telemetry::get_trace_id();
    Span::current().record("trace_id", field::display(&trace_id));

    let _timer = ctx.common.metrics.reconcile_count_and_measure(&trace_id);
    ctx.common.diagnostics.write().await.last_event = Utc::now();

    let matches = serde_json::to_value(object.as_ref())
        .map(|value| ctx.predicate.matches(&value))
        .unwrap_or(false);
    if !matches && object.finalizers().is_empty() {
        debug!(name = %object.name_any(), "anchor predicate did not match");
        return Ok(Action::await_change());
    }

    info!(msg = "reconciling anchor resource", name = %object.name_any());

    let api: Api<DynamicObject> = match object.namespace() {
        Some(namespace) => {
            Api::namespaced_with(ctx.common.client.clone(), &namespace, &ctx.resource)
        }
        None => Api::all_with(ctx.common.client.clone(), &ctx.resource),
    };
    finalizer(&api, ANCHOR_FINALIZER, object, |event| async {
        match event {
            Finalizer::Apply(object) => apply(object, ctx.clone(), matches).await,
            Finalizer::Cleanup(object) => cleanup(object, ctx.clone()).await,
        }
    })
    .await
    .map_err(|e| Error::FinalizerError(Box::new(e)))
}

async fn apply(
    object: Arc<DynamicObject>,
    ctx: Arc<AnchorContext>,
    matches: bool,
) -> Result<Action> {
    if !matches {
        // the object stopped matching; keep the schema until it is deleted
        return Ok(Action::await_change());
    }
    let key = schema_key(&object);
    let (config, _) = target(&ctx, &object)?;
    let metadata = ClusterMetadata::new(config.cluster_url.to_string(), key.clone());
    ctx.common
        .schemas
        .reconcile(&[key], &config, Some(&metadata))
        .await?;
    Ok(Action::requeue(REQUEUE_INTERVAL))
}

async fn cleanup(object: Arc<DynamicObject>, ctx: Arc<AnchorContext>) -> Result<Action> {
    ctx.common.schemas.cleanup(&[schema_key(&object)]).await?;
    Ok(Action::await_change())
}
