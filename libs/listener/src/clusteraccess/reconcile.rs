use crate::clusteraccess::auth;
use crate::controller::Context;
use crate::crd::cluster_access::ClusterAccess;
use crate::crd::kcp::CLUSTER_ANNOTATION;
use crate::error::{Error, Result};
use crate::telemetry;

use std::sync::Arc;

use chrono::Utc;
use kube::api::{Api, ResourceExt};
use kube::runtime::controller::Action;
use kube::runtime::finalizer::{finalizer, Event as Finalizer};
use tokio::time::Duration;
use tracing::{field, info, instrument, Span};

pub static CLUSTER_ACCESS_FINALIZER: &str = "gateway.platform-mesh.io/schema";

/// Discovery output changes as APIs are installed or removed, so reconciled
/// clusters are revisited periodically even without watch events.
const REQUEUE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Schema key owned by a `ClusterAccess`: `spec.path` when set, the CR name
/// otherwise, prefixed with the observed logical cluster when the CR was
/// seen through a workspace-aware endpoint.
pub fn schema_key(access: &ClusterAccess) -> String {
    let base = access
        .spec
        .path
        .clone()
        .unwrap_or_else(|| access.name_any());
    match access.annotations().get(CLUSTER_ANNOTATION) {
        Some(cluster) => format!("{cluster}-{base}"),
        None => base,
    }
}

#[instrument(skip(ctx, access), fields(trace_id))]
pub async fn reconcile(access: Arc<ClusterAccess>, ctx: Arc<Context>) -> Result<Action> {
    let trace_id = telemetry::get_trace_id();
    Span::current().record("trace_id", field::display(&trace_id));

    let _timer = ctx.metrics.reconcile_count_and_measure(&trace_id);
    ctx.diagnostics.write().await.last_event = Utc::now();

    let name = access.name_any();
    info!(msg = "reconciling ClusterAccess", %name);

    let api: Api<ClusterAccess> = Api::all(ctx.client.clone());
    finalizer(&api, CLUSTER_ACCESS_FINALIZER, access, |event| async {
        match event {
            Finalizer::Apply(access) => apply(access, ctx.clone()).await,
            Finalizer::Cleanup(access) => cleanup(access, ctx.clone()).await,
        }
    })
    .await
    .map_err(|e| Error::FinalizerError(Box::new(e)))
}

async fn apply(access: Arc<ClusterAccess>, ctx: Arc<Context>) -> Result<Action> {
    let key = schema_key(&access);
    let (config, metadata) = auth::build(&ctx.client, &access, &key).await?;
    ctx.schemas
        .reconcile(&[key], &config, Some(&metadata))
        .await?;
    Ok(Action::requeue(REQUEUE_INTERVAL))
}

async fn cleanup(access: Arc<ClusterAccess>, ctx: Arc<Context>) -> Result<Action> {
    ctx.schemas.cleanup(&[schema_key(&access)]).await?;
    Ok(Action::await_change())
}
