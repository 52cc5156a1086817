use crate::anchor::predicate::Predicate;
use crate::anchor::reconcile::{reconcile, AnchorContext};
use crate::controller::State;
use crate::discovery::split_group_version;
use crate::error::{Error, Result};
use crate::metrics::{self, ControllerId};
use crate::reconcile::SchemaReconciler;

use std::sync::Arc;

use futures::StreamExt;
use kube::api::{Api, DynamicObject, ResourceExt};
use kube::client::Client;
use kube::core::GroupVersionKind;
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::watcher;
use kube::Config;
use tokio::time::Duration;
use tracing::{error, info};

pub const CONTROLLER_ID: ControllerId = "anchor";

fn error_policy(obj: Arc<DynamicObject>, error: &Error, ctx: Arc<AnchorContext>) -> Action {
    error!(msg = "failed reconciliation", name = %obj.name_any(), %error);
    ctx.common.metrics.reconcile_failure_set(error);
    Action::requeue(Duration::from_secs(5 * 60))
}

/// Initialize the anchor-resource controller.
///
/// The watched type is configured as `api_version` + `kind` and resolved
/// through discovery; `expression` is a CEL predicate over the watched
/// objects. A predicate or discovery failure fails setup, not
/// reconciliation.
pub async fn run(
    state: State,
    client: Client,
    config: Config,
    schemas: Arc<SchemaReconciler>,
    api_version: String,
    kind: String,
    expression: String,
) -> Result<()> {
    let predicate = Predicate::compile(&expression)?;

    let (group, version) = split_group_version(&api_version);
    let gvk = GroupVersionKind::gvk(group, version, &kind);
    let (resource, _capabilities) = kube::discovery::pinned_kind(&client, &gvk)
        .await
        .map_err(Error::KubeError)?;
    let objects: Api<DynamicObject> = Api::all_with(client.clone(), &resource);

    let ctx = Arc::new(AnchorContext {
        common: state.to_context(client, config, CONTROLLER_ID, schemas),
        resource: resource.clone(),
        predicate,
    });

    info!(msg = "starting anchor controller", %gvk.kind, expression = ctx.predicate.expression());
    let controller = Controller::new_with(
        objects,
        watcher::Config::default().any_semantic(),
        resource,
    )
    .with_config(controller::Config::default().debounce(Duration::from_millis(500)))
    .shutdown_on_signal()
    .run(reconcile, error_policy, ctx.clone())
    .filter_map(|x| async move { std::result::Result::ok(x) })
    .for_each(|_| {
        let ctx = ctx.clone();
        async move {
            ctx.common
                .metrics
                .triggered_inc(metrics::Action::Apply, "Anchor");
        }
    });

    ctx.common.metrics.ready_set(1);
    controller.await;
    Ok(())
}
