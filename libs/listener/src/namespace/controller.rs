use crate::controller::{Context, State};
use crate::error::Error;
use crate::metrics::{self, ControllerId};
use crate::namespace::reconcile::reconcile;
use crate::reconcile::SchemaReconciler;

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, ListParams, ResourceExt};
use kube::client::Client;
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::watcher;
use kube::Config;
use tokio::time::Duration;
use tracing::{error, info};

pub const CONTROLLER_ID: ControllerId = "namespace";

fn error_policy(obj: Arc<Namespace>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(msg = "failed reconciliation", name = %obj.name_any(), %error);
    ctx.metrics.reconcile_failure_set(error);
    Action::requeue(Duration::from_secs(5 * 60))
}

/// Initialize the anchor-namespace controller.
///
/// Only the namespace named `anchor` is watched; its presence is the signal
/// that the containing cluster should be schematized.
pub async fn run(
    state: State,
    client: Client,
    config: Config,
    schemas: Arc<SchemaReconciler>,
    anchor: String,
) {
    let namespaces = Api::<Namespace>::all(client.clone());
    if let Err(e) = namespaces.list(&ListParams::default().limit(1)).await {
        error!("namespaces are not queryable; {e:?}");
        std::process::exit(1);
    }

    let ctx = state.to_context(client, config, CONTROLLER_ID, schemas);

    info!(msg = "starting namespace controller", %anchor);
    let watch = watcher::Config::default()
        .fields(&format!("metadata.name={anchor}"))
        .any_semantic();
    let controller = Controller::new(namespaces, watch)
        .with_config(controller::Config::default().debounce(Duration::from_millis(500)))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx.clone())
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| {
            let ctx = ctx.clone();
            async move {
                ctx.metrics.triggered_inc(metrics::Action::Apply, "Namespace");
            }
        });

    ctx.metrics.ready_set(1);
    controller.await;
}
