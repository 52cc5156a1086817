use crate::clusteraccess::reconcile::reconcile;
use crate::controller::{Context, State};
use crate::crd::cluster_access::ClusterAccess;
use crate::error::Error;
use crate::metrics::{self, ControllerId};
use crate::reconcile::SchemaReconciler;

use std::sync::Arc;

use futures::StreamExt;
use kube::api::{Api, ListParams, ResourceExt};
use kube::client::Client;
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::watcher;
use kube::Config;
use tokio::time::Duration;
use tracing::{error, info};

pub const CONTROLLER_ID: ControllerId = "clusteraccess";

fn error_policy(obj: Arc<ClusterAccess>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(msg = "failed reconciliation", name = %obj.name_any(), %error);
    ctx.metrics.reconcile_failure_set(error);
    Action::requeue(Duration::from_secs(5 * 60))
}

/// Initialize the cluster-access controller (given the crd is installed)
pub async fn run(state: State, client: Client, config: Config, schemas: Arc<SchemaReconciler>) {
    let accesses = Api::<ClusterAccess>::all(client.clone());
    if let Err(e) = accesses.list(&ListParams::default().limit(1)).await {
        error!("ClusterAccess CRD is not queryable; {e:?}. Is the CRD installed?");
        std::process::exit(1);
    }

    let ctx = state.to_context(client, config, CONTROLLER_ID, schemas);

    info!(msg = "starting clusteraccess controller");
    let controller = Controller::new(accesses, watcher::Config::default().any_semantic())
        // debounce to filter out reconcile calls that happen in quick succession
        .with_config(controller::Config::default().debounce(Duration::from_millis(500)))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx.clone())
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| {
            let ctx = ctx.clone();
            async move {
                ctx.metrics
                    .triggered_inc(metrics::Action::Apply, "ClusterAccess");
            }
        });

    ctx.metrics.ready_set(1);
    controller.await;
}
