use crate::controller::State;
use crate::crd::kcp::LogicalCluster;
use crate::error::Error;
use crate::metrics::{self, ControllerId};
use crate::reconcile::SchemaReconciler;
use crate::workspace::reconcile::{reconcile, WorkspaceContext};

use std::sync::Arc;

use futures::StreamExt;
use kube::api::{Api, ListParams, ResourceExt};
use kube::client::Client;
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::watcher;
use kube::Config;
use tokio::time::Duration;
use tracing::{error, info};

pub const CONTROLLER_ID: ControllerId = "workspace";

fn error_policy(obj: Arc<LogicalCluster>, error: &Error, ctx: Arc<WorkspaceContext>) -> Action {
    error!(msg = "failed reconciliation", name = %obj.name_any(), %error);
    ctx.common.metrics.reconcile_failure_set(error);
    Action::requeue(Duration::from_secs(5 * 60))
}

/// Initialize the initializing-workspace controller.
///
/// Watches `LogicalCluster` objects (through a workspace-aware endpoint)
/// and schematizes every workspace that carries `initializer`, releasing
/// the initializer afterwards.
pub async fn run(
    state: State,
    client: Client,
    config: Config,
    schemas: Arc<SchemaReconciler>,
    initializer: String,
) {
    let clusters = Api::<LogicalCluster>::all(client.clone());
    if let Err(e) = clusters.list(&ListParams::default().limit(1)).await {
        error!("LogicalClusters are not queryable; {e:?}. Is this a kcp endpoint?");
        std::process::exit(1);
    }

    let ctx = Arc::new(WorkspaceContext {
        common: state.to_context(client, config, CONTROLLER_ID, schemas),
        initializer,
    });

    info!(msg = "starting workspace controller", initializer = %ctx.initializer);
    let controller = Controller::new(clusters, watcher::Config::default().any_semantic())
        .with_config(controller::Config::default().debounce(Duration::from_millis(500)))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx.clone())
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| {
            let ctx = ctx.clone();
            async move {
                ctx.common
                    .metrics
                    .triggered_inc(metrics::Action::Apply, "LogicalCluster");
            }
        });

    ctx.common.metrics.ready_set(1);
    controller.await;
}
