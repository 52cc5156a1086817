use crate::metrics::{ControllerId, ControllerMetrics, Metrics};
use crate::reconcile::SchemaReconciler;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kube::client::Client;
use kube::runtime::events::Reporter;
use kube::Config;
use prometheus_client::registry::Registry;
use serde::Serialize;
use tokio::sync::RwLock;

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
    #[serde(skip)]
    pub reporter: Reporter,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            reporter: "schema-listener".into(),
        }
    }
}

/// State shared between the controllers and the web server
#[derive(Clone)]
pub struct State {
    registry: Arc<Registry>,
    metrics: Metrics,
    diagnostics: Arc<RwLock<Diagnostics>>,
}

impl State {
    /// Registers the metric families and pre-creates a ready gauge per
    /// controller so `/metrics` exposes them from the start.
    pub fn new(mut registry: Registry, controllers: &[ControllerId]) -> Self {
        let metrics = Metrics::default().register(&mut registry);
        for controller in controllers {
            metrics.for_controller(controller).ready_set(0);
        }
        Self {
            registry: Arc::new(registry),
            metrics,
            diagnostics: Arc::default(),
        }
    }

    /// Metrics getter
    pub fn metrics(&self) -> Result<String, std::fmt::Error> {
        crate::metrics::encode(&self.registry)
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    pub fn controller_metrics(&self, controller: ControllerId) -> ControllerMetrics {
        self.metrics.for_controller(controller)
    }

    /// Create a Controller Context that can update State
    pub fn to_context(
        &self,
        client: Client,
        config: Config,
        controller: ControllerId,
        schemas: Arc<SchemaReconciler>,
    ) -> Arc<Context> {
        Arc::new(Context {
            client,
            config,
            metrics: self.metrics.for_controller(controller),
            diagnostics: self.diagnostics.clone(),
            schemas,
        })
    }
}

/// Context injected into every reconcile invocation
pub struct Context {
    /// Kubernetes client for the watched cluster
    pub client: Client,
    /// Rest config the client was built from; per-cluster configs are
    /// derived from it
    pub config: Config,
    /// Prometheus metrics bound to this controller
    pub metrics: ControllerMetrics,
    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Shared schema reconciler all triggers converge on
    pub schemas: Arc<SchemaReconciler>,
}
