use crate::error::{Error, Result};
use crate::metrics::ControllerMetrics;
use crate::reconcile::SchemaReconciler;
use crate::schema::metadata::{AuthConfig, ClusterMetadata};
use crate::virtualworkspace::config::{self, VirtualWorkspace, VirtualWorkspacesConfig};
use crate::watcher::{self, FileEvent};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::prelude::*;
use futures::StreamExt;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Config;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Reconciles the declared virtual workspaces against the store.
///
/// Holds the currently applied configuration; on every reload, new or
/// changed workspaces are re-schematized and removed ones deleted.
/// Workspace processing happens outside the lock so a slow remote endpoint
/// never blocks a concurrent snapshot.
pub struct VirtualWorkspaceManager {
    schemas: Arc<SchemaReconciler>,
    metrics: ControllerMetrics,
    prefix: String,
    current: RwLock<HashMap<String, VirtualWorkspace>>,
}

impl VirtualWorkspaceManager {
    pub fn new(
        schemas: Arc<SchemaReconciler>,
        metrics: ControllerMetrics,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            schemas,
            metrics,
            prefix: prefix.into(),
            current: RwLock::new(HashMap::new()),
        }
    }

    fn schema_key(&self, name: &str) -> String {
        format!("{}/{}", self.prefix, name)
    }

    /// Diffs `desired` against the applied state and converges the store.
    ///
    /// Per-workspace failures are logged and do not block the other
    /// workspaces; the new configuration replaces the old one atomically.
    pub async fn apply(&self, desired: VirtualWorkspacesConfig) -> Result<()> {
        let desired: HashMap<String, VirtualWorkspace> = desired
            .virtual_workspaces
            .into_iter()
            .map(|vw| (vw.name.clone(), vw))
            .collect();
        let current = self.current.read().clone();

        for (name, workspace) in &desired {
            if current.get(name) == Some(workspace) {
                continue;
            }
            if let Err(e) = self.process(workspace).await {
                self.metrics.reconcile_failure_set(&e);
                error!(workspace = %name, error = %e, "failed to reconcile virtual workspace");
            }
        }
        for name in current.keys().filter(|name| !desired.contains_key(*name)) {
            if let Err(e) = self.schemas.cleanup(&[self.schema_key(name)]).await {
                self.metrics.reconcile_failure_set(&e);
                error!(workspace = %name, error = %e, "failed to clean up virtual workspace");
            }
        }

        *self.current.write() = desired;
        Ok(())
    }

    async fn process(&self, workspace: &VirtualWorkspace) -> Result<()> {
        let key = self.schema_key(&workspace.name);
        let (config, metadata) = client_config(workspace, &key).await?;
        self.schemas
            .reconcile(&[key], &config, Some(&metadata))
            .await
    }

    /// Runs the manager until cancellation: applies the file content once,
    /// then re-applies on every debounced change. A deleted file empties the
    /// configuration; a malformed one keeps the previous state.
    pub async fn run(&self, file: Option<PathBuf>, cancel: CancellationToken) -> Result<()> {
        if let Some(path) = file.as_deref() {
            self.reload(path).await;
        }
        let mut events =
            watcher::watch_optional(file.as_deref(), watcher::DEFAULT_DEBOUNCE, cancel)?;
        self.metrics.ready_set(1);
        while let Some(event) = events.next().await {
            match event {
                FileEvent::Changed(path) => self.reload(&path).await,
                FileEvent::Deleted(path) => {
                    info!(path = %path.display(), "virtual workspace config removed");
                    if let Err(e) = self.apply(VirtualWorkspacesConfig::default()).await {
                        error!(error = %e, "failed to apply empty virtual workspace config");
                    }
                }
            }
        }
        Ok(())
    }

    async fn reload(&self, path: &Path) {
        match config::load(path) {
            Ok(desired) => {
                info!(path = %path.display(), workspaces = desired.virtual_workspaces.len(), "virtual workspace config loaded");
                if let Err(e) = self.apply(desired).await {
                    error!(error = %e, "failed to apply virtual workspace config");
                }
            }
            Err(e) => {
                // the previous configuration stays in effect
                warn!(path = %path.display(), error = %e, "ignoring malformed virtual workspace config");
            }
        }
    }
}

/// Rest config and metadata for one virtual workspace endpoint.
///
/// Without a kubeconfig the connection is anonymous and TLS-insecure against
/// `<url>/clusters/root`; with one, the kubeconfig supplies everything but
/// the host.
async fn client_config(
    workspace: &VirtualWorkspace,
    key: &str,
) -> Result<(Config, ClusterMetadata)> {
    let url: http::Uri = workspace
        .url
        .parse()
        .map_err(|_| Error::InvalidVirtualWorkspaceUrl(workspace.url.clone()))?;

    let mut metadata = ClusterMetadata::new(workspace.url.clone(), key.to_string());

    match workspace.kubeconfig.as_deref().filter(|p| !p.is_empty()) {
        None => {
            let root: http::Uri = format!("{}/clusters/root", workspace.url.trim_end_matches('/'))
                .parse()
                .map_err(|_| Error::InvalidVirtualWorkspaceUrl(workspace.url.clone()))?;
            let mut config = Config::new(root);
            config.accept_invalid_certs = true;
            metadata.auth = Some(AuthConfig::Insecure);
            Ok((config, metadata))
        }
        Some(path) => {
            let bytes = std::fs::read(path).map_err(Error::IoError)?;
            let text = std::str::from_utf8(&bytes)
                .map_err(|e| Error::InvalidClusterAuth(format!("kubeconfig is not UTF-8: {e}")))?;
            let kubeconfig = Kubeconfig::from_yaml(text).map_err(Error::KubeconfigError)?;
            let mut config =
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(Error::KubeconfigError)?;
            config.cluster_url = url;
            metadata.auth = Some(AuthConfig::Kubeconfig {
                kubeconfig: BASE64_STANDARD.encode(&bytes),
            });
            Ok((config, metadata))
        }
    }
}
