use crate::discovery::{DiscoveryFactory, DiscoveryRestMapper, RestMapper};
use crate::error::Result;
use crate::schema::metadata::{self, ClusterMetadata};
use crate::schema::resolver;
use crate::store::{SchemaStore, StoreError};

use std::sync::Arc;

use kube::Config;
use tracing::{debug, info, instrument};

/// Per-cluster schema generation against the store.
///
/// All trigger variants converge here: they derive `(keys, config,
/// metadata)` and this reconciler resolves the schema, stamps the metadata
/// and diffs against the store. Writes only happen when bytes actually
/// changed, so downstream subscribers never see spurious events.
pub struct SchemaReconciler {
    store: Arc<dyn SchemaStore>,
    factory: Arc<dyn DiscoveryFactory>,
}

impl SchemaReconciler {
    pub fn new(store: Arc<dyn SchemaStore>, factory: Arc<dyn DiscoveryFactory>) -> Self {
        Self { store, factory }
    }

    /// Generates and stores the schema document under each key.
    ///
    /// Discovery and the rest mapper are built once per call; the first
    /// failing key short-circuits, keys already written stay written.
    #[instrument(skip_all, fields(keys = ?keys))]
    pub async fn reconcile(
        &self,
        keys: &[String],
        config: &Config,
        metadata: Option<&ClusterMetadata>,
    ) -> Result<()> {
        let discovery = self.factory.create(config).await?;
        let mapper: Arc<dyn RestMapper> =
            Arc::new(DiscoveryRestMapper::from_discovery(discovery.as_ref()).await?);

        for key in keys {
            let resolved = resolver::resolve(discovery.as_ref(), mapper.clone()).await?;
            let desired = metadata::inject(&resolved, metadata)?;

            match self.store.read(key).await {
                Ok(existing) if existing == desired => {
                    debug!(%key, "schema unchanged, skipping write");
                    continue;
                }
                Ok(_) => {}
                Err(e) if e.is_not_exist() => {}
                Err(e) => return Err(e.into()),
            }
            self.store.write(key, desired).await?;
            info!(%key, "schema written");
        }
        Ok(())
    }

    /// Deletes each key; absent keys are not an error.
    #[instrument(skip_all, fields(keys = ?keys))]
    pub async fn cleanup(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            match self.store.delete(key).await {
                Ok(()) => info!(%key, "schema deleted"),
                Err(StoreError::NotExist(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
