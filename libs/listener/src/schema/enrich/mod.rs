pub mod categories;
pub mod preferred;
pub mod relationships;
pub mod scope;

use crate::error::{Error, Result};
use crate::schema::set::SchemaSet;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

/// `(group, kind)` → preferred version, produced by the preferred-versions
/// enricher and consumed by the relationships enricher to disambiguate
/// cross-group references.
pub type PreferredVersionMap = Arc<RwLock<HashMap<(String, String), String>>>;

/// One in-place mutation step of the schema pipeline.
///
/// Enrichers add cluster-system metadata the raw OpenAPI documents do not
/// carry. They run in a fixed order; a failure aborts the pipeline.
pub trait Enricher: Send + Sync {
    fn name(&self) -> &'static str;
    fn enrich(&self, schemas: &mut SchemaSet) -> Result<()>;
}

/// Runs the chain in order, wrapping the first failure with the enricher name
pub fn run(enrichers: &[Box<dyn Enricher>], schemas: &mut SchemaSet) -> Result<()> {
    for enricher in enrichers {
        debug!(enricher = enricher.name(), "running enricher");
        enricher
            .enrich(schemas)
            .map_err(|source| Error::EnricherError {
                name: enricher.name(),
                source: Box::new(source),
            })?;
    }
    Ok(())
}

/// Sets an extension key on a schema, skipping values that are not objects
pub(crate) fn set_extension(schema: &mut Value, key: &str, value: Value) {
    if let Some(object) = schema.as_object_mut() {
        object.insert(key.to_string(), value);
    }
}
