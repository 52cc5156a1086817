use crate::discovery::Discovery;
use crate::error::Result;
use crate::schema::set::{extract_gvk, short_key, SchemaSet};

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::{debug, warn};

/// Loads every served OpenAPI v3 document and normalizes it into a
/// [`SchemaSet`].
///
/// Per-document failures are logged and skipped so one broken group version
/// does not abort the whole cluster; duplicate schema names across documents
/// resolve last-write-wins. The loader has no side effects beyond the
/// returned set.
pub async fn load(discovery: &dyn Discovery) -> Result<SchemaSet> {
    let mut raw: BTreeMap<String, Value> = BTreeMap::new();
    for path in discovery.openapi_paths().await? {
        match discovery.openapi_document(&path).await {
            Ok(document) => {
                let schemas = document
                    .pointer("/components/schemas")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                debug!(%path, schemas = schemas.len(), "loaded openapi document");
                raw.extend(schemas);
            }
            Err(e) => {
                warn!(%path, error = %e, "failed to fetch openapi document, skipping");
            }
        }
    }
    Ok(build_set(raw))
}

/// Re-keys the raw schemas by short key and rewrites `$ref` pointers to the
/// `#/definitions/<short>` form, so serialized documents use `v1.Pod` rather
/// than `#/components/schemas/io.k8s.api.core.v1.Pod`.
fn build_set(raw: BTreeMap<String, Value>) -> SchemaSet {
    let mut renames: HashMap<String, String> = HashMap::new();
    for (name, schema) in &raw {
        if let Ok(Some(gvk)) = extract_gvk(schema) {
            renames.insert(name.clone(), short_key(&gvk));
        }
    }

    let mut keyed: BTreeMap<String, Value> = BTreeMap::new();
    for (name, mut schema) in raw {
        rewrite_refs(&mut schema, &renames);
        let key = renames.get(&name).cloned().unwrap_or(name);
        keyed.insert(key, schema);
    }
    SchemaSet::new(keyed)
}

/// Walks a schema tree, replacing every `$ref` with its short form.
///
/// The referenced name is the token after the last `/`; names of schemas
/// that carry a GVK map to their short key, all others keep the upstream
/// name under the `#/definitions/` prefix.
fn rewrite_refs(value: &mut Value, renames: &HashMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if key == "$ref" {
                    if let Some(reference) = child.as_str() {
                        let name = reference.rsplit('/').next().unwrap_or(reference);
                        let short = renames.get(name).map(String::as_str).unwrap_or(name);
                        *child = Value::String(format!("#/definitions/{short}"));
                    }
                } else {
                    rewrite_refs(child, renames);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                rewrite_refs(item, renames);
            }
        }
        _ => {}
    }
}
