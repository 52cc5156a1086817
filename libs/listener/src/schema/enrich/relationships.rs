use super::{Enricher, PreferredVersionMap};
use crate::error::Result;
use crate::schema::set::{SchemaEntry, SchemaSet};

use std::collections::{HashMap, HashSet};

use serde_json::{json, Value};
use tracing::warn;

/// Injects navigable relationship properties next to `*Ref` fields.
///
/// For a property like `roleRef` the enricher finds the schema whose kind is
/// `Role` and adds a sibling property `role` whose value is a `$ref` to that
/// schema, so consumers can traverse references statically. The original
/// `*Ref` field is left untouched.
///
/// Expansion is a single hop: any schema that is itself the target of a
/// `*Ref` field anywhere in the set gains no properties, which breaks
/// reference cycles without tracking visitation state.
pub struct RelationshipsEnricher {
    preferred: PreferredVersionMap,
}

impl RelationshipsEnricher {
    pub fn new(preferred: PreferredVersionMap) -> Self {
        Self { preferred }
    }
}

impl Enricher for RelationshipsEnricher {
    fn name(&self) -> &'static str {
        "relationships"
    }

    fn enrich(&self, schemas: &mut SchemaSet) -> Result<()> {
        let preferred = self.preferred.read().clone();

        let mut targets: HashSet<String> = HashSet::new();
        for entry in schemas.iter() {
            for field in ref_fields(&entry.schema) {
                let Some(kind) = field.strip_suffix("Ref") else { continue };
                for candidate in schemas.find_by_kind(kind) {
                    targets.insert(candidate.key().to_string());
                }
            }
        }

        let mut additions: Vec<(String, String, Value)> = Vec::new();
        for entry in schemas.iter() {
            if targets.contains(entry.key()) {
                continue;
            }
            for field in ref_fields(&entry.schema) {
                let Some(kind) = field.strip_suffix("Ref") else { continue };
                let candidates: Vec<&SchemaEntry> = schemas
                    .find_by_kind(kind)
                    .into_iter()
                    .filter(|c| c.gvk().is_some())
                    .collect();
                if candidates.is_empty() {
                    continue;
                }
                let selected = select(&candidates, &preferred);
                if candidates.len() > 1 {
                    let names: Vec<&str> = candidates.iter().map(|c| c.key()).collect();
                    warn!(
                        schema = entry.key(),
                        %field,
                        candidates = ?names,
                        selected = selected.key(),
                        "several schemas match relationship field, picking by priority"
                    );
                }
                // safe unwrap: candidates without a GVK were filtered above
                let gvk = selected.gvk().unwrap();
                let property = gvk.kind.to_lowercase();
                let exists = entry
                    .schema
                    .get("properties")
                    .and_then(Value::as_object)
                    .map(|props| props.contains_key(&property))
                    .unwrap_or(false);
                if exists {
                    continue;
                }
                let reference = if gvk.group.is_empty() {
                    format!("{}.{}", gvk.version, gvk.kind)
                } else {
                    format!("{}.{}.{}", gvk.group, gvk.version, gvk.kind)
                };
                additions.push((
                    entry.key().to_string(),
                    property,
                    json!({"$ref": format!("#/definitions/{reference}")}),
                ));
            }
        }

        for (key, property, value) in additions {
            if let Some(schema) = schemas.schema_mut(&key) {
                if let Some(props) = schema.get_mut("properties").and_then(Value::as_object_mut) {
                    props.insert(property, value);
                }
            }
        }
        Ok(())
    }
}

/// Top-level property names ending in `Ref`, the relationship markers
fn ref_fields(schema: &Value) -> Vec<String> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .keys()
                .filter(|name| name.len() > "Ref".len() && name.ends_with("Ref"))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

/// kubectl-style priority: preferred version first, then the core group,
/// then group and version in lexicographic order. The lexicographic tail is
/// deterministic but arbitrary; consumers must not depend on which
/// non-preferred group wins a tie.
fn select<'a>(
    candidates: &[&'a SchemaEntry],
    preferred: &HashMap<(String, String), String>,
) -> &'a SchemaEntry {
    candidates
        .iter()
        .min_by_key(|entry| {
            // safe unwrap: callers filter out entries without a GVK
            let gvk = entry.gvk().unwrap();
            let is_preferred =
                preferred.get(&(gvk.group.clone(), gvk.kind.clone())) == Some(&gvk.version);
            (
                !is_preferred,
                !gvk.group.is_empty(),
                gvk.group.clone(),
                gvk.version.clone(),
            )
        })
        // safe unwrap: callers never pass an empty candidate list
        .unwrap()
}
