use crate::error::{Error, Result};

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use kube::core::GroupVersionKind;
use serde_json::{json, Value};
use tracing::warn;

/// Extension carrying the GVKs a schema describes, preserved from the server
pub const GVK_EXTENSION: &str = "x-kubernetes-group-version-kind";

/// One OpenAPI schema, keyed for lookup.
///
/// `gvk` is `None` for sub-resource schemas that carry no
/// `x-kubernetes-group-version-kind` extension. The key and GVK are fixed at
/// construction; enrichers only mutate the inner `schema` document.
#[derive(Clone, Debug, PartialEq)]
pub struct SchemaEntry {
    key: String,
    gvk: Option<GroupVersionKind>,
    pub schema: Value,
}

impl SchemaEntry {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn gvk(&self) -> Option<&GroupVersionKind> {
        self.gvk.as_ref()
    }
}

/// Indexed collection of OpenAPI schemas: by key, by GVK, and by lowercased
/// kind (multiple groups may provide the same kind).
#[derive(Default, Debug)]
pub struct SchemaSet {
    entries: BTreeMap<String, SchemaEntry>,
    by_gvk: HashMap<GroupVersionKind, String>,
    by_kind: HashMap<String, Vec<String>>,
}

impl SchemaSet {
    /// Builds the set from a raw key → schema mapping, extracting GVKs from
    /// the `x-kubernetes-group-version-kind` extension. Schemas without the
    /// extension, or with zero or several GVK entries, are indexed by key
    /// only.
    pub fn new(raw: BTreeMap<String, Value>) -> Self {
        let mut set = SchemaSet::default();
        for (key, schema) in raw {
            let gvk = match extract_gvk(&schema) {
                Ok(gvk) => gvk,
                Err(e) => {
                    warn!(%key, %e, "malformed group-version-kind extension");
                    None
                }
            };
            set.insert(SchemaEntry { key, gvk, schema });
        }
        set
    }

    fn insert(&mut self, entry: SchemaEntry) {
        if let Some(previous) = self.entries.get(entry.key()) {
            // last write wins; drop the stale secondary index entries first
            if let Some(gvk) = previous.gvk() {
                self.by_gvk.remove(gvk);
                if let Some(keys) = self.by_kind.get_mut(&gvk.kind.to_lowercase()) {
                    keys.retain(|k| k != previous.key());
                }
            }
        }
        if let Some(gvk) = entry.gvk() {
            self.by_gvk.insert(gvk.clone(), entry.key.clone());
            self.by_kind
                .entry(gvk.kind.to_lowercase())
                .or_default()
                .push(entry.key.clone());
        }
        self.entries.insert(entry.key.clone(), entry);
    }

    pub fn get(&self, key: &str) -> Option<&SchemaEntry> {
        self.entries.get(key)
    }

    pub fn get_by_gvk(&self, gvk: &GroupVersionKind) -> Option<&SchemaEntry> {
        self.by_gvk.get(gvk).and_then(|key| self.entries.get(key))
    }

    /// All entries whose kind matches `kind`, case-insensitively
    pub fn find_by_kind(&self, kind: &str) -> Vec<&SchemaEntry> {
        self.by_kind
            .get(&kind.to_lowercase())
            .map(|keys| keys.iter().filter_map(|k| self.entries.get(k)).collect())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SchemaEntry> {
        self.entries.values()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn schema_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries.get_mut(key).map(|e| &mut e.schema)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes the set as an OpenAPI v3 document.
    ///
    /// The primary index is a sorted map, so output bytes are deterministic
    /// for a given set; the reconciler relies on this for byte-level diffing.
    pub fn marshal(&self) -> Result<Bytes> {
        let schemas: BTreeMap<&str, &Value> = self
            .entries
            .values()
            .map(|e| (e.key(), &e.schema))
            .collect();
        let doc = json!({
            "openapi": "3.0.0",
            "info": {
                "title": "Kubernetes",
                "version": "unversioned",
            },
            "paths": {},
            "components": {
                "schemas": schemas,
            },
        });
        serde_json::to_vec(&doc)
            .map(Bytes::from)
            .map_err(Error::SerializationError)
    }
}

/// Short schema key for a GVK: the group components reversed, then version,
/// then kind. The empty (core) group yields `<version>.<kind>`. This matches
/// the reverse-domain naming the server itself uses for custom resources.
pub fn short_key(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        return format!("{}.{}", gvk.version, gvk.kind);
    }
    let mut components: Vec<&str> = gvk.group.split('.').collect();
    components.reverse();
    format!("{}.{}.{}", components.join("."), gvk.version, gvk.kind)
}

/// Reads the GVK extension off a schema.
///
/// The extension value must be an array; exactly one element yields a GVK,
/// zero or several yield `None`. Any other surface shape is an error so the
/// caller can log what the server actually sent.
pub fn extract_gvk(schema: &Value) -> Result<Option<GroupVersionKind>> {
    let Some(extension) = schema.get(GVK_EXTENSION) else {
        return Ok(None);
    };
    let entries = extension
        .as_array()
        .ok_or(Error::InvalidSchemaDocument)?;
    if entries.len() != 1 {
        return Ok(None);
    }
    let entry = entries[0].as_object().ok_or(Error::InvalidSchemaDocument)?;
    let field = |name: &str| -> Result<&str> {
        entry
            .get(name)
            .and_then(Value::as_str)
            .ok_or(Error::InvalidSchemaDocument)
    };
    Ok(Some(GroupVersionKind::gvk(
        field("group")?,
        field("version")?,
        field("kind")?,
    )))
}

#[cfg(test)]
mod test {
    use super::*;

    fn raw(entries: &[(&str, Value)]) -> BTreeMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn schema_with_gvk(group: &str, version: &str, kind: &str) -> Value {
        json!({
            "type": "object",
            GVK_EXTENSION: [{"group": group, "version": version, "kind": kind}],
        })
    }

    #[test]
    fn test_short_key_reverses_group_components() {
        let gvk = GroupVersionKind::gvk("", "v1", "Pod");
        assert_eq!(short_key(&gvk), "v1.Pod");

        let gvk = GroupVersionKind::gvk("apps", "v1", "Deployment");
        assert_eq!(short_key(&gvk), "apps.v1.Deployment");

        let gvk = GroupVersionKind::gvk("gateway.platform-mesh.io", "v1alpha1", "ClusterAccess");
        assert_eq!(
            short_key(&gvk),
            "io.platform-mesh.gateway.v1alpha1.ClusterAccess"
        );
    }

    #[test]
    fn test_indexes_cover_entries_with_gvk() {
        let set = SchemaSet::new(raw(&[
            ("v1.Pod", schema_with_gvk("", "v1", "Pod")),
            ("apps.v1.Deployment", schema_with_gvk("apps", "v1", "Deployment")),
            ("v1.ObjectMeta", json!({"type": "object"})),
        ]));

        assert_eq!(set.len(), 3);
        assert_eq!(
            set.get_by_gvk(&GroupVersionKind::gvk("", "v1", "Pod"))
                .unwrap()
                .key(),
            "v1.Pod"
        );
        assert!(set.get("v1.ObjectMeta").unwrap().gvk().is_none());
        assert!(set
            .get_by_gvk(&GroupVersionKind::gvk("", "v1", "ObjectMeta"))
            .is_none());
    }

    #[test]
    fn test_find_by_kind_is_case_insensitive_and_multi_group() {
        let set = SchemaSet::new(raw(&[
            (
                "com.example.aws.v1.Storage",
                schema_with_gvk("aws.example.com", "v1", "Storage"),
            ),
            (
                "com.example.gcp.v1.Storage",
                schema_with_gvk("gcp.example.com", "v1", "Storage"),
            ),
        ]));

        let found = set.find_by_kind("sToRaGe");
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_gvk_extraction_shapes() {
        // no extension
        assert_eq!(extract_gvk(&json!({"type": "object"})).unwrap(), None);
        // several entries
        let several = json!({GVK_EXTENSION: [
            {"group": "", "version": "v1", "kind": "Pod"},
            {"group": "", "version": "v1", "kind": "PodList"},
        ]});
        assert_eq!(extract_gvk(&several).unwrap(), None);
        // not an array
        let invalid = json!({GVK_EXTENSION: "v1.Pod"});
        assert!(extract_gvk(&invalid).is_err());
        // element not an object
        let invalid = json!({GVK_EXTENSION: ["v1.Pod"]});
        assert!(extract_gvk(&invalid).is_err());
    }

    #[test]
    fn test_marshal_round_trip() {
        let set = SchemaSet::new(raw(&[
            ("v1.Pod", schema_with_gvk("", "v1", "Pod")),
            ("apps.v1.Deployment", schema_with_gvk("apps", "v1", "Deployment")),
        ]));
        let bytes = set.marshal().unwrap();
        let doc: Value = serde_json::from_slice(&bytes).unwrap();

        let schemas = doc["components"]["schemas"].as_object().unwrap();
        assert_eq!(schemas.len(), 2);
        let reparsed = SchemaSet::new(
            schemas
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
        assert_eq!(
            reparsed
                .get_by_gvk(&GroupVersionKind::gvk("apps", "v1", "Deployment"))
                .unwrap()
                .key(),
            "apps.v1.Deployment"
        );
        // deterministic output
        assert_eq!(bytes, set.marshal().unwrap());
    }
}
