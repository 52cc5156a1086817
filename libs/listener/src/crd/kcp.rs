use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Annotation carrying the human-readable workspace path of a logical cluster
pub const PATH_ANNOTATION: &str = "kcp.io/path";

/// Annotation carrying the logical cluster an object was observed in
pub const CLUSTER_ANNOTATION: &str = "kcp.io/cluster";

/// Workspaces whose path or cluster name starts with this prefix are never
/// schematized
pub const SYSTEM_WORKSPACE_PREFIX: &str = "system";

/// The per-workspace singleton (always named `cluster`) describing a logical
/// cluster's lifecycle; initializers gate the workspace until every
/// controller has marked its work done.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "core.kcp.io",
    version = "v1alpha1",
    kind = "LogicalCluster",
    status = "LogicalClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct LogicalClusterSpec {
    #[serde(default)]
    pub directly_deletable: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub initializers: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogicalClusterStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initializers: Option<Vec<String>>,
}

impl LogicalCluster {
    /// Whether this workspace still carries the named initializer
    pub fn has_initializer(&self, name: &str) -> bool {
        self.spec.initializers.iter().any(|i| i == name)
    }
}

/// A workspace's binding to an exported API; its annotations carry the
/// authoritative workspace path used as the schema key.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(group = "apis.kcp.io", version = "v1alpha1", kind = "APIBinding")]
#[serde(rename_all = "camelCase")]
pub struct APIBindingSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<BindingReference>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BindingReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<ExportBindingReference>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExportBindingReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub name: String,
}
