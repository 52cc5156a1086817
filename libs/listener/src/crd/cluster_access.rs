use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Registers an externally reachable cluster whose API surface should be
/// schematized. The spec carries the endpoint plus optional credentials; all
/// credential material is referenced, never inlined.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "gateway.platform-mesh.io",
    version = "v1alpha1",
    kind = "ClusterAccess"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAccessSpec {
    /// API server URL of the target cluster
    pub host: String,

    /// Overrides the derived schema key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<CaSpec>,
}

/// At most one variant is honored, checked in declaration order
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthSpec {
    /// Secret holding a complete kubeconfig (key `kubeconfig`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig_secret_ref: Option<SecretRef>,

    /// Secret holding a client certificate and key (keys `tls.crt`/`tls.key`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate_ref: Option<SecretRef>,

    /// Secret holding a bearer token (key `token`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretRef>,

    /// Service account a short-lived token is requested for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<ServiceAccountRef>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountRef {
    pub namespace: String,
    pub name: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CaSpec {
    /// Secret holding the CA bundle (key `ca.crt`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretRef>,

    /// ConfigMap holding the CA bundle (key `ca.crt`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_ref: Option<ConfigMapRef>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Overrides the conventional data key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_spec_deserializes_from_manifest_shape() {
        let spec: ClusterAccessSpec = serde_json::from_value(serde_json::json!({
            "host": "https://cluster.example.com:6443",
            "path": "acme",
            "auth": {"secretRef": {"name": "token", "namespace": "default"}},
            "ca": {"secretRef": {"name": "ca", "key": "ca.crt"}},
        }))
        .unwrap();

        assert_eq!(spec.host, "https://cluster.example.com:6443");
        assert_eq!(spec.path.as_deref(), Some("acme"));
        assert_eq!(spec.auth.unwrap().secret_ref.unwrap().name, "token");
    }
}
