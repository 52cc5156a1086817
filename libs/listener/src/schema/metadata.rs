use crate::error::{Error, Result};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Top-level extension carrying the cluster connection metadata
pub const METADATA_EXTENSION: &str = "x-cluster-metadata";

/// How a consumer may authenticate against the cluster a schema describes
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AuthConfig {
    /// Complete kubeconfig, base64-encoded
    Kubeconfig { kubeconfig: String },
    /// Bearer token
    Token { token: String },
    /// Client certificate and key, base64-encoded PEM
    ClientCert { cert: String, key: String },
    /// Service account whose token grants access
    ServiceAccount { namespace: String, name: String },
    /// Unauthenticated, TLS verification disabled
    Insecure,
}

/// Connection metadata stamped onto a serialized schema document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMetadata {
    pub host: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    /// CA bundle, base64-encoded PEM
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_data: Option<String>,
}

impl ClusterMetadata {
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
            auth: None,
            ca_data: None,
        }
    }
}

/// Inserts the metadata under the top-level `x-cluster-metadata` key.
///
/// The document is parsed as a generic JSON tree; all other keys are
/// preserved. Without metadata the bytes pass through unchanged.
pub fn inject(bytes: &Bytes, metadata: Option<&ClusterMetadata>) -> Result<Bytes> {
    let Some(metadata) = metadata else {
        return Ok(bytes.clone());
    };
    let mut document: serde_json::Value =
        serde_json::from_slice(bytes).map_err(Error::SerializationError)?;
    let object = document
        .as_object_mut()
        .ok_or(Error::InvalidSchemaDocument)?;
    object.insert(
        METADATA_EXTENSION.to_string(),
        serde_json::to_value(metadata).map_err(Error::SerializationError)?,
    );
    serde_json::to_vec(&document)
        .map(Bytes::from)
        .map_err(Error::SerializationError)
}

#[cfg(test)]
mod test {
    use super::*;

    use serde_json::{json, Value};

    #[test]
    fn test_inject_adds_top_level_extension() {
        let bytes = Bytes::from(
            serde_json::to_vec(&json!({"openapi": "3.0.0", "components": {"schemas": {}}}))
                .unwrap(),
        );
        let metadata = ClusterMetadata {
            host: "https://kcp.example.com".to_string(),
            path: "root:orgs:acme".to_string(),
            auth: Some(AuthConfig::Token {
                token: "abc".to_string(),
            }),
            ca_data: None,
        };

        let out = inject(&bytes, Some(&metadata)).unwrap();
        let doc: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(doc[METADATA_EXTENSION]["host"], "https://kcp.example.com");
        assert_eq!(doc[METADATA_EXTENSION]["path"], "root:orgs:acme");
        assert_eq!(doc[METADATA_EXTENSION]["auth"]["type"], "token");
        // other keys are preserved
        assert_eq!(doc["openapi"], "3.0.0");
    }

    #[test]
    fn test_no_metadata_passes_bytes_through() {
        let bytes = Bytes::from_static(b"{\"openapi\":\"3.0.0\"}");
        assert_eq!(inject(&bytes, None).unwrap(), bytes);
    }

    #[test]
    fn test_non_object_document_is_rejected() {
        let bytes = Bytes::from_static(b"[]");
        let metadata = ClusterMetadata::new("https://h", "p");
        assert!(matches!(
            inject(&bytes, Some(&metadata)),
            Err(Error::InvalidSchemaDocument)
        ));
    }
}
