use crate::crd::cluster_access::{ClusterAccess, ConfigMapRef, SecretRef, ServiceAccountRef};
use crate::error::{Error, Result};
use crate::schema::metadata::{AuthConfig, ClusterMetadata};

use base64::prelude::*;
use k8s_openapi::api::authentication::v1::{TokenRequest, TokenRequestSpec};
use k8s_openapi::api::core::v1::{ConfigMap, Secret, ServiceAccount};
use kube::api::{Api, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde_json::json;

const DEFAULT_NAMESPACE: &str = "default";
const KUBECONFIG_KEY: &str = "kubeconfig";
const TOKEN_KEY: &str = "token";
const CERT_KEY: &str = "tls.crt";
const PRIVATE_KEY_KEY: &str = "tls.key";
const CA_KEY: &str = "ca.crt";

const TOKEN_EXPIRATION_SECONDS: i64 = 3600;

/// Resolves the referenced credentials of a `ClusterAccess` into a rest
/// config for the target cluster plus the connection metadata stamped onto
/// the generated schema. Referenced secrets live on the cluster this
/// listener runs against, never on the target.
pub async fn build(
    client: &Client,
    access: &ClusterAccess,
    key: &str,
) -> Result<(Config, ClusterMetadata)> {
    let host = access.spec.host.clone();
    let ca_data = resolve_ca(client, access).await?;
    let ca_b64 = ca_data.map(|bytes| BASE64_STANDARD.encode(bytes));

    let mut metadata = ClusterMetadata {
        host: host.clone(),
        path: key.to_string(),
        auth: None,
        ca_data: ca_b64.clone(),
    };

    let auth = access.spec.auth.as_ref();

    if let Some(reference) = auth.and_then(|a| a.kubeconfig_secret_ref.as_ref()) {
        let secret = get_secret(client, reference).await?;
        let bytes = secret_key(&secret, reference, reference.key.as_deref().unwrap_or(KUBECONFIG_KEY))?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|e| Error::InvalidClusterAuth(format!("kubeconfig is not UTF-8: {e}")))?;
        let kubeconfig = Kubeconfig::from_yaml(text).map_err(Error::KubeconfigError)?;
        let mut config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(Error::KubeconfigError)?;
        config.cluster_url = parse_host(&host)?;
        metadata.auth = Some(AuthConfig::Kubeconfig {
            kubeconfig: BASE64_STANDARD.encode(&bytes),
        });
        return Ok((config, metadata));
    }

    if let Some(reference) = auth.and_then(|a| a.client_certificate_ref.as_ref()) {
        let secret = get_secret(client, reference).await?;
        let cert = secret_key(&secret, reference, reference.key.as_deref().unwrap_or(CERT_KEY))?;
        let private_key = secret_key(&secret, reference, PRIVATE_KEY_KEY)?;
        let cert_b64 = BASE64_STANDARD.encode(&cert);
        let key_b64 = BASE64_STANDARD.encode(&private_key);
        let config = config_from_parts(
            &host,
            ca_b64.as_deref(),
            json!({"client-certificate-data": cert_b64, "client-key-data": key_b64}),
        )
        .await?;
        metadata.auth = Some(AuthConfig::ClientCert {
            cert: cert_b64,
            key: key_b64,
        });
        return Ok((config, metadata));
    }

    if let Some(reference) = auth.and_then(|a| a.secret_ref.as_ref()) {
        let secret = get_secret(client, reference).await?;
        let bytes = secret_key(&secret, reference, reference.key.as_deref().unwrap_or(TOKEN_KEY))?;
        let token = String::from_utf8(bytes)
            .map_err(|e| Error::InvalidClusterAuth(format!("token is not UTF-8: {e}")))?;
        let config =
            config_from_parts(&host, ca_b64.as_deref(), json!({"token": token})).await?;
        metadata.auth = Some(AuthConfig::Token { token });
        return Ok((config, metadata));
    }

    if let Some(reference) = auth.and_then(|a| a.service_account.as_ref()) {
        let token = request_token(client, reference).await?;
        let config =
            config_from_parts(&host, ca_b64.as_deref(), json!({"token": token})).await?;
        metadata.auth = Some(AuthConfig::ServiceAccount {
            namespace: reference.namespace.clone(),
            name: reference.name.clone(),
        });
        return Ok((config, metadata));
    }

    // no credentials configured; anonymous access, insecure without a CA
    let config = config_from_parts(&host, ca_b64.as_deref(), json!({})).await?;
    Ok((config, metadata))
}

fn parse_host(host: &str) -> Result<http::Uri> {
    host.parse()
        .map_err(|e| Error::UserInputError(format!("invalid host {host:?}: {e}")))
}

/// Builds a rest config from a synthesized single-context kubeconfig, the
/// same path `kube` itself takes for file-based configs.
async fn config_from_parts(
    host: &str,
    ca_b64: Option<&str>,
    user: serde_json::Value,
) -> Result<Config> {
    parse_host(host)?;
    let mut cluster = json!({"server": host});
    match ca_b64 {
        Some(ca) => cluster["certificate-authority-data"] = json!(ca),
        None => cluster["insecure-skip-tls-verify"] = json!(true),
    }
    let kubeconfig: Kubeconfig = serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{"name": "target", "cluster": cluster}],
        "users": [{"name": "target", "user": user}],
        "contexts": [{"name": "target", "context": {"cluster": "target", "user": "target"}}],
        "current-context": "target",
    }))
    .map_err(Error::SerializationError)?;
    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(Error::KubeconfigError)
}

async fn resolve_ca(client: &Client, access: &ClusterAccess) -> Result<Option<Vec<u8>>> {
    let Some(ca) = access.spec.ca.as_ref() else {
        return Ok(None);
    };
    if let Some(reference) = ca.secret_ref.as_ref() {
        let secret = get_secret(client, reference).await?;
        return secret_key(&secret, reference, reference.key.as_deref().unwrap_or(CA_KEY))
            .map(Some);
    }
    if let Some(reference) = ca.config_map_ref.as_ref() {
        return config_map_key(client, reference).await.map(Some);
    }
    Ok(None)
}

async fn get_secret(client: &Client, reference: &SecretRef) -> Result<Secret> {
    let namespace = reference.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    api.get(&reference.name).await.map_err(Error::KubeError)
}

fn secret_key(secret: &Secret, reference: &SecretRef, key: &str) -> Result<Vec<u8>> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|bytes| bytes.0.clone())
        .ok_or_else(|| {
            Error::InvalidClusterAuth(format!(
                "secret {:?} has no key {key:?}",
                reference.name
            ))
        })
}

async fn config_map_key(client: &Client, reference: &ConfigMapRef) -> Result<Vec<u8>> {
    let namespace = reference.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    let config_map = api.get(&reference.name).await.map_err(Error::KubeError)?;
    let key = reference.key.as_deref().unwrap_or(CA_KEY);
    config_map
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|text| text.clone().into_bytes())
        .or_else(|| {
            config_map
                .binary_data
                .as_ref()
                .and_then(|data| data.get(key))
                .map(|bytes| bytes.0.clone())
        })
        .ok_or_else(|| {
            Error::InvalidClusterAuth(format!(
                "configmap {:?} has no key {key:?}",
                reference.name
            ))
        })
}

/// Requests a short-lived token for the referenced service account
async fn request_token(client: &Client, reference: &ServiceAccountRef) -> Result<String> {
    let api: Api<ServiceAccount> = Api::namespaced(client.clone(), &reference.namespace);
    let request = TokenRequest {
        spec: TokenRequestSpec {
            expiration_seconds: Some(TOKEN_EXPIRATION_SECONDS),
            ..TokenRequestSpec::default()
        },
        ..TokenRequest::default()
    };
    let response: TokenRequest = api
        .create_subresource(
            "token",
            &reference.name,
            &PostParams::default(),
            serde_json::to_vec(&request).map_err(Error::SerializationError)?,
        )
        .await
        .map_err(Error::KubeError)?;
    response
        .status
        .map(|status| status.token)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            Error::InvalidClusterAuth(format!(
                "token request for {}/{} returned no token",
                reference.namespace, reference.name
            ))
        })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crd::cluster_access::ClusterAccessSpec;

    #[tokio::test]
    async fn test_anonymous_config_is_insecure_without_ca() {
        let access = ClusterAccess::new(
            "target",
            ClusterAccessSpec {
                host: "https://cluster.example.com:6443".to_string(),
                ..ClusterAccessSpec::default()
            },
        );
        let client = crate::clusteraccess::test_support::unreachable_client();

        let (config, metadata) = build(&client, &access, "target").await.unwrap();
        assert_eq!(
            config.cluster_url.to_string(),
            "https://cluster.example.com:6443/"
        );
        assert!(config.accept_invalid_certs);
        assert_eq!(metadata.auth, None);
        assert_eq!(metadata.host, "https://cluster.example.com:6443");
        assert_eq!(metadata.path, "target");
    }

    #[tokio::test]
    async fn test_invalid_host_is_a_configuration_error() {
        let access = ClusterAccess::new(
            "target",
            ClusterAccessSpec {
                host: "not a url".to_string(),
                ..ClusterAccessSpec::default()
            },
        );
        let client = crate::clusteraccess::test_support::unreachable_client();

        let result = build(&client, &access, "target").await;
        assert!(matches!(result, Err(Error::UserInputError(_))));
    }
}
