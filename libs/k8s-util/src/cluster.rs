use http::Uri;
use kube::Config;

/// Rewrites the URL of a rest config to address a single logical cluster.
///
/// Given a base of `https://host[:port]/some/path`, the result points at
/// `https://host[:port]/clusters/<name>`: scheme, host and port are
/// preserved, any previous path is replaced. The returned config is a copy;
/// the base config is never mutated, so callers can derive one config per
/// cluster from a shared base.
pub fn config_for_cluster(base: &Config, name: &str) -> Result<Config, http::Error> {
    let mut config = base.clone();
    config.cluster_url = cluster_url(&base.cluster_url, name)?;
    Ok(config)
}

/// Replaces the path of `base` with `/clusters/<name>`.
pub fn cluster_url(base: &Uri, name: &str) -> Result<Uri, http::Error> {
    let mut builder = Uri::builder();
    if let Some(scheme) = base.scheme() {
        builder = builder.scheme(scheme.clone());
    }
    if let Some(authority) = base.authority() {
        builder = builder.authority(authority.clone());
    }
    builder
        .path_and_query(format!(
            "/clusters/{}",
            url_escape::encode_path(name).as_ref()
        ))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replaces_existing_path() {
        let base: Uri = "https://example.com:6443/services/apiexport/root/tenancy"
            .parse()
            .unwrap();
        let result = cluster_url(&base, "root").unwrap();
        assert_eq!(result.to_string(), "https://example.com:6443/clusters/root");
    }

    #[test]
    fn test_preserves_scheme_and_port() {
        let base: Uri = "http://localhost:8080".parse().unwrap();
        let result = cluster_url(&base, "2pkvbm0wulqmaewl").unwrap();
        assert_eq!(
            result.to_string(),
            "http://localhost:8080/clusters/2pkvbm0wulqmaewl"
        );
    }

    #[test]
    fn test_hierarchical_cluster_path() {
        let base: Uri = "https://kcp.example.com".parse().unwrap();
        let result = cluster_url(&base, "root:orgs:acme").unwrap();
        assert_eq!(
            result.to_string(),
            "https://kcp.example.com/clusters/root:orgs:acme"
        );
    }
}
