use crate::metrics::MetricsLayer;

use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use kube::client::ConfigExt;
use kube::{Client, Config, Result};
use prometheus_client::registry::Registry;
use tower::ServiceBuilder;

/// Client for the control plane the listener itself runs against, with every
/// request instrumented through [`MetricsLayer`].
///
/// Per-cluster discovery clients are built plainly from rewritten configs
/// instead, so nothing in their transport is shared across clusters.
pub async fn instrumented_client(config: Config, registry: &mut Registry) -> Result<Client> {
    let https = config.rustls_https_connector()?;
    let service = ServiceBuilder::new()
        .layer(MetricsLayer::new(registry))
        .layer(config.base_uri_layer())
        .option_layer(config.auth_layer()?)
        .service(HyperClient::builder(TokioExecutor::new()).build(https));

    Ok(Client::new(service, config.default_namespace))
}
