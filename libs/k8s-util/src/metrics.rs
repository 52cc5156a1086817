use crate::url::template_path;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use http::Request;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::{counter::Counter, family::Family, histogram::Histogram};
use prometheus_client::registry::{Registry, Unit};
use tokio::time::Instant;
use tower::{Layer, Service};

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug, Default)]
pub struct RequestLabels {
    pub method: String,
    pub endpoint: String,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug, Default)]
pub struct ResponseLabels {
    pub method: String,
    pub status_code: String,
}

/// Tower layer instrumenting every control-plane request the listener makes.
///
/// Latency is labeled by method and templated endpoint (see
/// [`template_path`]) so per-cluster and per-object paths do not explode
/// label cardinality; responses are counted by status code, and requests
/// that die before a response arrives are counted separately.
pub struct MetricsLayer {
    request_duration: Family<RequestLabels, Histogram>,
    responses: Family<ResponseLabels, Counter>,
    transport_errors: Counter,
}

impl MetricsLayer {
    pub fn new(registry: &mut Registry) -> Self {
        let request_duration = Family::<RequestLabels, Histogram>::new_with_constructor(|| {
            Histogram::new([0.005, 0.025, 0.1, 0.25, 1., 2.5, 10.].into_iter())
        });
        let responses = Family::<ResponseLabels, Counter>::default();
        let transport_errors = Counter::default();

        registry.register_with_unit(
            "cluster_http_request_duration",
            "Latency of control-plane requests by method and templated endpoint.",
            Unit::Seconds,
            request_duration.clone(),
        );
        registry.register(
            "cluster_http_responses",
            "Control-plane responses by status code.",
            responses.clone(),
        );
        registry.register(
            "cluster_http_transport_errors",
            "Control-plane requests that failed without a response.",
            transport_errors.clone(),
        );

        Self {
            request_duration,
            responses,
            transport_errors,
        }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            request_duration: self.request_duration.clone(),
            responses: self.responses.clone(),
            transport_errors: self.transport_errors.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
    request_duration: Family<RequestLabels, Histogram>,
    responses: Family<ResponseLabels, Counter>,
    transport_errors: Counter,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for MetricsService<S>
where
    S: Service<Request<ReqBody>, Response = http::Response<ResBody>>,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let method = req.method().as_str().to_owned();
        let labels = RequestLabels {
            method: method.clone(),
            endpoint: template_path(req.uri().path()),
        };
        let started = Instant::now();

        let request_duration = self.request_duration.clone();
        let responses = self.responses.clone();
        let transport_errors = self.transport_errors.clone();
        let call = self.inner.call(req);
        Box::pin(async move {
            let result = call.await;
            request_duration
                .get_or_create(&labels)
                .observe(started.elapsed().as_secs_f64());
            match &result {
                Ok(response) => {
                    responses
                        .get_or_create(&ResponseLabels {
                            method,
                            status_code: response.status().as_u16().to_string(),
                        })
                        .inc();
                }
                Err(_) => {
                    transport_errors.inc();
                }
            }
            result
        })
    }
}
