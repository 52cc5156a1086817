use crate::error::Error;

use opentelemetry::trace::TraceId;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::{
    counter::Counter, exemplar::HistogramWithExemplars, family::Family, gauge::Gauge,
};
use prometheus_client::registry::{Registry, Unit};
use tokio::time::Instant;

/// Identifier of one controller loop; used as a metric label
pub type ControllerId = &'static str;

/// Watched-event kind observed by a trigger controller
#[derive(Clone, Copy, Debug)]
pub enum Action {
    Apply,
    Delete,
}

impl Action {
    fn as_str(&self) -> &'static str {
        match self {
            Action::Apply => "apply",
            Action::Delete => "delete",
        }
    }
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug, Default)]
pub struct TraceLabel {
    pub id: String,
}

impl TryFrom<&TraceId> for TraceLabel {
    type Error = Error;

    fn try_from(id: &TraceId) -> Result<TraceLabel, Self::Error> {
        if std::matches!(id, &TraceId::INVALID) {
            Err(Error::InvalidTraceId)
        } else {
            let trace_id = id.to_string();
            Ok(Self { id: trace_id })
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ControllerLabels {
    pub controller: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub controller: String,
    pub error: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TriggerLabels {
    pub controller: String,
    pub action: String,
    pub kind: String,
}

/// Metric families shared by all controllers, labeled per controller
#[derive(Clone)]
pub struct Metrics {
    runs: Family<ControllerLabels, Counter>,
    failures: Family<ErrorLabels, Counter>,
    duration: Family<ControllerLabels, HistogramWithExemplars<TraceLabel>>,
    triggered: Family<TriggerLabels, Counter>,
    watch_failures: Family<ControllerLabels, Counter>,
    ready: Family<ControllerLabels, Gauge>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            runs: Family::default(),
            failures: Family::default(),
            duration: Family::new_with_constructor(|| {
                HistogramWithExemplars::new([0.1, 0.5, 1., 5., 10.].into_iter())
            }),
            triggered: Family::default(),
            watch_failures: Family::default(),
            ready: Family::default(),
        }
    }
}

impl Metrics {
    /// Register API metrics to start tracking them.
    pub fn register(self, r: &mut Registry) -> Self {
        r.register_with_unit(
            "reconcile_duration",
            "reconcile duration",
            Unit::Seconds,
            self.duration.clone(),
        );
        r.register(
            "reconcile_failures",
            "reconciliation errors",
            self.failures.clone(),
        );
        r.register("reconcile_runs", "reconciliations", self.runs.clone());
        r.register(
            "triggered",
            "watched events that triggered the controller",
            self.triggered.clone(),
        );
        r.register(
            "watch_operations_failed",
            "watch operation failures",
            self.watch_failures.clone(),
        );
        r.register("ready", "controller readiness", self.ready.clone());
        self
    }

    /// Per-controller view with the controller label pre-bound
    pub fn for_controller(&self, controller: ControllerId) -> ControllerMetrics {
        ControllerMetrics {
            controller: controller.to_string(),
            metrics: self.clone(),
        }
    }
}

/// Handle on the shared metric families for a single controller
#[derive(Clone)]
pub struct ControllerMetrics {
    controller: String,
    metrics: Metrics,
}

impl ControllerMetrics {
    fn labels(&self) -> ControllerLabels {
        ControllerLabels {
            controller: self.controller.clone(),
        }
    }

    pub fn reconcile_count_and_measure(&self, trace_id: &TraceId) -> ReconcileMeasurer {
        self.metrics.runs.get_or_create(&self.labels()).inc();
        ReconcileMeasurer {
            start: Instant::now(),
            labels: trace_id.try_into().ok(),
            metric: self.metrics.duration.get_or_create(&self.labels()).clone(),
        }
    }

    pub fn reconcile_failure_set(&self, e: &Error) {
        self.metrics
            .failures
            .get_or_create(&ErrorLabels {
                controller: self.controller.clone(),
                error: e.metric_label(),
            })
            .inc();
    }

    pub fn triggered_inc(&self, action: Action, kind: &str) {
        self.metrics
            .triggered
            .get_or_create(&TriggerLabels {
                controller: self.controller.clone(),
                action: action.as_str().to_string(),
                kind: kind.to_string(),
            })
            .inc();
    }

    pub fn watch_operations_failed_inc(&self) {
        self.metrics.watch_failures.get_or_create(&self.labels()).inc();
    }

    pub fn ready_set(&self, ready: i64) {
        self.metrics.ready.get_or_create(&self.labels()).set(ready);
    }
}

/// Smart function duration measurer
///
/// Relies on Drop to calculate duration and register the observation in the histogram
pub struct ReconcileMeasurer {
    start: Instant,
    labels: Option<TraceLabel>,
    metric: HistogramWithExemplars<TraceLabel>,
}

impl Drop for ReconcileMeasurer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        let labels = self.labels.take();
        self.metric.observe(duration, labels);
    }
}

/// Registry wrapper returned by [`Metrics::register`] consumers
pub fn encode(registry: &Registry) -> Result<String, std::fmt::Error> {
    let mut buffer = String::new();
    prometheus_client::encoding::text::encode(&mut buffer, registry)?;
    Ok(buffer)
}
