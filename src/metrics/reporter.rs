//! Prometheus-backed reporter shared by every scope
//!
//! Scopes ask the reporter for a handle by metric name and tag set. Metrics
//! sharing a name are registered once as a labelled family (the sorted tag
//! names become the label names) and each tag set resolves to one child of
//! that family.

use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
    core::Collector,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::cache::HandleCache;
use super::scope::TagSet;

/// Kind of measurement a family was registered as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Counter,
    Gauge,
    Histogram,
    Timer,
}

impl Kind {
    fn as_str(&self) -> &'static str {
        match self {
            Kind::Counter => "counter",
            Kind::Gauge => "gauge",
            Kind::Histogram => "histogram",
            Kind::Timer => "timer",
        }
    }
}

#[derive(Clone)]
enum FamilyVec {
    Counter(IntCounterVec),
    Gauge(GaugeVec),
    Histogram(HistogramVec),
}

impl FamilyVec {
    fn collector(&self) -> Box<dyn Collector> {
        match self {
            FamilyVec::Counter(vec) => Box::new(vec.clone()),
            FamilyVec::Gauge(vec) => Box::new(vec.clone()),
            FamilyVec::Histogram(vec) => Box::new(vec.clone()),
        }
    }
}

/// A registered metric family
///
/// `vec` is `None` when the registry rejected the family; every handle
/// resolved from it is then a no-op.
#[derive(Clone)]
struct Family {
    kind: Kind,
    label_names: Arc<[String]>,
    vec: Option<FamilyVec>,
}

impl Family {
    fn register(
        registry: &Registry,
        kind: Kind,
        name: &str,
        tags: &TagSet,
        buckets: &[f64],
    ) -> Self {
        let label_names: Vec<&str> = tags.keys().map(String::as_str).collect();
        let help = format!("{} {}", name, kind.as_str());

        let vec = match kind {
            Kind::Counter => {
                IntCounterVec::new(Opts::new(name, help), &label_names).map(FamilyVec::Counter)
            }
            Kind::Gauge => GaugeVec::new(Opts::new(name, help), &label_names).map(FamilyVec::Gauge),
            Kind::Histogram | Kind::Timer => HistogramVec::new(
                HistogramOpts::new(name, help).buckets(buckets.to_vec()),
                &label_names,
            )
            .map(FamilyVec::Histogram),
        }
        .and_then(|vec| registry.register(vec.collector()).map(|()| vec));

        let vec = match vec {
            Ok(vec) => {
                tracing::debug!(
                    metric = name,
                    kind = kind.as_str(),
                    labels = ?label_names,
                    "Registered metric family"
                );
                Some(vec)
            }
            Err(e) => {
                tracing::warn!(
                    metric = name,
                    kind = kind.as_str(),
                    labels = ?label_names,
                    error = %e,
                    "Metric registration rejected, recordings for this metric are discarded"
                );
                None
            }
        };

        Self {
            kind,
            label_names: tags.keys().cloned().collect(),
            vec,
        }
    }

    fn labels_match(&self, tags: &TagSet) -> bool {
        self.label_names.len() == tags.len()
            && self.label_names.iter().zip(tags.keys()).all(|(a, b)| a == b)
    }
}

/// Registry wrapper that owns every metric family of the process
///
/// Construct one reporter at startup and share it by `Arc` with every root
/// [`Scope`](super::Scope); tests build their own so they stay isolated.
pub struct Reporter {
    registry: Registry,
    families: HandleCache<String, Family>,
}

impl Reporter {
    /// Create a reporter with a fresh Prometheus registry
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }

    /// Create a reporter that registers into an existing registry
    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry,
            families: HandleCache::new(),
        }
    }

    /// The underlying Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Number of metric families this reporter has attempted to register
    pub fn family_count(&self) -> usize {
        self.families.len()
    }

    fn family(&self, kind: Kind, name: &str, tags: &TagSet, buckets: &[f64]) -> Option<FamilyVec> {
        let family = self.families.get_or_create(name, || {
            Family::register(&self.registry, kind, name, tags, buckets)
        });

        if family.kind != kind {
            tracing::warn!(
                metric = name,
                registered_as = family.kind.as_str(),
                requested_as = kind.as_str(),
                "Metric name already registered as a different kind, discarding recordings"
            );
            return None;
        }

        if !family.labels_match(tags) {
            tracing::warn!(
                metric = name,
                registered_labels = ?family.label_names,
                requested_labels = ?tags.keys().collect::<Vec<_>>(),
                "Metric name already registered with different tags, discarding recordings"
            );
            return None;
        }

        family.vec
    }

    /// Resolve the counter `name` for the given tag set
    pub fn counter(&self, name: &str, tags: &TagSet) -> Counter {
        let values = label_values(tags);
        let counter = match self.family(Kind::Counter, name, tags, &[]) {
            Some(FamilyVec::Counter(vec)) => {
                log_child(name, vec.get_metric_with_label_values(values.as_slice()))
            }
            _ => None,
        };
        Counter(counter)
    }

    /// Resolve the gauge `name` for the given tag set
    pub fn gauge(&self, name: &str, tags: &TagSet) -> Gauge {
        let values = label_values(tags);
        let gauge = match self.family(Kind::Gauge, name, tags, &[]) {
            Some(FamilyVec::Gauge(vec)) => {
                log_child(name, vec.get_metric_with_label_values(values.as_slice()))
            }
            _ => None,
        };
        Gauge(gauge)
    }

    /// Resolve the histogram `name` for the given tag set
    ///
    /// `buckets` only take effect when this call registers the family; an
    /// empty slice selects the Prometheus default buckets.
    pub fn histogram(&self, name: &str, tags: &TagSet, buckets: &[f64]) -> Histogram {
        let buckets: &[f64] = if buckets.is_empty() {
            prometheus::DEFAULT_BUCKETS
        } else {
            buckets
        };
        let values = label_values(tags);
        let histogram = match self.family(Kind::Histogram, name, tags, buckets) {
            Some(FamilyVec::Histogram(vec)) => {
                log_child(name, vec.get_metric_with_label_values(values.as_slice()))
            }
            _ => None,
        };
        Histogram(histogram)
    }

    /// Resolve the timer `name` for the given tag set
    ///
    /// Timers are exported as histograms of elapsed seconds with the
    /// Prometheus default buckets.
    pub fn timer(&self, name: &str, tags: &TagSet) -> Timer {
        let values = label_values(tags);
        let timer = match self.family(Kind::Timer, name, tags, prometheus::DEFAULT_BUCKETS) {
            Some(FamilyVec::Histogram(vec)) => {
                log_child(name, vec.get_metric_with_label_values(values.as_slice()))
            }
            _ => None,
        };
        Timer(timer)
    }

    /// Gather all metrics and encode them in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if metric encoding fails.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let metric_count = metric_families.len();

        tracing::debug!(
            metric_family_count = metric_count,
            "Encoding metrics to Prometheus text format"
        );

        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();

        encoder.encode(&metric_families, &mut buffer).map_err(|e| {
            tracing::error!(
                error = %e,
                metric_family_count = metric_count,
                "Prometheus text encoder failed"
            );
            e
        })?;

        String::from_utf8(buffer).map_err(|e| {
            let valid_up_to = e.utf8_error().valid_up_to();
            tracing::error!(
                invalid_byte_index = valid_up_to,
                "Prometheus encoder produced invalid UTF-8"
            );
            prometheus::Error::Msg(format!(
                "Failed to convert metrics to UTF-8 at byte {}: {}",
                valid_up_to, e
            ))
        })
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

fn label_values(tags: &TagSet) -> Vec<&str> {
    tags.values().map(String::as_str).collect()
}

fn log_child<M>(name: &str, child: Result<M, prometheus::Error>) -> Option<M> {
    child
        .map_err(|e| {
            tracing::warn!(
                metric = name,
                error = %e,
                "Failed to resolve labelled metric, discarding recordings"
            );
        })
        .ok()
}

/// Monotonic counter handle
#[derive(Clone)]
pub struct Counter(Option<prometheus::IntCounter>);

impl Counter {
    /// Increment the counter by `value`
    pub fn inc(&self, value: u64) {
        if let Some(counter) = &self.0 {
            counter.inc_by(value);
        }
    }

    /// Current value (0 for a discarded handle)
    pub fn get(&self) -> u64 {
        self.0.as_ref().map_or(0, |c| c.get())
    }

    /// Whether recordings on this handle reach the registry
    pub fn is_registered(&self) -> bool {
        self.0.is_some()
    }
}

/// Gauge handle
#[derive(Clone)]
pub struct Gauge(Option<prometheus::Gauge>);

impl Gauge {
    /// Overwrite the gauge value
    pub fn update(&self, value: f64) {
        if let Some(gauge) = &self.0 {
            gauge.set(value);
        }
    }

    /// Current value (0 for a discarded handle)
    pub fn get(&self) -> f64 {
        self.0.as_ref().map_or(0.0, |g| g.get())
    }

    pub fn is_registered(&self) -> bool {
        self.0.is_some()
    }
}

/// Histogram handle
#[derive(Clone)]
pub struct Histogram(Option<prometheus::Histogram>);

impl Histogram {
    /// Observe a raw value
    pub fn observe(&self, value: f64) {
        if let Some(histogram) = &self.0 {
            histogram.observe(value);
        }
    }

    /// Observe a duration in seconds
    pub fn observe_duration(&self, duration: Duration) {
        self.observe(duration.as_secs_f64());
    }

    /// Number of observations so far (0 for a discarded handle)
    pub fn sample_count(&self) -> u64 {
        self.0.as_ref().map_or(0, |h| h.get_sample_count())
    }

    /// Sum of all observations so far (0 for a discarded handle)
    pub fn sample_sum(&self) -> f64 {
        self.0.as_ref().map_or(0.0, |h| h.get_sample_sum())
    }

    pub fn is_registered(&self) -> bool {
        self.0.is_some()
    }
}

/// Timer handle, started once per measured span
#[derive(Clone)]
pub struct Timer(Option<prometheus::Histogram>);

impl Timer {
    /// Start a stopwatch that records into this timer
    pub fn start(&self) -> Stopwatch {
        Stopwatch {
            histogram: self.0.clone(),
            started: Instant::now(),
            stopped: false,
        }
    }

    /// Number of recorded spans (0 for a discarded handle)
    pub fn sample_count(&self) -> u64 {
        self.0.as_ref().map_or(0, |h| h.get_sample_count())
    }

    pub fn is_registered(&self) -> bool {
        self.0.is_some()
    }
}

/// A running span measurement
///
/// Records the elapsed time exactly once: on [`Stopwatch::stop`], or when
/// dropped if it was never stopped, so early returns and panics still
/// produce an observation.
#[must_use = "a stopwatch records when stopped or dropped"]
pub struct Stopwatch {
    histogram: Option<prometheus::Histogram>,
    started: Instant,
    stopped: bool,
}

impl Stopwatch {
    /// A stopwatch that measures time but records nowhere
    pub(crate) fn discarded() -> Self {
        Stopwatch {
            histogram: None,
            started: Instant::now(),
            stopped: false,
        }
    }

    /// Stop the stopwatch and record the elapsed time
    pub fn stop(mut self) -> Duration {
        self.record()
    }

    fn record(&mut self) -> Duration {
        let elapsed = self.started.elapsed();
        if !self.stopped {
            self.stopped = true;
            if let Some(histogram) = &self.histogram {
                histogram.observe(elapsed.as_secs_f64());
            }
        }
        elapsed
    }
}

impl Drop for Stopwatch {
    fn drop(&mut self) {
        self.record();
    }
}
