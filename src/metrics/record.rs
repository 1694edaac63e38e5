//! Recording API
//!
//! | Method | Metric name | Kind |
//! |---|---|---|
//! | `record_hit`, `record_increment_value` | `<name>_total` | counter |
//! | `record_gauge` | `<name>` | gauge |
//! | `record_size` | `<name>_size` | gauge |
//! | `record_integer_value`, `record_value`, `record_value_with_buckets` | `<name>_value` | histogram |
//! | `record_duration`, `record_duration_with_resolution` | `<name>_duration_seconds` | histogram |
//! | `record_span` | `<name>_span` | timer |

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::cache::HandleCache;
use super::reporter::{Histogram, Stopwatch};
use super::scope::Scope;

/// Buckets for small integer distributions (retries, batch sizes, fan-out)
pub const INTEGER_VALUE_BUCKETS: &[f64] = &[1.0, 2.0, 5.0, 7.0, 9.0, 10.0, 50.0, 100.0];

/// Duration bucket edges relative to the recording resolution
pub const DURATION_BUCKET_FACTORS: &[f64] = &[
    0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 0.75, 0.9, 0.95, 0.99, 1.0, 2.5, 5.0, 10.0, 25.0,
    50.0, 100.0,
];

const DEFAULT_RESOLUTION: Duration = Duration::from_secs(1);

/// Duration bucket edges in seconds for `resolution`
///
/// ```
/// use metroscope::metrics::duration_buckets;
/// use std::time::Duration;
///
/// let buckets = duration_buckets(Duration::from_millis(100));
/// assert_eq!(buckets[11], 0.1);
/// assert_eq!(buckets.last(), Some(&10.0));
/// ```
pub fn duration_buckets(resolution: Duration) -> Vec<f64> {
    let unit = resolution.as_secs_f64();
    DURATION_BUCKET_FACTORS
        .iter()
        .map(|factor| unit * factor)
        .collect()
}

/// Bucket set for one resolution plus the duration histograms using it
pub(crate) struct Resolution {
    pub(crate) buckets: Arc<[f64]>,
    histograms: HandleCache<String, Histogram>,
}

impl Resolution {
    fn new(resolution: Duration) -> Self {
        tracing::debug!(
            resolution_ms = resolution.as_millis() as u64,
            "Building duration buckets"
        );
        Self {
            buckets: duration_buckets(resolution).into(),
            histograms: HandleCache::new(),
        }
    }
}

fn elapsed_between(a: Instant, b: Instant) -> Duration {
    match b.checked_duration_since(a) {
        Some(elapsed) => elapsed,
        None => a.duration_since(b),
    }
}

impl Scope {
    /// Increase the `<measurement>_total` counter by one
    ///
    /// Suited to counting requests or any event that happens one at a time.
    pub fn record_hit(&self, measurement: &str) {
        self.record_increment_value(measurement, 1);
    }

    /// Increase the `<measurement>_total` counter by `value`
    ///
    /// Counters only move forward; negative values are dropped.
    pub fn record_increment_value(&self, measurement: &str, value: i64) {
        if self.is_closed() {
            return;
        }
        let Ok(value) = u64::try_from(value) else {
            tracing::debug!(measurement, value, "Ignoring negative counter increment");
            return;
        };

        let counter = self.cache().counters.get_or_create(measurement, || {
            self.reporter()
                .counter(&self.metric_name(measurement, "_total"), self.tags())
        });
        counter.inc(value);
    }

    /// Set the `<measurement>` gauge to a value that can go up or down
    pub fn record_gauge(&self, measurement: &str, value: f64) {
        if self.is_closed() {
            return;
        }
        let gauge = self.cache().gauges.get_or_create(measurement, || {
            self.reporter()
                .gauge(&self.metric_name(measurement, ""), self.tags())
        });
        gauge.update(value);
    }

    /// Set the `<measurement>_size` gauge, e.g. the length of a queue
    pub fn record_size(&self, measurement: &str, value: f64) {
        self.record_gauge(&format!("{}_size", measurement), value);
    }

    /// Observe a small integer into the `<measurement>_value` histogram
    ///
    /// Uses [`INTEGER_VALUE_BUCKETS`], which favour values close to zero.
    pub fn record_integer_value(&self, measurement: &str, value: i64) {
        self.record_value_with_buckets(measurement, value as f64, INTEGER_VALUE_BUCKETS);
    }

    /// Observe a value into the `<measurement>_value` histogram with default buckets
    pub fn record_value(&self, measurement: &str, value: f64) {
        self.record_value_with_buckets(measurement, value, &[]);
    }

    /// Observe a value into the `<measurement>_value` histogram
    ///
    /// `buckets` apply the first time the histogram is created; an empty
    /// slice selects the Prometheus default buckets.
    pub fn record_value_with_buckets(&self, measurement: &str, value: f64, buckets: &[f64]) {
        if self.is_closed() {
            return;
        }
        let histogram = self.cache().histograms.get_or_create(measurement, || {
            self.reporter()
                .histogram(&self.metric_name(measurement, "_value"), self.tags(), buckets)
        });
        histogram.observe(value);
    }

    /// Observe the time between `a` and `b` into `<measurement>_duration_seconds`
    ///
    /// The order of the two instants does not matter.
    pub fn record_duration(&self, measurement: &str, a: Instant, b: Instant) {
        self.record_duration_with_resolution(measurement, a, b, DEFAULT_RESOLUTION);
    }

    /// Observe the time between `a` and `b` with buckets scaled to `resolution`
    ///
    /// Bucket edges are [`DURATION_BUCKET_FACTORS`] multiplied by
    /// `resolution` (one second when zero). They are computed once per
    /// resolution and shared by every duration recorded at it.
    pub fn record_duration_with_resolution(
        &self,
        measurement: &str,
        a: Instant,
        b: Instant,
        resolution: Duration,
    ) {
        if self.is_closed() {
            return;
        }
        let resolution = self.resolution(resolution);
        let histogram = resolution.histograms.get_or_create(measurement, || {
            self.reporter().histogram(
                &self.metric_name(measurement, "_duration_seconds"),
                self.tags(),
                &resolution.buckets,
            )
        });
        histogram.observe_duration(elapsed_between(a, b));
    }

    /// Start a stopwatch for the `<measurement>_span` timer
    ///
    /// The span is recorded when the stopwatch is stopped or dropped.
    pub fn record_span(&self, measurement: &str) -> Stopwatch {
        if self.is_closed() {
            return Stopwatch::discarded();
        }
        let timer = self.cache().timers.get_or_create(measurement, || {
            self.reporter()
                .timer(&self.metric_name(measurement, "_span"), self.tags())
        });
        timer.start()
    }

    fn resolution(&self, resolution: Duration) -> Arc<Resolution> {
        let resolution = if resolution.is_zero() {
            DEFAULT_RESOLUTION
        } else {
            resolution
        };
        self.cache()
            .resolutions
            .get_or_create(&resolution, || Arc::new(Resolution::new(resolution)))
    }

    /// The bucket set used for durations recorded at `resolution`
    pub(crate) fn duration_bucket_set(&self, resolution: Duration) -> Arc<[f64]> {
        Arc::clone(&self.resolution(resolution).buckets)
    }
}
