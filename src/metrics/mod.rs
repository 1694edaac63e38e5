//! Scoped metrics recording backed by a Prometheus registry
//!
//! Application code records measurements through a [`Scope`], a namespace
//! with an optional set of tags. Every scope memoizes the handles it hands
//! out, so the hot recording path is a read-locked map probe followed by an
//! atomic update.
//!
//! ```
//! use metroscope::metrics::{Reporter, Scope};
//! use std::sync::Arc;
//!
//! let reporter = Arc::new(Reporter::new());
//! let app = Scope::new(reporter.clone(), "app");
//!
//! app.record_hit("logins");
//! app.tagged("region", "eu").record_gauge("queue depth", 12.0);
//!
//! let output = reporter.gather().unwrap();
//! assert!(output.contains("app_logins_total"));
//! assert!(output.contains("app_queue_depth{region=\"eu\"} 12"));
//! ```

mod cache;
mod record;
mod reporter;
mod scope;

pub use cache::HandleCache;
pub use record::{DURATION_BUCKET_FACTORS, INTEGER_VALUE_BUCKETS, duration_buckets};
pub use reporter::{Counter, Gauge, Histogram, Reporter, Stopwatch, Timer};
pub use scope::{Closer, Scope, TagSet};

/// Normalize a measurement name for the Prometheus exposition format
///
/// Lower-cases the name and replaces `-`, ` ` and `.` with `_`, since the
/// scrape format does not allow those characters in metric identifiers.
///
/// ```
/// use metroscope::metrics::snake_case;
///
/// assert_eq!(snake_case("Queue-Depth.p99 max"), "queue_depth_p99_max");
/// ```
pub fn snake_case(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| match c {
            '-' | ' ' | '.' => '_',
            c => c,
        })
        .collect()
}
