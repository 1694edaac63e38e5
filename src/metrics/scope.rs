//! Measurement scopes and tagged child scopes

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::cache::HandleCache;
use super::record::Resolution;
use super::reporter::{Counter, Gauge, Histogram, Reporter, Timer};
use super::snake_case;

/// Tag name to tag value; sorted so a tag set maps to one label order
pub type TagSet = BTreeMap<String, String>;

/// Shutdown switch shared by a root scope and everything derived from it
#[derive(Debug, Clone, Default)]
pub struct Closer {
    closed: Arc<AtomicBool>,
}

impl Closer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop recording; returns `false` if already closed
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Per-scope memoized handles
pub(super) struct ScopeCache {
    pub(super) tagged: HandleCache<String, Scope>,
    pub(super) counters: HandleCache<String, Counter>,
    pub(super) gauges: HandleCache<String, Gauge>,
    pub(super) histograms: HandleCache<String, Histogram>,
    pub(super) timers: HandleCache<String, Timer>,
    pub(super) resolutions: HandleCache<Duration, Arc<Resolution>>,
}

impl ScopeCache {
    fn new() -> Self {
        Self {
            tagged: HandleCache::new(),
            counters: HandleCache::new(),
            gauges: HandleCache::new(),
            histograms: HandleCache::new(),
            timers: HandleCache::new(),
            resolutions: HandleCache::new(),
        }
    }
}

struct ScopeInner {
    reporter: Arc<Reporter>,
    prefix: String,
    tags: TagSet,
    closer: Closer,
    cache: ScopeCache,
}

/// A namespace for measurements
///
/// Every metric recorded through a scope is named `<prefix>_<measurement>`
/// and labelled with the scope's tags. Cloning a scope is cheap and yields
/// a handle to the same namespace and cache.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// Create a root scope whose measurements are prefixed with `prefix`
    pub fn new(reporter: Arc<Reporter>, prefix: &str) -> Self {
        Self::with_root_tags(reporter, prefix, TagSet::new())
    }

    /// Create a root scope whose measurements all carry `tags`
    pub fn with_root_tags(reporter: Arc<Reporter>, prefix: &str, tags: TagSet) -> Self {
        tracing::debug!(prefix, tags = ?tags, "Creating root metrics scope");
        Self::build(reporter, prefix.to_string(), tags, Closer::new())
    }

    fn build(reporter: Arc<Reporter>, prefix: String, tags: TagSet, closer: Closer) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                reporter,
                prefix,
                tags,
                closer,
                cache: ScopeCache::new(),
            }),
        }
    }

    /// The measurement name prefix
    pub fn prefix(&self) -> &str {
        &self.inner.prefix
    }

    /// Tags attached to every measurement of this scope
    pub fn tags(&self) -> &TagSet {
        &self.inner.tags
    }

    /// The reporter this scope registers into
    pub fn reporter(&self) -> &Arc<Reporter> {
        &self.inner.reporter
    }

    /// The closer shared with the root scope
    pub fn closer(&self) -> &Closer {
        &self.inner.closer
    }

    /// Whether two handles refer to the same scope instance
    pub fn ptr_eq(a: &Scope, b: &Scope) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Create a child scope carrying `tags` in addition to this scope's tags
    ///
    /// Always allocates a new scope with an empty cache. On hot paths use
    /// [`Scope::tagged`] or [`Scope::get_tagged_scope`] /
    /// [`Scope::set_tagged_scope`] instead.
    pub fn with_tags(&self, tags: TagSet) -> Scope {
        let mut merged = self.inner.tags.clone();
        merged.extend(tags);
        Self::build(
            Arc::clone(&self.inner.reporter),
            self.inner.prefix.clone(),
            merged,
            self.inner.closer.clone(),
        )
    }

    /// Child scope tagged with a single `tag_name=tag_value` pair
    ///
    /// The child is cached under `tag_name:tag_value`, so repeated calls
    /// return the same instance. An empty name or value returns this scope.
    pub fn tagged(&self, tag_name: &str, tag_value: &str) -> Scope {
        if tag_name.is_empty() || tag_value.is_empty() {
            return self.clone();
        }

        let key = format!("{}:{}", tag_name, tag_value);
        if let Some(scope) = self.get_tagged_scope(&key) {
            return scope;
        }

        let tags = TagSet::from([(tag_name.to_string(), tag_value.to_string())]);
        self.set_tagged_scope(&key, tags)
    }

    /// Look up a child scope previously cached under `key`
    pub fn get_tagged_scope(&self, key: &str) -> Option<Scope> {
        self.inner.cache.tagged.get(key)
    }

    /// Cache a child scope tagged with `tags` under `key`
    ///
    /// `key` is any identifier the caller can compute more cheaply than the
    /// tag set itself. If another caller cached a scope under the same key
    /// first, that scope is returned and `tags` is ignored.
    pub fn set_tagged_scope(&self, key: &str, tags: TagSet) -> Scope {
        self.inner
            .cache
            .tagged
            .get_or_create(key, || self.with_tags(tags))
    }

    /// Stop recording for this scope, its root and every derived scope
    pub fn close(&self) {
        if self.inner.closer.close() {
            tracing::info!(prefix = %self.inner.prefix, "Metrics scope closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closer.is_closed()
    }

    pub(super) fn cache(&self) -> &ScopeCache {
        &self.inner.cache
    }

    /// Full metric name for `measurement` with `suffix` appended
    pub(super) fn metric_name(&self, measurement: &str, suffix: &str) -> String {
        if self.inner.prefix.is_empty() {
            snake_case(&format!("{}{}", measurement, suffix))
        } else {
            snake_case(&format!("{}_{}{}", self.inner.prefix, measurement, suffix))
        }
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("prefix", &self.inner.prefix)
            .field("tags", &self.inner.tags)
            .field("closed", &self.is_closed())
            .finish()
    }
}
