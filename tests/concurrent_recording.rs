//! Concurrency tests for scopes and recording
//!
//! Many tasks recording through the same scope must produce one series per
//! metric and tag set, with no lost updates.

use futures::future::join_all;
use metroscope::metrics::{Reporter, Scope, TagSet};
use std::sync::Arc;
use std::time::Instant;

fn root() -> (Arc<Reporter>, Scope) {
    let reporter = Arc::new(Reporter::new());
    let scope = Scope::new(Arc::clone(&reporter), "worker");
    (reporter, scope)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_hits_are_not_lost() {
    const TASKS: usize = 32;
    const HITS_PER_TASK: usize = 100;
    let (reporter, scope) = root();

    let handles = (0..TASKS).map(|_| {
        let scope = scope.clone();
        tokio::spawn(async move {
            for _ in 0..HITS_PER_TASK {
                scope.record_hit("jobs");
            }
        })
    });
    for result in join_all(handles).await {
        result.expect("recording task panicked");
    }

    let output = reporter.gather().unwrap();
    assert!(output.contains(&format!("worker_jobs_total {}", TASKS * HITS_PER_TASK)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tagging_yields_one_series_per_value() {
    const TASKS: usize = 24;
    let (reporter, scope) = root();

    let handles = (0..TASKS).map(|i| {
        let scope = scope.clone();
        tokio::spawn(async move {
            let region = if i % 2 == 0 { "eu" } else { "us" };
            let tagged = scope.tagged("region", region);
            let start = Instant::now();
            tagged.record_duration("job", start, Instant::now());
            tagged.record_hit("jobs");
            tagged
        })
    });
    let children: Vec<Scope> = join_all(handles)
        .await
        .into_iter()
        .map(|result| result.expect("tagging task panicked"))
        .collect();

    let eu = scope.tagged("region", "eu");
    let eu_children = children
        .iter()
        .filter(|child| child.tags().get("region").map(String::as_str) == Some("eu"))
        .count();
    assert_eq!(eu_children, TASKS / 2);
    assert!(
        children
            .iter()
            .filter(|child| child.tags().get("region").map(String::as_str) == Some("eu"))
            .all(|child| Scope::ptr_eq(child, &eu))
    );

    let output = reporter.gather().unwrap();
    assert!(output.contains(&format!("worker_jobs_total{{region=\"eu\"}} {}", TASKS / 2)));
    assert!(output.contains(&format!("worker_jobs_total{{region=\"us\"}} {}", TASKS / 2)));
    assert!(output.contains(&format!(
        "worker_job_duration_seconds_count{{region=\"eu\"}} {}",
        TASKS / 2
    )));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_set_tagged_scope_keeps_one_child() {
    const TASKS: usize = 16;
    let (_reporter, scope) = root();

    let handles = (0..TASKS).map(|i| {
        let scope = scope.clone();
        tokio::spawn(async move {
            let tags = TagSet::from([("attempt".to_string(), i.to_string())]);
            scope.set_tagged_scope("shared-key", tags)
        })
    });
    let children: Vec<Scope> = join_all(handles)
        .await
        .into_iter()
        .map(|result| result.expect("tagging task panicked"))
        .collect();

    for child in &children[1..] {
        assert!(Scope::ptr_eq(&children[0], child));
    }
}

#[test]
fn test_root_tags_reach_every_child() {
    let reporter = Arc::new(Reporter::new());
    let scope = Scope::with_root_tags(
        Arc::clone(&reporter),
        "worker",
        TagSet::from([("service".to_string(), "billing".to_string())]),
    );

    scope.tagged("region", "eu").record_gauge("queue", 4.0);

    let output = reporter.gather().unwrap();
    assert!(output.contains("worker_queue{region=\"eu\",service=\"billing\"} 4"));
}

#[test]
fn test_closed_tree_drops_recordings() {
    let (reporter, scope) = root();
    let child = scope.tagged("region", "eu");

    child.record_hit("jobs");
    scope.close();
    child.record_hit("jobs");
    scope.record_hit("jobs");
    child.record_span("flush").stop();

    let output = reporter.gather().unwrap();
    assert!(output.contains("worker_jobs_total{region=\"eu\"} 1"));
    assert!(!output.contains("worker_flush_span"));
}
