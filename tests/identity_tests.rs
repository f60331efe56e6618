use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use visitgate::client::identity::{FingerprintFuture, FingerprintSource, IdentityResolver, FALLBACK_PREFIX};

/// Slow source that counts how often it runs.
struct CountingSource {
    runs: AtomicUsize,
    delay: Duration,
    fail: bool,
}

impl CountingSource {
    fn new(delay_ms: u64, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            runs: AtomicUsize::new(0),
            delay: Duration::from_millis(delay_ms),
            fail,
        })
    }
}

impl FingerprintSource for CountingSource {
    fn compute(&self) -> FingerprintFuture<'_> {
        Box::pin(async move {
            let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if self.fail {
                Err(anyhow!("fingerprint library crashed"))
            } else {
                Ok(format!("fp-{}", run))
            }
        })
    }
}

fn is_fallback(id: &str) -> bool {
    id.strip_prefix(FALLBACK_PREFIX)
        .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

#[tokio::test]
async fn test_concurrent_callers_share_one_computation() {
    let source = CountingSource::new(50, false);
    let resolver = Arc::new(IdentityResolver::new(source.clone()));

    // 1. Fire 16 callers before the computation can finish
    let mut handles = Vec::new();
    for _ in 0..16 {
        let resolver = resolver.clone();
        handles.push(tokio::spawn(async move { resolver.visitor_id().await }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }

    // 2. Everyone got the same value from a single run
    assert!(ids.iter().all(|id| id == "fp-1"), "all callers must see the same id: {:?}", ids);
    assert_eq!(source.runs.load(Ordering::SeqCst), 1);

    // 3. Later sequential calls do not recompute
    assert_eq!(resolver.visitor_id().await, "fp-1");
    assert_eq!(resolver.visitor_id().await, "fp-1");
    assert_eq!(source.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failure_resolves_to_fallback() {
    let source = CountingSource::new(10, true);
    let resolver = Arc::new(IdentityResolver::new(source.clone()));

    let (a, b) = tokio::join!(resolver.visitor_id(), resolver.visitor_id());

    assert!(is_fallback(&a), "expected unknown-visitor-<ms>, got {}", a);
    assert_eq!(a, b, "the fallback is computed once and shared");
    assert_eq!(resolver.visitor_id().await, a);
    assert_eq!(source.runs.load(Ordering::SeqCst), 1);
}

/// Source whose computation panics after a short delay.
struct PanickingSource;

impl FingerprintSource for PanickingSource {
    fn compute(&self) -> FingerprintFuture<'_> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let signals: Option<String> = None;
            Ok(signals.expect("fingerprint library aborted"))
        })
    }
}

#[tokio::test]
async fn test_panicking_source_yields_one_shared_fallback() {
    let resolver = Arc::new(IdentityResolver::new(Arc::new(PanickingSource)));

    // 1. Several callers wait while the computation blows up
    let mut handles = Vec::new();
    for _ in 0..8 {
        let resolver = resolver.clone();
        handles.push(tokio::spawn(async move { resolver.visitor_id().await }));
    }
    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }

    // 2. They all receive the same fallback, and so does a later caller
    assert!(is_fallback(&ids[0]), "expected unknown-visitor-<ms>, got {}", ids[0]);
    assert!(ids.iter().all(|id| id == &ids[0]), "fallback must be shared: {:?}", ids);
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(resolver.visitor_id().await, ids[0]);
    assert_eq!(resolver.peek(), Some(ids[0].clone()));
}

#[tokio::test]
async fn test_cancelled_caller_does_not_restart_computation() {
    let source = CountingSource::new(100, false);
    let resolver = Arc::new(IdentityResolver::new(source.clone()));

    // 1. First caller starts the computation and is then aborted
    let first = {
        let resolver = resolver.clone();
        tokio::spawn(async move { resolver.visitor_id().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    first.abort();

    // 2. A later caller still receives the first computation's result
    assert_eq!(resolver.visitor_id().await, "fp-1");
    assert_eq!(source.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_slow_computation_is_awaited_not_timed_out() {
    let source = CountingSource::new(300, false);
    let resolver = IdentityResolver::new(source);
    assert_eq!(resolver.visitor_id().await, "fp-1");
}
