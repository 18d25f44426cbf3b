//! Concurrency tests for the cache orchestrator
//!
//! Productions are held at a gate so that every concurrent request is known
//! to have arrived before the producer is allowed to finish.

mod helpers;

use std::time::Duration;

use helpers::{orchestrator_with, orchestrator_with_timeout, wait_until, Behavior, CountingProducer};
use pulse_common::{ArtifactKey, ArtifactKind, Error, ErrorKind};
use pulse_reports::{Artifact, ArtifactStore, FsArtifactStore};
use serde_json::json;
use tokio::task::JoinSet;

const WAITERS: usize = 16;

#[tokio::test]
async fn test_concurrent_misses_share_one_production() {
    let producer = CountingProducer::gated(Behavior::Echo);
    let (dir, orch) = orchestrator_with(producer.clone());
    let key = ArtifactKey::analysis("verizon").unwrap();

    let mut tasks = JoinSet::new();
    for _ in 0..WAITERS {
        let orch = orch.clone();
        let key = key.clone();
        tasks.spawn(async move { orch.get_or_produce(&key, false).await });
    }

    wait_until(|| producer.calls() == 1 && orch.in_flight() == 1).await;
    // Let the remaining requests reach the ticket before releasing
    tokio::time::sleep(Duration::from_millis(50)).await;
    producer.release(1);

    let mut results = Vec::new();
    while let Some(result) = tasks.join_next().await {
        results.push(result.unwrap().unwrap());
    }

    assert_eq!(results.len(), WAITERS);
    assert_eq!(producer.calls(), 1);
    assert!(results.iter().all(|a| a == &results[0]));
    assert_eq!(results[0].value()["call"], 1);
    assert_eq!(orch.in_flight(), 0);

    let stored = FsArtifactStore::new(dir.path()).read(&key).await.unwrap();
    assert_eq!(stored, results[0]);
}

#[tokio::test]
async fn test_failure_is_shared_and_not_cached() {
    let producer = CountingProducer::gated(Behavior::Fail("upstream unreachable".to_string()));
    let (_dir, orch) = orchestrator_with(producer.clone());
    let key = ArtifactKey::scraped("att").unwrap();

    let mut tasks = JoinSet::new();
    for _ in 0..WAITERS {
        let orch = orch.clone();
        let key = key.clone();
        tasks.spawn(async move { orch.get_or_produce(&key, false).await });
    }

    wait_until(|| producer.calls() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    // Enough permits that a straggler starting its own production is not stuck
    producer.release(WAITERS);

    let mut errors = Vec::new();
    while let Some(result) = tasks.join_next().await {
        errors.push(result.unwrap().unwrap_err());
    }

    // Requests arriving after the failure start a fresh production
    let first = producer.calls();
    assert!(first >= 1);
    for err in &errors {
        match err {
            Error::ProductionFailed { kind, service, cause } => {
                assert_eq!(*kind, ArtifactKind::Scraped);
                assert_eq!(service, "att");
                assert!(cause.contains("upstream unreachable"), "{}", cause);
            }
            other => panic!("expected production failure, got {:?}", other),
        }
    }
    assert!(!orch.peek(&key).await);
    assert_eq!(orch.in_flight(), 0);

    // No negative caching: the next request runs the producer again
    producer.release(1);
    assert!(orch.get_or_produce(&key, false).await.is_err());
    assert_eq!(producer.calls(), first + 1);
}

#[tokio::test]
async fn test_timeout_reaches_every_waiter() {
    let producer = CountingProducer::new(Behavior::Hang);
    let (_dir, orch) = orchestrator_with_timeout(producer.clone(), Duration::from_millis(100));
    let key = ArtifactKey::comparison("tmobile").unwrap();

    let mut tasks = JoinSet::new();
    for _ in 0..4 {
        let orch = orch.clone();
        let key = key.clone();
        tasks.spawn(async move { orch.get_or_produce(&key, false).await });
    }

    while let Some(result) = tasks.join_next().await {
        let err = result.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProductionTimeout);
        assert_eq!(
            err,
            Error::ProductionTimeout {
                kind: ArtifactKind::Comparison,
                service: "*".to_string(),
                after: Duration::from_millis(100),
            }
        );
    }

    assert_eq!(orch.in_flight(), 0);
    assert!(!orch.peek(&key).await);
}

#[tokio::test]
async fn test_cache_hit_bypasses_producer() {
    let producer = CountingProducer::new(Behavior::Echo);
    let (dir, orch) = orchestrator_with(producer.clone());
    let key = ArtifactKey::analysis("sprint").unwrap();
    let cached = Artifact::new(json!({"insights": ["billing complaints"]}));
    FsArtifactStore::new(dir.path()).write(&key, &cached).await.unwrap();

    for _ in 0..3 {
        assert_eq!(orch.get_or_produce(&key, false).await.unwrap(), cached);
    }
    assert_eq!(producer.calls(), 0);
}

#[tokio::test]
async fn test_force_refresh_overwrites_stored_artifact() {
    let producer = CountingProducer::new(Behavior::Echo);
    let (dir, orch) = orchestrator_with(producer.clone());
    let key = ArtifactKey::analysis("sprint").unwrap();
    let store = FsArtifactStore::new(dir.path());
    store.write(&key, &Artifact::new(json!({"stale": true}))).await.unwrap();

    let fresh = orch.get_or_produce(&key, true).await.unwrap();

    assert_eq!(producer.calls(), 1);
    assert_eq!(fresh.value()["service"], "sprint");
    assert_eq!(store.read(&key).await.unwrap(), fresh);
}

#[tokio::test]
async fn test_force_refresh_joins_running_production() {
    let producer = CountingProducer::gated(Behavior::Echo);
    let (_dir, orch) = orchestrator_with(producer.clone());
    let key = ArtifactKey::scraped("verizon").unwrap();

    let first = {
        let orch = orch.clone();
        let key = key.clone();
        tokio::spawn(async move { orch.get_or_produce(&key, false).await })
    };
    wait_until(|| producer.calls() == 1).await;

    let second = {
        let orch = orch.clone();
        let key = key.clone();
        tokio::spawn(async move { orch.get_or_produce(&key, true).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    producer.release(1);

    let a = first.await.unwrap().unwrap();
    let b = second.await.unwrap().unwrap();
    assert_eq!(a, b);
    assert_eq!(producer.calls(), 1);
}

#[tokio::test]
async fn test_distinct_keys_do_not_block_each_other() {
    let producer = CountingProducer::gated(Behavior::Echo);
    let (_dir, orch) = orchestrator_with(producer.clone());
    let slow = ArtifactKey::analysis("verizon").unwrap();
    let fast = ArtifactKey::analysis("att").unwrap();

    let pending = {
        let orch = orch.clone();
        let slow = slow.clone();
        tokio::spawn(async move { orch.get_or_produce(&slow, false).await })
    };
    wait_until(|| producer.calls() == 1).await;

    let finished = {
        let orch = orch.clone();
        let fast = fast.clone();
        tokio::spawn(async move { orch.get_or_produce(&fast, false).await })
    };
    wait_until(|| producer.calls() == 2 && orch.in_flight() == 2).await;
    producer.release(2);

    let a = pending.await.unwrap().unwrap();
    let b = finished.await.unwrap().unwrap();
    assert_eq!(a.value()["service"], "verizon");
    assert_eq!(b.value()["service"], "att");
    assert_eq!(producer.calls(), 2);
}

#[tokio::test]
async fn test_invalidate_does_not_cancel_running_production() {
    let producer = CountingProducer::gated(Behavior::Echo);
    let (_dir, orch) = orchestrator_with(producer.clone());
    let key = ArtifactKey::analysis("tmobile").unwrap();

    let running = {
        let orch = orch.clone();
        let key = key.clone();
        tokio::spawn(async move { orch.get_or_produce(&key, false).await })
    };
    wait_until(|| producer.calls() == 1).await;

    assert!(!orch.invalidate(&key).await.unwrap());
    producer.release(1);
    running.await.unwrap().unwrap();

    // The late-finishing production repopulates the entry
    assert!(orch.peek(&key).await);
    assert!(orch.invalidate(&key).await.unwrap());
    assert!(!orch.peek(&key).await);
}

#[tokio::test]
async fn test_corrupt_entry_is_an_error_not_a_miss() {
    let producer = CountingProducer::new(Behavior::Echo);
    let (dir, orch) = orchestrator_with(producer.clone());
    let key = ArtifactKey::analysis("verizon").unwrap();
    std::fs::create_dir_all(dir.path().join("reports")).unwrap();
    std::fs::write(dir.path().join("reports/verizon.json"), b"not json").unwrap();

    let err = orch.get_or_produce(&key, false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CorruptData);
    assert_eq!(producer.calls(), 0);

    // An explicit refresh repairs it
    orch.get_or_produce(&key, true).await.unwrap();
    assert!(orch.read(&key).await.is_ok());
}
