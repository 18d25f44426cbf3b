//! Shared test fixtures: instrumented producers and a temp-dir backed
//! orchestrator.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pulse_common::{ArtifactKey, ArtifactKind};
use pulse_reports::producer::{Producer, ProducerError, ProducerSet};
use pulse_reports::{Artifact, ArtifactStore, CacheOrchestrator, FsArtifactStore};
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::Semaphore;

/// What a [`CountingProducer`] does once released
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Return `{"kind", "service", "call"}`
    Echo,
    /// Fail with this message
    Fail(String),
    /// Never finish
    Hang,
}

/// Producer that counts invocations and can be held at a gate until the
/// test releases it.
pub struct CountingProducer {
    calls: AtomicUsize,
    gate: Option<Semaphore>,
    behavior: Behavior,
}

impl CountingProducer {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            gate: None,
            behavior,
        })
    }

    /// Every invocation blocks until [`CountingProducer::release`]
    pub fn gated(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            gate: Some(Semaphore::new(0)),
            behavior,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Let `n` gated invocations proceed
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }
}

#[async_trait]
impl Producer for CountingProducer {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn produce(&self, key: &ArtifactKey) -> Result<Artifact, ProducerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        match &self.behavior {
            Behavior::Echo => Ok(Artifact::new(json!({
                "kind": key.kind().as_str(),
                "service": key.service(),
                "call": call,
            }))),
            Behavior::Fail(msg) => Err(ProducerError::Network(msg.clone())),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

/// Orchestrator over a fresh temp dir with `producer` registered for every kind
pub fn orchestrator_with(producer: Arc<CountingProducer>) -> (TempDir, Arc<CacheOrchestrator>) {
    orchestrator_with_timeout(producer, Duration::from_secs(30))
}

pub fn orchestrator_with_timeout(
    producer: Arc<CountingProducer>,
    timeout: Duration,
) -> (TempDir, Arc<CacheOrchestrator>) {
    let dir = TempDir::new().expect("temp dir");
    let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(dir.path()));
    let producers = ProducerSet::new()
        .with(ArtifactKind::Analysis, producer.clone())
        .with(ArtifactKind::Comparison, producer.clone())
        .with(ArtifactKind::Scraped, producer);

    let orchestrator = CacheOrchestrator::new(store, producers).with_production_timeout(timeout);
    (dir, Arc::new(orchestrator))
}

/// Poll until `cond` holds or a second passes
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
