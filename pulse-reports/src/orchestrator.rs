//! Cache orchestrator
//!
//! Decides per request whether to serve a stored artifact or run the
//! producer, and guarantees at most one in-flight production per key.
//!
//! # Tickets
//!
//! The ticket table maps a key to the production currently running for it.
//! Check-or-create and remove happen under one mutex that is never held
//! across an `.await`. The request that creates a ticket spawns the
//! production as a task; it and every request that joins afterwards wait on
//! the same `watch` channel and receive the same artifact or error. Waiters
//! never go back to the store after joining.
//!
//! A completed production is written to the store before its ticket is
//! resolved, so nothing is returned that is not yet durable.
//!
//! `invalidate` does not cancel a running production. A production that
//! finishes after an invalidation will repopulate the entry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use pulse_common::{ArtifactKey, Error, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::producer::{Producer, ProducerSet};
use crate::store::{Artifact, ArtifactStore};

/// Default upper bound on one producer invocation
pub const DEFAULT_PRODUCTION_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
enum TicketState {
    Pending,
    Succeeded(Artifact),
    Failed(Error),
}

impl TicketState {
    fn is_settled(&self) -> bool {
        !matches!(self, TicketState::Pending)
    }
}

struct InFlight {
    id: u64,
    state: watch::Receiver<TicketState>,
}

/// Keyed table of in-flight productions
#[derive(Default)]
struct TicketTable {
    tickets: Mutex<HashMap<ArtifactKey, InFlight>>,
    next_id: AtomicU64,
}

impl TicketTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<ArtifactKey, InFlight>> {
        // Critical sections never panic midway, so a poisoned map is still consistent
        self.tickets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes its ticket when the production task ends, including by panic.
///
/// Only removes the entry if it is still the one this guard was issued for.
struct TicketGuard {
    table: Arc<TicketTable>,
    key: ArtifactKey,
    id: u64,
}

impl TicketGuard {
    /// Release every waiter with `outcome` and retire the ticket
    fn complete(self, sender: watch::Sender<TicketState>, outcome: Result<Artifact>) {
        let state = match outcome {
            Ok(artifact) => TicketState::Succeeded(artifact),
            Err(e) => TicketState::Failed(e),
        };
        let mut tickets = self.table.lock();
        sender.send_replace(state);
        Self::remove_if_current(&mut tickets, &self.key, self.id);
    }

    fn remove_if_current(tickets: &mut HashMap<ArtifactKey, InFlight>, key: &ArtifactKey, id: u64) {
        if tickets.get(key).is_some_and(|t| t.id == id) {
            tickets.remove(key);
        }
    }
}

impl Drop for TicketGuard {
    fn drop(&mut self) {
        let mut tickets = self.table.lock();
        Self::remove_if_current(&mut tickets, &self.key, self.id);
    }
}

/// Keyed, single-flight coordinator between the store and the producers
pub struct CacheOrchestrator {
    store: Arc<dyn ArtifactStore>,
    producers: ProducerSet,
    production_timeout: Duration,
    tickets: Arc<TicketTable>,
}

impl CacheOrchestrator {
    pub fn new(store: Arc<dyn ArtifactStore>, producers: ProducerSet) -> Self {
        Self {
            store,
            producers,
            production_timeout: DEFAULT_PRODUCTION_TIMEOUT,
            tickets: Arc::new(TicketTable::default()),
        }
    }

    pub fn with_production_timeout(mut self, timeout: Duration) -> Self {
        self.production_timeout = timeout;
        self
    }

    pub fn production_timeout(&self) -> Duration {
        self.production_timeout
    }

    /// Serve `key` from the store, or produce, store and serve it.
    ///
    /// With `force_refresh` the cache-hit check is skipped, but the request
    /// still joins a production already running for the key.
    pub async fn get_or_produce(&self, key: &ArtifactKey, force_refresh: bool) -> Result<Artifact> {
        if !force_refresh && self.store.exists(key).await {
            match self.store.read(key).await {
                Ok(artifact) => {
                    debug!(key = %key, "Cache hit");
                    return Ok(artifact);
                }
                // Deleted between the existence check and the read
                Err(Error::NotFound(_)) => debug!(key = %key, "Entry vanished, producing"),
                Err(e) => return Err(e),
            }
        }

        let state = self.join_or_start(key);
        Self::await_ticket(state, key).await
    }

    /// Remove the stored artifact. Returns whether anything was removed.
    pub async fn invalidate(&self, key: &ArtifactKey) -> Result<bool> {
        let deleted = self.store.delete(key).await?;
        if deleted {
            info!(key = %key, "Artifact invalidated");
        }
        Ok(deleted)
    }

    /// Whether an artifact is stored for `key`. Never triggers production.
    pub async fn peek(&self, key: &ArtifactKey) -> bool {
        self.store.exists(key).await
    }

    /// Read the stored artifact without producing on a miss
    pub async fn read(&self, key: &ArtifactKey) -> Result<Artifact> {
        self.store.read(key).await
    }

    /// Number of productions currently running
    pub fn in_flight(&self) -> usize {
        self.tickets.lock().len()
    }

    /// Join the ticket for `key`, creating it and spawning the production
    /// if none exists.
    fn join_or_start(&self, key: &ArtifactKey) -> watch::Receiver<TicketState> {
        let (state, started) = {
            let mut tickets = self.tickets.lock();
            if let Some(in_flight) = tickets.get(key) {
                debug!(key = %key, ticket = in_flight.id, "Joining in-flight production");
                (in_flight.state.clone(), None)
            } else {
                let id = self.tickets.next_id.fetch_add(1, Ordering::Relaxed);
                let (sender, state) = watch::channel(TicketState::Pending);
                tickets.insert(
                    key.clone(),
                    InFlight {
                        id,
                        state: state.clone(),
                    },
                );
                (state, Some((id, sender)))
            }
        };

        if let Some((id, sender)) = started {
            self.spawn_production(key.clone(), id, sender);
        }
        state
    }

    fn spawn_production(&self, key: ArtifactKey, id: u64, sender: watch::Sender<TicketState>) {
        let guard = TicketGuard {
            table: Arc::clone(&self.tickets),
            key: key.clone(),
            id,
        };
        let store = Arc::clone(&self.store);
        let producer = self.producers.get(key.kind());
        let timeout = self.production_timeout;

        tokio::spawn(async move {
            let outcome = produce_and_store(store.as_ref(), producer, &key, timeout).await;
            guard.complete(sender, outcome);
        });
    }

    async fn await_ticket(
        mut state: watch::Receiver<TicketState>,
        key: &ArtifactKey,
    ) -> Result<Artifact> {
        let settled = state
            .wait_for(TicketState::is_settled)
            .await
            .map(|s| s.clone());

        match settled {
            Ok(TicketState::Succeeded(artifact)) => Ok(artifact),
            Ok(TicketState::Failed(e)) => Err(e),
            // Sender dropped without settling: the production task panicked
            Ok(TicketState::Pending) | Err(_) => {
                Err(production_failed(key, "production task aborted".to_string()))
            }
        }
    }
}

/// Run the producer under the deadline and persist its result
async fn produce_and_store(
    store: &dyn ArtifactStore,
    producer: Option<Arc<dyn Producer>>,
    key: &ArtifactKey,
    timeout: Duration,
) -> Result<Artifact> {
    let producer = producer
        .ok_or_else(|| production_failed(key, "no producer registered".to_string()))?;

    let started = Instant::now();
    info!(key = %key, producer = producer.name(), "Production started");

    let artifact = match tokio::time::timeout(timeout, producer.produce(key)).await {
        Ok(Ok(artifact)) => artifact,
        Ok(Err(e)) => {
            warn!(key = %key, "Production failed: {}", e);
            return Err(production_failed(key, e.to_string()));
        }
        Err(_) => {
            warn!(key = %key, "Production timed out after {:?}", timeout);
            return Err(Error::ProductionTimeout {
                kind: key.kind(),
                service: key.service().to_string(),
                after: timeout,
            });
        }
    };

    if artifact.value().is_null() {
        warn!(key = %key, "Producer returned an empty artifact");
        return Err(production_failed(key, "producer returned no data".to_string()));
    }

    store.write(key, &artifact).await?;
    info!(
        key = %key,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Production complete"
    );
    Ok(artifact)
}

fn production_failed(key: &ArtifactKey, cause: String) -> Error {
    Error::ProductionFailed {
        kind: key.kind(),
        service: key.service().to_string(),
        cause,
    }
}
