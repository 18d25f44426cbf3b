//! Producer adapters
//!
//! Producers compute an artifact from scratch: scraping a provider's public
//! outage pages, extracting insights from scraped posts, or comparing
//! providers against a baseline. They are slow, side-effecting collaborators
//! living outside this service; each adapter here wraps one way of reaching
//! them behind the [`Producer`] trait.
//!
//! Adapters impose no deadline of their own. The orchestrator bounds every
//! invocation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pulse_common::config::{ProducerConfig, ProducersConfig};
use pulse_common::{ArtifactKey, ArtifactKind};
use thiserror::Error;
use tracing::{info, warn};

use crate::store::Artifact;

pub mod command;
pub mod http;

pub use command::CommandProducer;
pub use http::HttpProducer;

/// Producer failures. Surfaced to callers as `ProductionFailed`.
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("network error: {0}")]
    Network(String),

    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("command failed: {0}")]
    Command(String),

    #[error("invalid producer output: {0}")]
    InvalidOutput(String),

    #[error("no producer configured for {0} artifacts")]
    NotConfigured(ArtifactKind),

    #[error("invalid producer configuration: {0}")]
    Config(String),
}

/// Uniform contract over the heterogeneous producers
#[async_trait]
pub trait Producer: Send + Sync {
    /// Producer identifier for logs
    fn name(&self) -> &'static str;

    /// Compute the artifact for `key`
    ///
    /// Comparison producers receive a global key; they read the baseline
    /// from `key.extra()` and ignore the service.
    async fn produce(&self, key: &ArtifactKey) -> Result<Artifact, ProducerError>;
}

/// Stand-in for kinds with no configured backend
#[derive(Debug, Clone, Copy)]
pub struct UnconfiguredProducer;

#[async_trait]
impl Producer for UnconfiguredProducer {
    fn name(&self) -> &'static str {
        "unconfigured"
    }

    async fn produce(&self, key: &ArtifactKey) -> Result<Artifact, ProducerError> {
        Err(ProducerError::NotConfigured(key.kind()))
    }
}

/// One producer per artifact kind
#[derive(Clone, Default)]
pub struct ProducerSet {
    producers: HashMap<ArtifactKind, Arc<dyn Producer>>,
}

impl ProducerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `producer` for `kind`, replacing any previous one
    pub fn with(mut self, kind: ArtifactKind, producer: Arc<dyn Producer>) -> Self {
        self.producers.insert(kind, producer);
        self
    }

    pub fn get(&self, kind: ArtifactKind) -> Option<Arc<dyn Producer>> {
        self.producers.get(&kind).cloned()
    }

    /// Build adapters from the `[producers]` configuration tables.
    ///
    /// Kinds without a table get [`UnconfiguredProducer`], so requests for
    /// them fail cleanly instead of the service refusing to start.
    pub fn from_config(config: &ProducersConfig) -> Result<Self, ProducerError> {
        let mut set = Self::new();

        for kind in [ArtifactKind::Analysis, ArtifactKind::Comparison, ArtifactKind::Scraped] {
            let producer: Arc<dyn Producer> = match config.for_kind(kind) {
                Some(ProducerConfig::Http { url }) => {
                    info!("{} producer: HTTP {}", kind, url);
                    Arc::new(HttpProducer::new(url)?)
                }
                Some(ProducerConfig::Command {
                    program,
                    args,
                    working_dir,
                }) => {
                    info!("{} producer: command {} {:?}", kind, program, args);
                    Arc::new(CommandProducer::new(
                        program.clone(),
                        args.clone(),
                        working_dir.clone(),
                    ))
                }
                None => {
                    warn!("No producer configured for {} artifacts", kind);
                    Arc::new(UnconfiguredProducer)
                }
            };
            set = set.with(kind, producer);
        }

        Ok(set)
    }
}

impl std::fmt::Debug for ProducerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (kind, producer) in &self.producers {
            map.entry(kind, &producer.name());
        }
        map.finish()
    }
}
