//! HTTP producer adapter
//!
//! Calls an upstream service with `GET <url>?service=<service>` (comparisons
//! send `?baseline=<baseline>` instead) and takes the JSON response body as
//! the artifact.

use async_trait::async_trait;
use pulse_common::{ArtifactKey, ArtifactKind};
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::debug;

use super::{Producer, ProducerError};
use crate::store::Artifact;

const USER_AGENT: &str = concat!("pulse-reports/", env!("CARGO_PKG_VERSION"));

/// Longest upstream error body echoed back in a failure message
const MAX_ERROR_BODY: usize = 512;

/// Producer backed by an upstream HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpProducer {
    client: Client,
    url: Url,
}

impl HttpProducer {
    pub fn new(url: &str) -> Result<Self, ProducerError> {
        let url = Url::parse(url)
            .map_err(|e| ProducerError::Config(format!("invalid producer URL '{}': {}", url, e)))?;
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProducerError::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Query parameters identifying `key` to the upstream
    fn query_for(key: &ArtifactKey) -> Vec<(&'static str, String)> {
        let mut query = Vec::with_capacity(2);
        match key.kind() {
            ArtifactKind::Comparison => {
                if let Some(baseline) = key.extra() {
                    query.push(("baseline", baseline.to_string()));
                }
            }
            ArtifactKind::Analysis | ArtifactKind::Scraped => {
                query.push(("service", key.service().to_string()));
                if let Some(extra) = key.extra() {
                    query.push(("qualifier", extra.to_string()));
                }
            }
        }
        query
    }
}

#[async_trait]
impl Producer for HttpProducer {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn produce(&self, key: &ArtifactKey) -> Result<Artifact, ProducerError> {
        debug!(key = %key, url = %self.url, "Calling upstream producer");

        let response = self
            .client
            .get(self.url.clone())
            .query(&Self::query_for(key))
            .send()
            .await
            .map_err(|e| ProducerError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(ProducerError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| ProducerError::InvalidOutput(format!("response is not JSON: {}", e)))?;

        Ok(Artifact::new(value))
    }
}
