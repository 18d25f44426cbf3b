//! Artifact keys
//!
//! An [`ArtifactKey`] names one cacheable report: its kind, the normalized
//! service it describes, and an optional qualifier. Every component is
//! lower-cased and checked against an allow-list (ASCII alphanumerics, `-`,
//! `_`) at construction, so a key that exists has already been proven safe to
//! turn into a storage path.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Service component used by global (non per-service) keys
pub const GLOBAL_SERVICE: &str = "*";

/// Baseline provider used for comparisons when none is configured
pub const DEFAULT_BASELINE: &str = "tmobile";

/// File stem prefix for comparison reports in the reports namespace
pub const COMPARISON_PREFIX: &str = "comparison_";

/// Separator between service and qualifier in a file stem
const EXTRA_SEPARATOR: char = '@';

const MAX_COMPONENT_LEN: usize = 128;

/// Kind of derived artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Insight report for a single service
    Analysis,
    /// Cross-service comparison against a baseline provider (global)
    Comparison,
    /// Raw scraped data for a single service
    Scraped,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Analysis => "analysis",
            ArtifactKind::Comparison => "comparison",
            ArtifactKind::Scraped => "scraped",
        }
    }

    /// Storage namespace the kind lives in
    pub fn namespace(self) -> Namespace {
        match self {
            ArtifactKind::Analysis | ArtifactKind::Comparison => Namespace::Reports,
            ArtifactKind::Scraped => Namespace::ScrapedData,
        }
    }

    /// Whether keys of this kind are addressed per service
    pub fn is_per_service(self) -> bool {
        !matches!(self, ArtifactKind::Comparison)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "analysis" => Ok(ArtifactKind::Analysis),
            "comparison" => Ok(ArtifactKind::Comparison),
            "scraped" => Ok(ArtifactKind::Scraped),
            other => Err(Error::InvalidKey(format!("unknown artifact kind '{}'", other))),
        }
    }
}

/// Top-level storage directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Analysis and comparison reports
    Reports,
    /// Raw scraped data
    ScrapedData,
}

impl Namespace {
    pub fn dir_name(self) -> &'static str {
        match self {
            Namespace::Reports => "reports",
            Namespace::ScrapedData => "scraped-data",
        }
    }
}

/// Identity of one cached artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    kind: ArtifactKind,
    service: String,
    extra: Option<String>,
}

impl ArtifactKey {
    /// Build a key, normalizing case and validating every component.
    ///
    /// For [`ArtifactKind::Comparison`] the service is ignored (the key is
    /// global) and `extra` names the baseline, defaulting to
    /// [`DEFAULT_BASELINE`].
    pub fn new(kind: ArtifactKind, service: &str, extra: Option<&str>) -> Result<Self> {
        let extra = extra
            .map(|e| normalize_component("qualifier", e))
            .transpose()?;

        if !kind.is_per_service() {
            let baseline = extra.unwrap_or_else(|| DEFAULT_BASELINE.to_string());
            return Ok(Self {
                kind,
                service: GLOBAL_SERVICE.to_string(),
                extra: Some(baseline),
            });
        }

        let service = normalize_component("service", service)?;
        if kind == ArtifactKind::Analysis && service.starts_with(COMPARISON_PREFIX) {
            return Err(Error::InvalidKey(format!(
                "service name '{}' is reserved for comparison reports",
                service
            )));
        }

        Ok(Self {
            kind,
            service,
            extra,
        })
    }

    pub fn analysis(service: &str) -> Result<Self> {
        Self::new(ArtifactKind::Analysis, service, None)
    }

    pub fn scraped(service: &str) -> Result<Self> {
        Self::new(ArtifactKind::Scraped, service, None)
    }

    pub fn comparison(baseline: &str) -> Result<Self> {
        Self::new(ArtifactKind::Comparison, GLOBAL_SERVICE, Some(baseline))
    }

    /// Parse a client-supplied file name (e.g. `t-mobile.json`,
    /// `comparison_tmobile.json`) into a structured key for `namespace`.
    pub fn from_filename(namespace: Namespace, filename: &str) -> Result<Self> {
        let stem = filename.strip_suffix(".json").unwrap_or(filename);
        if stem.is_empty() {
            return Err(Error::InvalidKey(format!("empty file name '{}'", filename)));
        }

        if namespace == Namespace::Reports {
            if let Some(baseline) = stem.strip_prefix(COMPARISON_PREFIX) {
                return Self::comparison(baseline);
            }
        }

        let (service, extra) = match stem.split_once(EXTRA_SEPARATOR) {
            Some((service, extra)) => (service, Some(extra)),
            None => (stem, None),
        };

        let kind = match namespace {
            Namespace::Reports => ArtifactKind::Analysis,
            Namespace::ScrapedData => ArtifactKind::Scraped,
        };
        Self::new(kind, service, extra)
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Normalized service, or [`GLOBAL_SERVICE`] for global kinds
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn extra(&self) -> Option<&str> {
        self.extra.as_deref()
    }

    pub fn namespace(&self) -> Namespace {
        self.kind.namespace()
    }

    /// File stem inside the namespace directory
    pub fn file_stem(&self) -> String {
        match (self.kind, self.extra.as_deref()) {
            (ArtifactKind::Comparison, baseline) => {
                format!("{}{}", COMPARISON_PREFIX, baseline.unwrap_or(DEFAULT_BASELINE))
            }
            (_, Some(extra)) => format!("{}{}{}", self.service, EXTRA_SEPARATOR, extra),
            (_, None) => self.service.clone(),
        }
    }

    /// File name inside the namespace directory
    pub fn file_name(&self) -> String {
        format!("{}.json", self.file_stem())
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, &self.extra) {
            (ArtifactKind::Comparison, Some(baseline)) => write!(f, "{}/{}", self.kind, baseline),
            (_, Some(extra)) => write!(f, "{}/{}@{}", self.kind, self.service, extra),
            (_, None) => write!(f, "{}/{}", self.kind, self.service),
        }
    }
}

/// Lower-case and validate one key component against the allow-list
fn normalize_component(label: &str, raw: &str) -> Result<String> {
    let value = raw.trim().to_lowercase();

    if value.is_empty() {
        return Err(Error::InvalidKey(format!("{} must not be empty", label)));
    }
    if value.len() > MAX_COMPONENT_LEN {
        return Err(Error::InvalidKey(format!(
            "{} exceeds {} characters",
            label, MAX_COMPONENT_LEN
        )));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::InvalidKey(format!(
            "{} '{}' may only contain letters, digits, '-' and '_'",
            label, raw
        )));
    }

    Ok(value)
}
