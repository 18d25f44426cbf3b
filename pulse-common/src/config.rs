//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a TOML file. Everything has a built-in
//! default so a missing file only produces a warning.
//!
//! Root folder priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::key::{ArtifactKind, DEFAULT_BASELINE};
use crate::{Error, Result};

/// Environment variable overriding the storage root
pub const ROOT_FOLDER_ENV: &str = "PULSE_ROOT_FOLDER";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Storage root holding `reports/` and `scraped-data/`
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Interface to bind the HTTP server to
    #[serde(default = "default_bind")]
    pub bind: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound on a single producer invocation, in seconds
    #[serde(default = "default_production_timeout_secs")]
    pub production_timeout_secs: u64,

    /// Provider every other provider is compared against
    #[serde(default = "default_baseline")]
    pub comparison_baseline: String,

    /// Browser origins allowed by CORS (empty = same-origin only)
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub producers: ProducersConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// One producer backend per artifact kind
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProducersConfig {
    #[serde(default)]
    pub analysis: Option<ProducerConfig>,
    #[serde(default)]
    pub comparison: Option<ProducerConfig>,
    #[serde(default)]
    pub scraped: Option<ProducerConfig>,
}

impl ProducersConfig {
    pub fn for_kind(&self, kind: ArtifactKind) -> Option<&ProducerConfig> {
        match kind {
            ArtifactKind::Analysis => self.analysis.as_ref(),
            ArtifactKind::Comparison => self.comparison.as_ref(),
            ArtifactKind::Scraped => self.scraped.as_ref(),
        }
    }
}

/// How a producer is reached
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProducerConfig {
    /// Upstream HTTP endpoint returning the artifact as JSON
    Http { url: String },
    /// Local program printing the artifact as JSON on stdout.
    /// `{service}` and `{baseline}` in `args` are substituted per call.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        working_dir: Option<PathBuf>,
    },
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_production_timeout_secs() -> u64 {
    300
}

fn default_baseline() -> String {
    DEFAULT_BASELINE.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            bind: default_bind(),
            port: default_port(),
            production_timeout_secs: default_production_timeout_secs(),
            comparison_baseline: default_baseline(),
            allowed_origins: Vec::new(),
            logging: LoggingConfig::default(),
            producers: ProducersConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Load configuration, falling back to defaults when the file is missing.
    ///
    /// A file that exists but does not parse is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    fn validate(&self) -> Result<()> {
        if self.production_timeout_secs == 0 {
            return Err(Error::Config(
                "production_timeout_secs must be greater than zero".to_string(),
            ));
        }
        // Reuses key validation so a bad baseline fails at startup, not per request
        crate::ArtifactKey::comparison(&self.comparison_baseline)
            .map_err(|e| Error::Config(format!("comparison_baseline: {}", e)))?;
        Ok(())
    }
}

/// Resolve the storage root following the priority order in the module docs
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_config: &TomlConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Default location of the TOML config file for the platform
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("pulse").join("pulse-reports.toml"))
        .unwrap_or_else(|| PathBuf::from("pulse-reports.toml"))
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("pulse"))
        .unwrap_or_else(|| PathBuf::from("./pulse_data"))
}
