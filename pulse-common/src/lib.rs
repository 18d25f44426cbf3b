//! # Pulse Common Library
//!
//! Shared code for the Pulse report services including:
//! - Error taxonomy shared by the store, producers and orchestrator
//! - Artifact keys (kind + normalized service identity) and path-safe validation
//! - TOML bootstrap configuration and root folder resolution

pub mod config;
pub mod error;
pub mod key;

pub use error::{Error, ErrorKind, Result};
pub use key::{ArtifactKey, ArtifactKind, Namespace};
