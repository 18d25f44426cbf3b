//! Command producer adapter
//!
//! Runs a local program (typically one of the Python scraping/analysis
//! scripts) and reads the artifact as JSON from its stdout. Arguments are
//! passed directly, never through a shell; `{service}`, `{baseline}`,
//! `{qualifier}` and `{kind}` placeholders are replaced per call with the
//! key's already-validated components.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use pulse_common::ArtifactKey;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use super::{Producer, ProducerError};
use crate::store::Artifact;

/// Longest stderr excerpt kept in a failure message
const MAX_STDERR: usize = 512;

/// Producer backed by a local program
#[derive(Debug, Clone)]
pub struct CommandProducer {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandProducer {
    pub fn new(program: String, args: Vec<String>, working_dir: Option<PathBuf>) -> Self {
        Self {
            program,
            args,
            working_dir,
        }
    }

    fn render_args(&self, key: &ArtifactKey) -> Vec<String> {
        let service = key.service();
        let extra = key.extra().unwrap_or("");
        let kind = key.kind().as_str();

        self.args
            .iter()
            .map(|arg| {
                arg.replace("{service}", service)
                    .replace("{baseline}", extra)
                    .replace("{qualifier}", extra)
                    .replace("{kind}", kind)
            })
            .collect()
    }
}

#[async_trait]
impl Producer for CommandProducer {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn produce(&self, key: &ArtifactKey) -> Result<Artifact, ProducerError> {
        let args = self.render_args(key);
        debug!(key = %key, program = %self.program, ?args, "Running producer command");

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Deadline expiry drops this future; take the child down with it
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let output = command
            .output()
            .await
            .map_err(|e| ProducerError::Command(format!("cannot run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let excerpt: String = stderr.chars().take(MAX_STDERR).collect();
            return Err(ProducerError::Command(format!(
                "{} exited with {}: {}",
                self.program, output.status, excerpt
            )));
        }

        let value: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| ProducerError::InvalidOutput(format!("stdout is not JSON: {}", e)))?;

        Ok(Artifact::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_are_substituted() {
        let producer = CommandProducer::new(
            "python3".to_string(),
            vec![
                "compare_tmob.py".to_string(),
                "--baseline={baseline}".to_string(),
                "{kind}".to_string(),
            ],
            None,
        );
        let key = ArtifactKey::comparison("TMobile").unwrap();
        assert_eq!(
            producer.render_args(&key),
            vec!["compare_tmob.py", "--baseline=tmobile", "comparison"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_json_becomes_artifact() {
        let producer = CommandProducer::new(
            "sh".to_string(),
            vec!["-c".to_string(), "echo '{\"provider\": \"{service}\"}'".to_string()],
            None,
        );
        let key = ArtifactKey::scraped("AT-T").unwrap();

        let artifact = producer.produce(&key).await.unwrap();
        assert_eq!(artifact.value()["provider"], "at-t");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr() {
        let producer = CommandProducer::new(
            "sh".to_string(),
            vec!["-c".to_string(), "echo 'rate limited' >&2; exit 3".to_string()],
            None,
        );
        let key = ArtifactKey::scraped("verizon").unwrap();

        match producer.produce(&key).await {
            Err(ProducerError::Command(msg)) => assert!(msg.contains("rate limited"), "{}", msg),
            other => panic!("expected command error, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_json_stdout_is_invalid_output() {
        let producer = CommandProducer::new(
            "sh".to_string(),
            vec!["-c".to_string(), "echo 'Scraping verizon... done'".to_string()],
            None,
        );
        let key = ArtifactKey::scraped("verizon").unwrap();

        assert!(matches!(
            producer.produce(&key).await,
            Err(ProducerError::InvalidOutput(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let producer = CommandProducer::new("pulse-no-such-program".to_string(), Vec::new(), None);
        let key = ArtifactKey::scraped("verizon").unwrap();

        assert!(matches!(
            producer.produce(&key).await,
            Err(ProducerError::Command(_))
        ));
    }
}
