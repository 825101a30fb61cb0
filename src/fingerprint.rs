//! Runs the external fingerprint extractor on a local file.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use snipsentry_core::{FingerprintSet, Fingerprinter, SnippetError};

use crate::config::FingerprintConfig;

#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("Failed to spawn fingerprint extractor: {0}")]
    SpawnError(#[from] std::io::Error),

    #[error("Fingerprint extractor timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    #[error("Fingerprint extractor exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("Failed to parse fingerprint output: {0}")]
    ParseError(String),

    #[error("Fingerprint runtime not found at: {0}")]
    BinaryNotFound(PathBuf),
}

impl From<FingerprintError> for SnippetError {
    fn from(error: FingerprintError) -> Self {
        match error {
            FingerprintError::Timeout { timeout_secs } => SnippetError::Timeout {
                operation: "fingerprint extraction".to_string(),
                timeout_secs,
            },
            FingerprintError::ParseError(message) => SnippetError::MalformedResponse(message),
            other => SnippetError::collaborator("fingerprint extractor", other.to_string()),
        }
    }
}

/// `java -cp <classpath> <main_class> <file>`, reading the JSON payload from stdout.
pub struct JavaFingerprinter {
    java: PathBuf,
    classpath: String,
    main_class: String,
    timeout_secs: u64,
}

impl JavaFingerprinter {
    pub fn new(config: &FingerprintConfig) -> Self {
        Self {
            java: config.java.clone(),
            classpath: config.classpath.clone(),
            main_class: config.main_class.clone(),
            timeout_secs: config.timeout_secs,
        }
    }

    pub async fn extract(&self, path: &Path) -> Result<Option<FingerprintSet>, FingerprintError> {
        timeout(
            Duration::from_secs(self.timeout_secs),
            self.spawn_extractor(path),
        )
        .await
        .map_err(|_| FingerprintError::Timeout {
            timeout_secs: self.timeout_secs,
        })?
    }

    async fn spawn_extractor(&self, path: &Path) -> Result<Option<FingerprintSet>, FingerprintError> {
        let mut cmd = Command::new(&self.java);

        cmd.arg("-cp")
            .arg(&self.classpath)
            .arg(&self.main_class)
            .arg(path);

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Spawning fingerprint extractor: {:?}", cmd);

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FingerprintError::BinaryNotFound(self.java.clone())
            } else {
                FingerprintError::SpawnError(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(FingerprintError::NonZeroExit {
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        let stderr_output = String::from_utf8_lossy(&output.stderr);
        if !stderr_output.trim().is_empty() {
            warn!("Fingerprint extractor stderr: {}", stderr_output.trim());
        }

        parse_fingerprints(&String::from_utf8_lossy(&output.stdout))
    }
}

fn parse_fingerprints(stdout: &str) -> Result<Option<FingerprintSet>, FingerprintError> {
    if stdout.trim().is_empty() {
        debug!("Fingerprint extractor returned empty output");
        return Ok(None);
    }

    let payload: serde_json::Value = serde_json::from_str(stdout.trim()).map_err(|e| {
        FingerprintError::ParseError(format!(
            "{} - Output: {}",
            e,
            stdout.chars().take(200).collect::<String>()
        ))
    })?;

    Ok(FingerprintSet::from_value(payload))
}

#[async_trait]
impl Fingerprinter for JavaFingerprinter {
    async fn fingerprint(&self, path: &Path) -> Result<Option<FingerprintSet>, SnippetError> {
        Ok(self.extract(path).await?)
    }
}
