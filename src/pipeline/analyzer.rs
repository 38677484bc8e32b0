// Analyzer collaborator and the external-command implementation
use crate::error::{Error, Result};
use crate::model::SdResult;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const DUMP_PLACEHOLDER: &str = "{dump}";
const OUTPUT_PLACEHOLDER: &str = "{output}";

#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Dump files contained in a fetched bundle source
    async fn discover(&self, path: &Path) -> Result<Vec<PathBuf>> {
        Ok(vec![path.to_path_buf()])
    }

    async fn analyze(&self, dump: &Path) -> Result<SdResult>;

    fn name(&self) -> &str;
}

/// Runs a configured command line per dump.
///
/// `{dump}` is replaced by the dump path. If the command line contains
/// `{output}` the result is read from that file, otherwise from stdout.
pub struct CommandAnalyzer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandAnalyzer {
    pub fn new(command: &[String], timeout: Duration) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::Config("analyzer command must not be empty".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }

    fn writes_output_file(&self) -> bool {
        self.args.iter().any(|a| a.contains(OUTPUT_PLACEHOLDER))
    }

    fn arguments(&self, dump: &Path, output: &Path) -> Vec<String> {
        let dump = dump.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(DUMP_PLACEHOLDER, &dump)
                    .replace(OUTPUT_PLACEHOLDER, &output)
            })
            .collect()
    }
}

fn tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    let start = trimmed
        .char_indices()
        .rev()
        .nth(499)
        .map(|(i, _)| i)
        .unwrap_or(0);
    trimmed[start..].to_string()
}

#[async_trait]
impl Analyzer for CommandAnalyzer {
    async fn analyze(&self, dump: &Path) -> Result<SdResult> {
        let mut output_path = dump.as_os_str().to_owned();
        output_path.push(".result.json");
        let output_path = PathBuf::from(output_path);

        log::debug!("[Analyzer] Running {} on {}", self.program, dump.display());
        let child = Command::new(&self.program)
            .args(self.arguments(dump, &output_path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| Error::UpstreamTimeout {
                service: format!("analyzer {}", self.program),
                timeout: self.timeout,
            })?
            .map_err(|e| Error::upstream("analyzer", format!("failed to start {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(Error::upstream(
                "analyzer",
                format!("{} exited with {}: {}", self.program, output.status, tail(&output.stderr)),
            ));
        }

        let json = if self.writes_output_file() {
            let data = tokio::fs::read(&output_path).await.map_err(|e| {
                Error::upstream(
                    "analyzer",
                    format!("no result at {}: {}", output_path.display(), e),
                )
            })?;
            if let Err(e) = tokio::fs::remove_file(&output_path).await {
                log::debug!("[Analyzer] Could not remove {}: {}", output_path.display(), e);
            }
            data
        } else {
            output.stdout
        };

        let value: serde_json::Value = serde_json::from_slice(&json)
            .map_err(|e| Error::upstream("analyzer", format!("invalid result JSON: {}", e)))?;
        Ok(SdResult::new(value))
    }

    fn name(&self) -> &str {
        &self.program
    }
}
