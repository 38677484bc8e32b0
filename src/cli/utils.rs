// Shared utility functions for CLI commands

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use superdump::{AppContext, Outcome, RequestHandler, Settings};
use tokio::runtime::Runtime;

pub fn create_runtime() -> Result<Runtime> {
    Runtime::new().context("Failed to create tokio runtime")
}

/// Open the data directory. Must be called inside the tokio runtime because
/// the analysis queue spawns its dispatcher.
pub fn open_handler(dir: &Path, settings: Option<Settings>) -> Result<RequestHandler> {
    let settings = match settings {
        Some(settings) => settings,
        None => Settings::load_or_default(dir)
            .with_context(|| format!("Failed to load settings from {}", display_path(dir).display()))?,
    };
    let ctx = AppContext::open(settings)
        .with_context(|| format!("Failed to open {}", display_path(dir).display()))?;
    Ok(RequestHandler::new(Arc::new(ctx)))
}

/// Print a successful outcome as pretty JSON, turn anything else into an error
pub fn print_outcome(outcome: Outcome) -> Result<()> {
    if outcome.is_success() {
        println!("{}", serde_json::to_string_pretty(&outcome.body())?);
        return Ok(());
    }
    match outcome {
        Outcome::Pending(reason) => anyhow::bail!("not ready: {}", reason),
        Outcome::BadRequest(reason)
        | Outcome::NotFound(reason)
        | Outcome::Unprocessable(reason)
        | Outcome::Timeout(reason)
        | Outcome::Unavailable(reason)
        | Outcome::Internal(reason) => anyhow::bail!("{}", reason),
        Outcome::Created { .. } | Outcome::Ok(_) => Ok(()),
    }
}

/// Parse `key=value` pairs given with `--property`
pub fn parse_property(text: &str) -> Result<(String, String), String> {
    match text.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", text)),
    }
}

/// Display path resolving "." to absolute path
pub fn display_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_property() {
        assert_eq!(
            parse_property("env=prod").unwrap(),
            ("env".to_string(), "prod".to_string())
        );
        assert_eq!(
            parse_property("url=a=b").unwrap(),
            ("url".to_string(), "a=b".to_string())
        );
        assert!(parse_property("novalue").is_err());
        assert!(parse_property("=x").is_err());
    }
}
