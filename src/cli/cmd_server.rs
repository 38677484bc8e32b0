// Server command - start HTTP server
use anyhow::Result;
use clap::{Args, ValueHint};
use std::path::PathBuf;

#[cfg(feature = "server")]
use superdump::server::{StartupConfig, start_server};

#[derive(Args)]
#[command(
    about = "Start HTTP server",
    long_about = "Start an HTTP server exposing bundle admission, dump results, search and
activity heatmaps over a JSON API.

Submitted dumps are analyzed in the background by the analyzer command, either
taken from superdump.json in the data directory or given with --analyzer. Without
an analyzer command the server still answers queries but refuses new bundles.

Structured queries run against Elasticsearch when --elastic-url (or the
settings file) names a cluster, and against an in-process JMESPath index
otherwise.",
    help_template = crate::clap_help!(
        examples: "  # Start server on default port (8080)\n  \
                   {bin} server\n\n  \
                   # Custom host and port\n  \
                   {bin} server --host 0.0.0.0 --port 3000\n\n  \
                   # Analyze with an external tool writing JSON to {output}\n  \
                   {bin} server --analyzer 'dumpanalyzer --in {dump} --out {output}'\n\n  \
                   # Index results in Elasticsearch\n  \
                   {bin} server --elastic-url http://localhost:9200"
    )
)]
pub struct ServerCommand {
    /// HTTP server port
    #[arg(long, default_value_t = superdump::constants::DEFAULT_PORT, help_heading = "Server Options")]
    pub port: u16,

    /// HTTP server host
    #[arg(long, default_value = superdump::constants::DEFAULT_HOST, help_heading = "Server Options")]
    pub host: String,

    /// Disable permissive CORS headers
    #[arg(long, help_heading = "Server Options")]
    pub no_cors: bool,

    /// Analyzer command line; {dump} and {output} are substituted per dump
    #[arg(long, help_heading = "Analysis Options")]
    pub analyzer: Option<String>,

    /// Elasticsearch base URL for structured queries
    #[arg(long, help_heading = "Search Options", value_hint = ValueHint::Url)]
    pub elastic_url: Option<String>,
}

pub fn run(cmd: ServerCommand, dir: PathBuf, global_verbose: bool) -> Result<()> {
    #[cfg(not(feature = "server"))]
    {
        let _ = (cmd, dir, global_verbose);
        anyhow::bail!("Server feature is not enabled. Rebuild with --features server");
    }

    #[cfg(feature = "server")]
    {
        run_server(cmd, dir, global_verbose)
    }
}

#[cfg(feature = "server")]
fn run_server(cmd: ServerCommand, dir: PathBuf, global_verbose: bool) -> Result<()> {
    let rt = super::utils::create_runtime()?;

    let analyzer_command = cmd
        .analyzer
        .as_deref()
        .map(split_command)
        .transpose()?;

    let startup_config = StartupConfig {
        dir,
        host: cmd.host,
        port: cmd.port,
        analyzer_command,
        elastic_url: cmd.elastic_url,
        enable_cors: !cmd.no_cors,
        verbose: global_verbose,
    };

    rt.block_on(start_server(startup_config))
}

/// Whitespace split; arguments containing spaces belong in superdump.json
#[cfg(feature = "server")]
fn split_command(text: &str) -> Result<Vec<String>> {
    let parts: Vec<String> = text.split_whitespace().map(str::to_string).collect();
    if parts.is_empty() {
        anyhow::bail!("--analyzer must not be empty");
    }
    Ok(parts)
}
