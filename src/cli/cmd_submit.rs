use anyhow::Result;
use clap::{Args, ValueHint};
use std::path::PathBuf;
use std::time::Duration;
use superdump::{AnalysisInput, BundleIdentifier, Outcome};

use super::utils;

#[derive(Args)]
#[command(
    about = "Admit a dump by URL or path and analyze it",
    long_about = "Validate a dump source, admit it as a new bundle and run the configured
analyzer on every dump it contains. The command waits until all dumps of the
bundle reached a terminal state and prints the bundle with its dumps.

Symbol and debug files (.pdb, .sym, ...) are rejected because they never
produce a bundle.",
    help_template = crate::clap_help!(
        examples: "  # Analyze a local dump\n  \
                   {bin} submit ./crash.dmp\n\n  \
                   # Remote dump with custom properties\n  \
                   {bin} submit https://example.com/crash.dmp --property ticket=1234\n\n  \
                   # Override the derived file name\n  \
                   {bin} submit https://example.com/download?id=7 --filename app.dmp"
    )
)]
pub struct SubmitCommand {
    /// Dump URL (http, https, file) or local path
    #[arg(value_hint = ValueHint::AnyPath)]
    pub url: String,

    /// File name to record instead of the one derived from the source
    #[arg(long)]
    pub filename: Option<String>,

    /// Custom property attached to the bundle and its dumps
    #[arg(short, long = "property", value_name = "KEY=VALUE", value_parser = utils::parse_property)]
    pub properties: Vec<(String, String)>,

    /// Seconds between progress checks
    #[arg(long, default_value = "1")]
    pub poll: u64,
}

pub fn run(cmd: SubmitCommand, dir: PathBuf, quiet: bool) -> Result<()> {
    let rt = utils::create_runtime()?;
    rt.block_on(async move {
        let handler = utils::open_handler(&dir, None)?;

        let mut input = AnalysisInput::new(cmd.url);
        if let Some(filename) = cmd.filename {
            input = input.with_filename(filename);
        }
        for (key, value) in cmd.properties {
            input = input.with_property(key, value);
        }

        let bundle_id = match handler.create_bundle(input).await {
            Outcome::Created { bundle_id, location } => {
                if !quiet {
                    eprintln!("Admitted bundle {} ({})", bundle_id, location);
                }
                bundle_id
            }
            other => return utils::print_outcome(other),
        };

        wait_for_bundle(&handler, &bundle_id, Duration::from_secs(cmd.poll.max(1))).await?;
        let outcome = handler.get_bundle(bundle_id.as_str());
        handler.context().shutdown().await;
        utils::print_outcome(outcome)
    })
}

async fn wait_for_bundle(
    handler: &superdump::RequestHandler,
    bundle_id: &BundleIdentifier,
    poll: Duration,
) -> Result<()> {
    let superdump = &handler.context().superdump;
    loop {
        if superdump.is_bundle_terminal(bundle_id)? {
            return Ok(());
        }
        log::debug!(
            "[Submit] Bundle {} still running, {} jobs pending",
            bundle_id,
            handler.context().pipeline.pending()
        );
        tokio::time::sleep(poll).await;
    }
}
