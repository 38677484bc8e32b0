use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use super::utils;

#[derive(Args)]
#[command(
    about = "Search dumps (simple, query or duplicates)",
    long_about = "Search the dump corpus.

  simple      every whitespace-separated token must appear in one of the
              dump's fields (identifiers, file names, status, properties,
              last event); no text lists every dump
  query       JMESPath expression evaluated per dump, or an Elasticsearch
              query_string when an Elasticsearch URL is configured
  duplicates  dumps sharing the fingerprint of BUNDLE:DUMP",
    alias = "q",
    help_template = crate::clap_help!(
        examples: "  # Free text\n  \
                   {bin} search 'access violation'\n\n  \
                   # Structured query\n  \
                   {bin} search --mode query \"dump.status == 'Failed'\"\n\n  \
                   # Duplicates of one dump, with full results\n  \
                   {bin} search --mode duplicates 3f9a0c1b2d4e:77aa01bc --details"
    )
)]
pub struct SearchCommand {
    /// Search text, query expression or dump identifier
    pub query: Option<String>,

    /// Search mode: simple, query, duplicates
    #[arg(short, long, default_value = "simple")]
    pub mode: String,

    /// Attach the full analysis result of finished dumps
    #[arg(long)]
    pub details: bool,

    /// Print only the dump identifiers
    #[arg(long, conflicts_with = "details")]
    pub ids: bool,
}

pub fn run(cmd: SearchCommand, dir: PathBuf) -> Result<()> {
    let rt = utils::create_runtime()?;
    rt.block_on(async move {
        let handler = utils::open_handler(&dir, None)?;
        let outcome = handler
            .search(cmd.query.as_deref(), Some(&cmd.mode), cmd.details)
            .await;
        handler.context().shutdown().await;

        if cmd.ids
            && let superdump::Outcome::Ok(serde_json::Value::Array(views)) = &outcome
        {
            for view in views {
                let id = &view["dump"]["id"];
                if let (Some(bundle), Some(dump)) = (id["bundleId"].as_str(), id["dumpId"].as_str()) {
                    println!("{}:{}", bundle, dump);
                }
            }
            return Ok(());
        }
        utils::print_outcome(outcome)
    })
}
