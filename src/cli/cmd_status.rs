use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use superdump::DumpStatus;

use super::utils;

#[derive(Parser)]
#[command(
    about = "Show data directory status",
    long_about = "Display bundle and dump counts per analysis state, the configured analyzer
and query index, and the retention flag read by the external cleanup job.",
    alias = "info",
    help_template = crate::clap_help!(
        examples: "  # Show status\n  \
                   {bin} status\n\n  \
                   # JSON output for scripting\n  \
                   {bin} status --json"
    )
)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(cmd: StatusCommand, dir: PathBuf) -> Result<()> {
    let rt = utils::create_runtime()?;
    rt.block_on(async move {
        let handler = utils::open_handler(&dir, None)?;
        let ctx = handler.context();

        if cmd.json {
            let outcome = handler.status();
            ctx.shutdown().await;
            return utils::print_outcome(outcome);
        }

        let dumps = ctx.dumps.all();
        let count = |status: DumpStatus| dumps.iter().filter(|d| d.status == status).count();

        println!("Directory:   {}", utils::display_path(&ctx.settings.data_dir).display());
        println!("Store:       {}", ctx.store.describe());
        println!("Pipeline:    {}", ctx.pipeline.describe());
        println!(
            "Query index: {}",
            ctx.search.query_index_name().unwrap_or("none")
        );
        println!();
        println!("Bundles:     {}", ctx.bundles.len());
        println!("Dumps:       {}", dumps.len());
        println!("  created    {}", count(DumpStatus::Created));
        println!("  analyzing  {}", count(DumpStatus::Analyzing));
        println!("  finished   {}", count(DumpStatus::Finished));
        println!("  failed     {}", count(DumpStatus::Failed));
        println!();
        if ctx.settings.use_automatic_dump_deletion {
            println!(
                "Retention:   dumps deleted after {} days",
                ctx.settings.dump_retention_days
            );
        } else {
            println!("Retention:   disabled");
        }

        ctx.shutdown().await;
        Ok(())
    })
}
