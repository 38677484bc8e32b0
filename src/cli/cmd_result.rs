use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use super::utils;

#[derive(Args)]
#[command(
    about = "Print the analysis result of one dump",
    help_template = crate::clap_help!(
        examples: "  # Full result document\n  \
                   {bin} result 3f9a0c1b2d4e 77aa01bc\n\n  \
                   # Dump metadata only\n  \
                   {bin} result 3f9a0c1b2d4e 77aa01bc --info"
    )
)]
pub struct ResultCommand {
    /// Bundle identifier
    pub bundle: String,

    /// Dump identifier within the bundle
    pub dump: String,

    /// Print the dump record instead of the result document
    #[arg(long)]
    pub info: bool,
}

pub fn run(cmd: ResultCommand, dir: PathBuf) -> Result<()> {
    let rt = utils::create_runtime()?;
    rt.block_on(async move {
        let handler = utils::open_handler(&dir, None)?;
        let outcome = if cmd.info {
            handler.get_dump(&cmd.bundle, &cmd.dump)
        } else {
            handler.get_result(&cmd.bundle, &cmd.dump).await
        };
        handler.context().shutdown().await;
        utils::print_outcome(outcome)
    })
}
