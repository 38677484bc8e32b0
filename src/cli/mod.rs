use anyhow::Result;
use clap::{Parser, Subcommand, ValueHint};
use std::path::PathBuf;

// CLI Commands (cmd_ prefix)
mod cmd_heatmap;
mod cmd_ls;
mod cmd_result;
mod cmd_search;
mod cmd_server;
mod cmd_status;
mod cmd_submit;

// Helper modules (no cmd_ prefix)
mod logger;
mod utils;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Format custom help template with grouped commands
fn format_help_template() -> &'static str {
    concat!(
        "{about-with-newline}\n\n",
        "{usage-heading}\n  {usage}\n\n",
        "Options:\n{options}\n\n",
        "Ingestion:\n",
        "  submit    Admit a dump by URL or path and analyze it\n",
        "  result    Print the analysis result of one dump\n",
        "\n",
        "Inspection:\n",
        "  status    Show data directory status\n",
        "  ls        List bundles (machine-readable)\n",
        "  search    Search dumps (simple, query or duplicates)\n",
        "  heatmap   Histogram of matching dumps over time\n",
        "\n",
        "Server:\n",
        "  server    Start HTTP server\n",
        "\n",
        "See 'superdump <COMMAND> --help' for more information on a specific command.\n"
    )
}

#[derive(Parser)]
#[command(bin_name = "superdump")]
#[command(version = VERSION)]
#[command(about = concat!("superdump v", env!("CARGO_PKG_VERSION"), " - Crash dump analysis service"))]
#[command(long_about = concat!(
    "superdump v", env!("CARGO_PKG_VERSION"), " - Crash dump analysis service\n\n",
    "Admits crash dumps by URL or local path, groups them into bundles,\n",
    "runs an external analyzer on each dump and makes the results\n",
    "searchable by free text, structured query or duplicate fingerprint."
))]
#[command(author)]
#[command(propagate_version = true)]
#[command(help_template = format_help_template())]
pub struct Cli {
    /// Data directory
    #[arg(short = 'C', long = "dir", global = true, default_value = ".", value_hint = ValueHint::DirPath)]
    dir: PathBuf,

    /// Only print errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Enable verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Submit(cmd_submit::SubmitCommand),
    Result(cmd_result::ResultCommand),
    Status(cmd_status::StatusCommand),
    Ls(cmd_ls::LsCommand),
    Search(cmd_search::SearchCommand),
    Heatmap(cmd_heatmap::HeatmapCommand),
    Server(cmd_server::ServerCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    logger::init_logger(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Submit(cmd) => cmd_submit::run(cmd, cli.dir, cli.quiet)?,
        Commands::Result(cmd) => cmd_result::run(cmd, cli.dir)?,
        Commands::Status(cmd) => cmd_status::run(cmd, cli.dir)?,
        Commands::Ls(cmd) => cmd_ls::run(cmd, cli.dir)?,
        Commands::Search(cmd) => cmd_search::run(cmd, cli.dir)?,
        Commands::Heatmap(cmd) => cmd_heatmap::run(cmd, cli.dir)?,
        Commands::Server(cmd) => cmd_server::run(cmd, cli.dir, cli.verbose)?,
    }

    Ok(())
}

/// Macro to create clap help templates with examples
/// This works around the limitation that {bin} doesn't work in after_help
#[macro_export]
macro_rules! clap_help {
    (examples: $examples:literal) => {{
        const BIN: &str = env!("CARGO_PKG_NAME");
        concat!(
            "{about-with-newline}\n",
            "{usage-heading} {usage}\n\n",
            "{all-args}\n\n",
            "Examples:\n",
            $examples
        )
        .replace("{bin}", BIN)
    }};
}
