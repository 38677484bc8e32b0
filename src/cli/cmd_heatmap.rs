use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use superdump::handler::HeatmapRequest;

use super::utils;

#[derive(Args)]
#[command(
    about = "Histogram of matching dumps over time",
    long_about = "Count dumps created per time bucket. Bucket keys are Unix seconds of the
bucket start; empty buckets are omitted. Times accept Unix seconds or RFC 3339.
Without --start/--stop the last year up to now is covered.",
    help_template = crate::clap_help!(
        examples: "  # Hourly activity of all dumps\n  \
                   {bin} heatmap\n\n  \
                   # Daily activity of failed dumps in January\n  \
                   {bin} heatmap Failed --bucket 86400 --start 2021-01-01T00:00:00Z --stop 2021-02-01T00:00:00Z"
    )
)]
pub struct HeatmapCommand {
    /// Search text restricting the counted dumps
    pub query: Option<String>,

    /// Search mode: simple, query
    #[arg(short, long)]
    pub mode: Option<String>,

    /// Bucket width in seconds
    #[arg(long)]
    pub bucket: Option<u32>,

    /// Range start (inclusive)
    #[arg(long)]
    pub start: Option<String>,

    /// Range stop (inclusive)
    #[arg(long)]
    pub stop: Option<String>,
}

pub fn run(cmd: HeatmapCommand, dir: PathBuf) -> Result<()> {
    let rt = utils::create_runtime()?;
    rt.block_on(async move {
        let handler = utils::open_handler(&dir, None)?;
        let request = HeatmapRequest {
            query: cmd.query,
            mode: cmd.mode,
            bucket_seconds: cmd.bucket,
            start: cmd.start,
            stop: cmd.stop,
        };
        let outcome = handler.heatmap(&request).await;
        handler.context().shutdown().await;
        utils::print_outcome(outcome)
    })
}
