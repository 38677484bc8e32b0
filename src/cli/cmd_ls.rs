use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use superdump::{BundleInfo, DumpStatus};

use super::utils;

#[derive(Args)]
#[command(
    about = "List bundles (machine-readable)",
    after_help = "Examples:\n  \
            # List all bundles, newest first\n  \
            superdump ls\n\n  \
            # Last 10 bundles\n  \
            superdump ls -n 10\n\n  \
            # Custom columns as CSV\n  \
            superdump ls --format bundle,created,failed --separator \",\"\n\n  \
            # Scripting\n  \
            superdump ls --no-header | cut -f1        # Just bundle identifiers"
)]
pub struct LsCommand {
    /// Show only last N bundles (0 = all)
    #[arg(short = 'n', long, default_value = "0")]
    pub last: usize,

    /// Show oldest first (default: newest first)
    #[arg(long)]
    pub reverse: bool,

    /// Output format: bundle,created,filename,source,dumps,finished,failed,pending,error
    #[arg(long, default_value = "bundle,created,dumps,finished,failed,filename")]
    pub format: String,

    /// Omit header row
    #[arg(long)]
    pub no_header: bool,

    /// Field separator (default: tab)
    #[arg(long, default_value = "\t")]
    pub separator: String,
}

/// Dump status counts of one bundle
#[derive(Default)]
struct Counts {
    finished: usize,
    failed: usize,
    pending: usize,
}

pub fn run(cmd: LsCommand, dir: PathBuf) -> Result<()> {
    let rt = utils::create_runtime()?;
    rt.block_on(async move {
        let handler = utils::open_handler(&dir, None)?;
        let ctx = handler.context();

        // Sorted oldest first
        let bundles = ctx.bundles.all();
        if bundles.is_empty() {
            ctx.shutdown().await;
            return Ok(());
        }

        let display_bundles = if cmd.last > 0 && cmd.last < bundles.len() {
            bundles[bundles.len() - cmd.last..].to_vec()
        } else {
            bundles
        };
        let display_bundles: Vec<BundleInfo> = if cmd.reverse {
            display_bundles
        } else {
            display_bundles.into_iter().rev().collect()
        };

        let fields = parse_format_string(&cmd.format);
        if !cmd.no_header {
            println!("{}", fields.join(&cmd.separator));
        }

        for bundle in &display_bundles {
            let mut counts = Counts::default();
            for dump in ctx.dumps.by_bundle(&bundle.id)? {
                match dump.status {
                    DumpStatus::Finished => counts.finished += 1,
                    DumpStatus::Failed => counts.failed += 1,
                    DumpStatus::Created | DumpStatus::Analyzing => counts.pending += 1,
                }
            }
            let values: Vec<String> = fields
                .iter()
                .map(|f| get_field_value(bundle, &counts, f))
                .collect();
            println!("{}", values.join(&cmd.separator));
        }

        ctx.shutdown().await;
        Ok(())
    })
}

fn parse_format_string(format: &str) -> Vec<String> {
    format
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn get_field_value(bundle: &BundleInfo, counts: &Counts, field: &str) -> String {
    match field {
        "bundle" => bundle.id.to_string(),
        "created" => bundle.created.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        "filename" => bundle.filename.clone(),
        "source" => bundle.source_url.clone(),
        "dumps" => bundle.dump_ids.len().to_string(),
        "finished" => counts.finished.to_string(),
        "failed" => counts.failed.to_string(),
        "pending" => counts.pending.to_string(),
        "error" => bundle.error.clone().unwrap_or_default(),
        _ => String::new(),
    }
}
