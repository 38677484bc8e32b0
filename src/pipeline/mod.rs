//! Background analysis
//!
//! Admission hands an [`AnalysisJob`] to an [`AnalysisPipeline`] and returns.
//! The built-in pipeline, [`AnalysisQueue`], fetches the bundle source,
//! asks an [`Analyzer`] which dumps it contains, registers them and analyzes
//! each one, writing state back through
//! [`AnalysisReporter`](crate::repository::AnalysisReporter).

mod analyzer;
mod queue;

pub use analyzer::{Analyzer, CommandAnalyzer};
pub use queue::{AnalysisQueue, QueueConfig};

use crate::error::{Error, Result};
use crate::identifiers::{BundleIdentifier, DumpIdentifier};
use crate::validator::InputSource;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisJob {
    /// Fetch a freshly admitted bundle and analyze every dump found in it
    Bundle {
        bundle_id: BundleIdentifier,
        source: InputSource,
        filename: String,
    },
    /// Analyze an already registered dump again
    Rerun {
        dump_id: DumpIdentifier,
        file_path: PathBuf,
    },
}

impl fmt::Display for AnalysisJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisJob::Bundle {
                bundle_id, source, ..
            } => write!(f, "bundle {} from {}", bundle_id, source),
            AnalysisJob::Rerun { dump_id, .. } => write!(f, "rerun of {}", dump_id),
        }
    }
}

/// Accepts jobs without waiting for them to run
pub trait AnalysisPipeline: Send + Sync {
    /// Enqueue `job`; fails synchronously when the job cannot be accepted
    fn schedule(&self, job: AnalysisJob) -> Result<()>;

    fn describe(&self) -> String;

    /// Jobs accepted but not yet started
    fn pending(&self) -> usize {
        0
    }
}

/// Used when no analyzer is configured; refuses every job
pub struct DisabledPipeline;

impl AnalysisPipeline for DisabledPipeline {
    fn schedule(&self, job: AnalysisJob) -> Result<()> {
        Err(Error::upstream(
            "analysis pipeline",
            format!("no analyzer configured, cannot run {}", job),
        ))
    }

    fn describe(&self) -> String {
        "disabled (no analyzer configured)".to_string()
    }
}
