// src/lib.rs
//! Crash-dump bundle ingestion, analysis orchestration and search
//!
//! A request names a dump (or a bundle of dumps) by URL or local path. It is
//! validated, admitted as a bundle, and analyzed in the background; results
//! can then be fetched per dump and searched across the corpus.
//!
//! ```no_run
//! use std::sync::Arc;
//! use superdump::{AnalysisInput, AppContext, RequestHandler, Settings};
//!
//! # async fn run() -> superdump::Result<()> {
//! let ctx = Arc::new(AppContext::open(Settings::load_or_default("./data")?)?);
//! let handler = RequestHandler::new(ctx);
//! let outcome = handler.create_bundle(AnalysisInput::new("/tmp/crash.dmp")).await;
//! println!("{} {}", outcome.status_code(), outcome.body());
//! # Ok(())
//! # }
//! ```

pub mod bucket;
pub mod cache;
pub mod constants;
pub mod context;
pub mod error;
pub mod handler;
pub mod identifiers;
mod locks;
pub mod model;
pub mod pipeline;
pub mod repository;
pub mod results;
pub mod runtime;
pub mod search;
pub mod serialization;
pub mod settings;
pub mod storage;
pub mod validator;

#[cfg(feature = "server")]
pub mod server;

pub use bucket::{Histogram, Timestamped, bucketize};
pub use context::AppContext;
pub use error::{Error, Result};
pub use handler::{Outcome, RequestHandler};
pub use identifiers::{BundleIdentifier, DumpIdentifier};
pub use model::{
    AnalysisInput, BundleInfo, CustomProperties, DumpInfo, DumpStatus, DumpViewModel, ResultSummary,
    SdResult,
};
pub use repository::{AnalysisReporter, BundleRepository, DumpRepository, SuperDumpRepository};
pub use results::ResultStore;
pub use runtime::ServiceRuntime;
pub use search::{SearchMode, SearchService};
pub use settings::Settings;
pub use validator::{InputSource, SourceValidator};
