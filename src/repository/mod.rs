//! Bundle and dump repositories
//!
//! [`BundleRepository`] and [`DumpRepository`] own the metadata records.
//! [`SuperDumpRepository`] admits new requests, [`AnalysisReporter`] is the
//! pipeline's write-back path. Neither holds the other, so the pipeline can
//! be built between them.

mod bundle;
mod dump;
mod reporter;
mod superdump;

pub use bundle::BundleRepository;
pub use dump::DumpRepository;
pub use reporter::AnalysisReporter;
pub use superdump::{SuperDumpRepository, is_auxiliary_file};
