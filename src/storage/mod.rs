//! Persistence contract required by the repositories
//!
//! The repositories keep their working set in memory and write through to a
//! [`MetadataStore`]. Two stores ship with the crate: [`FilesystemStore`]
//! (one directory per bundle and per dump) and [`MemoryStore`].

mod fs;
mod memory;

pub use fs::FilesystemStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::identifiers::{BundleIdentifier, DumpIdentifier};
use crate::model::{BundleInfo, DumpInfo, SdResult};

/// Blocking storage operations; async callers use `spawn_blocking`
pub trait MetadataStore: Send + Sync {
    fn load_bundles(&self) -> Result<Vec<BundleInfo>>;

    fn load_dumps(&self, bundle_id: &BundleIdentifier) -> Result<Vec<DumpInfo>>;

    fn save_bundle(&self, bundle: &BundleInfo) -> Result<()>;

    /// Remove a bundle and everything below it
    fn delete_bundle(&self, bundle_id: &BundleIdentifier) -> Result<()>;

    fn save_dump(&self, dump: &DumpInfo) -> Result<()>;

    fn save_result(&self, id: &DumpIdentifier, result: &SdResult) -> Result<()>;

    /// `Ok(None)` when no result was stored for the dump
    fn load_result(&self, id: &DumpIdentifier) -> Result<Option<SdResult>>;

    /// Short description for status output
    fn describe(&self) -> String;
}
