// Write-back path used by the analysis pipeline
use super::{BundleRepository, DumpRepository};
use crate::cache::ResultCache;
use crate::error::{Error, Result};
use crate::identifiers::{BundleIdentifier, DumpIdentifier};
use crate::model::{DumpInfo, DumpStatus, DumpViewModel, SdResult};
use crate::search::QueryIndex;
use crate::storage::MetadataStore;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;

/// The only writer of dump status transitions.
///
/// Status moves `Created -> Analyzing -> Finished | Failed`. A result is
/// stored before its dump is marked `Finished`, so readers that observe the
/// status always find the result.
pub struct AnalysisReporter {
    bundles: Arc<BundleRepository>,
    dumps: Arc<DumpRepository>,
    store: Arc<dyn MetadataStore>,
    cache: Arc<ResultCache>,
    index: Option<Arc<dyn QueryIndex>>,
}

impl AnalysisReporter {
    pub fn new(
        bundles: Arc<BundleRepository>,
        dumps: Arc<DumpRepository>,
        store: Arc<dyn MetadataStore>,
        cache: Arc<ResultCache>,
        index: Option<Arc<dyn QueryIndex>>,
    ) -> Self {
        Self {
            bundles,
            dumps,
            store,
            cache,
            index,
        }
    }

    /// Record a dump discovered inside a bundle
    pub fn register_dump(
        &self,
        bundle_id: &BundleIdentifier,
        filename: &str,
        file_path: Option<PathBuf>,
    ) -> Result<DumpIdentifier> {
        let dump = self.dumps.create(bundle_id, filename, file_path)?;
        log::info!("[Analysis] Registered dump {} ({})", dump.id, filename);
        Ok(dump.id)
    }

    pub fn mark_analyzing(&self, id: &DumpIdentifier) -> Result<DumpInfo> {
        self.dumps.update(id, |dump| {
            dump.status = DumpStatus::Analyzing;
            dump.error = None;
            dump.finished = None;
        })
    }

    pub fn complete(&self, id: &DumpIdentifier, result: &SdResult) -> Result<DumpInfo> {
        self.store.save_result(id, result)?;
        self.cache.remove(id);
        let summary = result.summary();
        let dump = self.dumps.update(id, |dump| {
            dump.status = DumpStatus::Finished;
            dump.summary = Some(summary);
            dump.error = None;
            dump.finished = Some(Utc::now());
        })?;
        log::info!("[Analysis] Dump {} finished", id);
        Ok(dump)
    }

    pub fn fail(&self, id: &DumpIdentifier, reason: &str) -> Result<DumpInfo> {
        self.cache.remove(id);
        let dump = self.dumps.update(id, |dump| {
            dump.status = DumpStatus::Failed;
            dump.error = Some(reason.to_string());
            dump.finished = Some(Utc::now());
        })?;
        log::warn!("[Analysis] Dump {} failed: {}", id, reason);
        Ok(dump)
    }

    /// The bundle could not be fetched or unpacked; no dump was registered
    pub fn fail_bundle(&self, bundle_id: &BundleIdentifier, reason: &str) -> Result<()> {
        self.bundles.set_error(bundle_id, reason)?;
        log::warn!("[Analysis] Bundle {} failed: {}", bundle_id, reason);
        Ok(())
    }

    /// Push the current state of a dump to the query index, if one is configured
    pub async fn publish(&self, id: &DumpIdentifier) -> Result<()> {
        let Some(index) = &self.index else {
            return Ok(());
        };
        let bundle = self
            .bundles
            .get(&id.bundle_id)
            .ok_or_else(|| Error::not_found(format!("bundle {}", id.bundle_id)))?;
        let dump = self
            .dumps
            .get(id)
            .ok_or_else(|| Error::not_found(format!("dump {}", id)))?;
        index.index(&DumpViewModel::new(&bundle, dump)).await
    }
}
