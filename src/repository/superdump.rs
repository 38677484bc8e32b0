// Admission of analysis requests
use super::{BundleRepository, DumpRepository};
use crate::cache::ResultCache;
use crate::constants;
use crate::error::{Error, Result};
use crate::identifiers::{BundleIdentifier, DumpIdentifier};
use crate::model::{AnalysisInput, DumpStatus};
use crate::pipeline::{AnalysisJob, AnalysisPipeline};
use crate::validator::InputSource;
use std::path::Path;
use std::sync::Arc;

/// True when the file name denotes symbol or debug data rather than a dump
pub fn is_auxiliary_file(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            constants::AUXILIARY_EXTENSIONS
                .iter()
                .any(|aux| aux.eq_ignore_ascii_case(ext))
        })
}

/// Admits analysis requests and hands them to the pipeline
pub struct SuperDumpRepository {
    bundles: Arc<BundleRepository>,
    dumps: Arc<DumpRepository>,
    pipeline: Arc<dyn AnalysisPipeline>,
    cache: Arc<ResultCache>,
    use_automatic_dump_deletion: bool,
}

impl SuperDumpRepository {
    pub fn new(
        bundles: Arc<BundleRepository>,
        dumps: Arc<DumpRepository>,
        pipeline: Arc<dyn AnalysisPipeline>,
        cache: Arc<ResultCache>,
        use_automatic_dump_deletion: bool,
    ) -> Self {
        Self {
            bundles,
            dumps,
            pipeline,
            cache,
            use_automatic_dump_deletion,
        }
    }

    /// Create a bundle for `request` and schedule its analysis.
    ///
    /// Returns as soon as the bundle is persisted and the job is queued; the
    /// bundle can be looked up immediately. Auxiliary-only input yields
    /// `NoBundleProduced` and allocates nothing. If the job cannot be queued
    /// the bundle is removed again.
    pub fn process_input_file(
        &self,
        filename: &str,
        request: &AnalysisInput,
    ) -> Result<BundleIdentifier> {
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(Error::InvalidArgument("file name must not be empty".to_string()));
        }
        if is_auxiliary_file(filename) {
            return Err(Error::NoBundleProduced {
                reason: format!("{} contains symbol/debug data only", filename),
            });
        }
        let source = InputSource::parse(&request.url)?;

        let bundle = self
            .bundles
            .create(&request.url, filename, request.custom_properties.clone())?;
        let job = AnalysisJob::Bundle {
            bundle_id: bundle.id.clone(),
            source,
            filename: filename.to_string(),
        };

        if let Err(e) = self.pipeline.schedule(job) {
            log::warn!("[Admission] Scheduling bundle {} failed: {}", bundle.id, e);
            if let Err(cleanup) = self.bundles.remove(&bundle.id) {
                log::warn!("[Admission] Could not roll back bundle {}: {}", bundle.id, cleanup);
            }
            return Err(e);
        }

        log::info!(
            "[Admission] Bundle {} admitted from {} ({})",
            bundle.id,
            request.url,
            filename
        );
        Ok(bundle.id)
    }

    /// Analyze a terminal dump again from its retained file.
    ///
    /// The status check and the reset to `Created` happen under the dump's
    /// lock, so concurrent reruns of one dump schedule a single job.
    pub fn rerun(&self, id: &DumpIdentifier) -> Result<()> {
        if !self.bundles.contains(&id.bundle_id) {
            return Err(Error::not_found(format!("bundle {}", id.bundle_id)));
        }
        let mut previous = None;
        let reset = self.dumps.try_update(id, |dump| {
            if !dump.is_terminal() {
                return Err(Error::NotReady {
                    id: id.clone(),
                    status: dump.status,
                });
            }
            if dump.file_path.is_none() {
                return Err(Error::InvalidArgument(format!(
                    "dump {} has no retained file to analyze",
                    id
                )));
            }
            previous = Some(dump.clone());
            dump.status = DumpStatus::Created;
            dump.error = None;
            dump.finished = None;
            Ok(())
        })?;
        self.cache.remove(id);

        let Some(file_path) = reset.file_path else {
            return Err(Error::InvalidArgument(format!(
                "dump {} has no retained file to analyze",
                id
            )));
        };
        let job = AnalysisJob::Rerun {
            dump_id: id.clone(),
            file_path,
        };
        if let Err(e) = self.pipeline.schedule(job) {
            if let Some(restored) = previous {
                self.dumps.update(id, move |dump| *dump = restored)?;
            }
            return Err(e);
        }
        log::info!("[Admission] Dump {} scheduled for rerun", id);
        Ok(())
    }

    /// True once every dump of the bundle is Finished or Failed.
    /// A bundle that recorded an error without dumps is terminal as well.
    pub fn is_bundle_terminal(&self, id: &BundleIdentifier) -> Result<bool> {
        let bundle = self
            .bundles
            .get(id)
            .ok_or_else(|| Error::not_found(format!("bundle {}", id)))?;
        if bundle.dump_ids.is_empty() {
            return Ok(bundle.error.is_some());
        }
        Ok(self.dumps.by_bundle(id)?.iter().all(|d| d.is_terminal()))
    }

    /// Read by the external retention job
    pub fn use_automatic_dump_deletion(&self) -> bool {
        self.use_automatic_dump_deletion
    }

    pub fn bundles(&self) -> &Arc<BundleRepository> {
        &self.bundles
    }

    pub fn dumps(&self) -> &Arc<DumpRepository> {
        &self.dumps
    }
}
