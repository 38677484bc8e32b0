// Result retrieval for single dumps
use crate::cache::ResultCache;
use crate::error::{Error, Result};
use crate::identifiers::DumpIdentifier;
use crate::model::{DumpStatus, SdResult};
use crate::repository::{BundleRepository, DumpRepository};
use crate::storage::MetadataStore;
use std::sync::Arc;

/// Reads analysis results, gated on the dump's status
pub struct ResultStore {
    bundles: Arc<BundleRepository>,
    dumps: Arc<DumpRepository>,
    store: Arc<dyn MetadataStore>,
    cache: Arc<ResultCache>,
}

impl ResultStore {
    pub fn new(
        bundles: Arc<BundleRepository>,
        dumps: Arc<DumpRepository>,
        store: Arc<dyn MetadataStore>,
        cache: Arc<ResultCache>,
    ) -> Self {
        Self {
            bundles,
            dumps,
            store,
            cache,
        }
    }

    /// Result of a finished dump.
    ///
    /// Unknown bundle or dump gives `NotFound`, a dump still in flight gives
    /// `NotReady` and a failed analysis gives `AnalysisFailed`. Repeated calls
    /// for the same finished dump return the same value.
    pub async fn get_result(&self, id: &DumpIdentifier) -> Result<Arc<SdResult>> {
        if !self.bundles.contains(&id.bundle_id) {
            return Err(Error::not_found(format!("bundle {}", id.bundle_id)));
        }
        let dump = self
            .dumps
            .get(id)
            .ok_or_else(|| Error::not_found(format!("dump {}", id)))?;

        match dump.status {
            DumpStatus::Finished => {}
            DumpStatus::Failed => {
                return Err(Error::AnalysisFailed {
                    id: id.clone(),
                    reason: dump.error.unwrap_or_else(|| "unknown error".to_string()),
                });
            }
            status => {
                return Err(Error::NotReady {
                    id: id.clone(),
                    status,
                });
            }
        }

        if let Some(cached) = self.cache.get(id) {
            return Ok(cached);
        }

        let store = Arc::clone(&self.store);
        let key = id.clone();
        let loaded = tokio::task::spawn_blocking(move || store.load_result(&key)).await??;
        let result = Arc::new(
            loaded.ok_or_else(|| Error::not_found(format!("result of dump {}", id)))?,
        );
        self.cache.insert(id.clone(), Arc::clone(&result));
        Ok(result)
    }

    /// Results for several dumps at once; dumps without a result are skipped
    pub async fn get_finished_results(
        &self,
        ids: &[DumpIdentifier],
    ) -> Vec<(DumpIdentifier, Arc<SdResult>)> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_result(id).await {
                Ok(result) => out.push((id.clone(), result)),
                Err(e) => log::debug!("[Results] No result for {}: {}", id, e),
            }
        }
        out
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }
}
