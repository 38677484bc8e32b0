// In-memory store, used for ephemeral servers and tests
use super::MetadataStore;
use crate::error::Result;
use crate::identifiers::{BundleIdentifier, DumpIdentifier};
use crate::locks;
use crate::model::{BundleInfo, DumpInfo, SdResult};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    bundles: RwLock<HashMap<BundleIdentifier, BundleInfo>>,
    dumps: RwLock<HashMap<DumpIdentifier, DumpInfo>>,
    results: RwLock<HashMap<DumpIdentifier, SdResult>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryStore {
    fn load_bundles(&self) -> Result<Vec<BundleInfo>> {
        let mut bundles: Vec<BundleInfo> = locks::read(&self.bundles).values().cloned().collect();
        bundles.sort_by_key(|b| b.created);
        Ok(bundles)
    }

    fn load_dumps(&self, bundle_id: &BundleIdentifier) -> Result<Vec<DumpInfo>> {
        let mut dumps: Vec<DumpInfo> = locks::read(&self.dumps)
            .values()
            .filter(|d| &d.id.bundle_id == bundle_id)
            .cloned()
            .collect();
        dumps.sort_by_key(|d| d.created);
        Ok(dumps)
    }

    fn save_bundle(&self, bundle: &BundleInfo) -> Result<()> {
        locks::write(&self.bundles).insert(bundle.id.clone(), bundle.clone());
        Ok(())
    }

    fn delete_bundle(&self, bundle_id: &BundleIdentifier) -> Result<()> {
        locks::write(&self.bundles).remove(bundle_id);
        locks::write(&self.dumps).retain(|id, _| &id.bundle_id != bundle_id);
        locks::write(&self.results).retain(|id, _| &id.bundle_id != bundle_id);
        Ok(())
    }

    fn save_dump(&self, dump: &DumpInfo) -> Result<()> {
        locks::write(&self.dumps).insert(dump.id.clone(), dump.clone());
        Ok(())
    }

    fn save_result(&self, id: &DumpIdentifier, result: &SdResult) -> Result<()> {
        locks::write(&self.results).insert(id.clone(), result.clone());
        Ok(())
    }

    fn load_result(&self, id: &DumpIdentifier) -> Result<Option<SdResult>> {
        Ok(locks::read(&self.results).get(id).cloned())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
