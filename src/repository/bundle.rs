// Bundle repository: in-memory working set over a MetadataStore
use crate::constants;
use crate::error::{Error, Result};
use crate::identifiers::{BundleIdentifier, generate_token};
use crate::locks;
use crate::model::{BundleInfo, CustomProperties};
use crate::storage::MetadataStore;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

type Entry = Arc<RwLock<BundleInfo>>;

/// Holds every known bundle. The map lock is only taken for lookups and
/// inserts; mutations lock the single bundle entry they touch.
pub struct BundleRepository {
    store: Arc<dyn MetadataStore>,
    bundles: RwLock<HashMap<BundleIdentifier, Entry>>,
}

impl BundleRepository {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
            bundles: RwLock::new(HashMap::new()),
        }
    }

    /// Load all bundles from the store, returns the number loaded
    pub fn populate(&self) -> Result<usize> {
        let loaded = self.store.load_bundles()?;
        let count = loaded.len();
        let mut map = locks::write(&self.bundles);
        for bundle in loaded {
            map.insert(bundle.id.clone(), Arc::new(RwLock::new(bundle)));
        }
        log::debug!("[Bundles] Loaded {} bundles from {}", count, self.store.describe());
        Ok(count)
    }

    fn entry(&self, id: &BundleIdentifier) -> Result<Entry> {
        locks::read(&self.bundles)
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("bundle {}", id)))
    }

    pub fn get(&self, id: &BundleIdentifier) -> Option<BundleInfo> {
        let entry = locks::read(&self.bundles).get(id).cloned()?;
        let info = locks::read(&entry).clone();
        Some(info)
    }

    pub fn contains(&self, id: &BundleIdentifier) -> bool {
        locks::read(&self.bundles).contains_key(id)
    }

    pub fn len(&self) -> usize {
        locks::read(&self.bundles).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all bundles, oldest first
    pub fn all(&self) -> Vec<BundleInfo> {
        let entries: Vec<Entry> = locks::read(&self.bundles).values().cloned().collect();
        let mut bundles: Vec<BundleInfo> =
            entries.iter().map(|e| locks::read(e).clone()).collect();
        bundles.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        bundles
    }

    /// Allocate a fresh identifier and persist a new bundle
    pub fn create(
        &self,
        source_url: &str,
        filename: &str,
        custom_properties: CustomProperties,
    ) -> Result<BundleInfo> {
        for _ in 0..constants::ID_ALLOCATION_ATTEMPTS {
            let id = BundleIdentifier::new(generate_token(source_url, constants::BUNDLE_ID_LENGTH))?;
            let info = BundleInfo::new(id.clone(), source_url, filename, custom_properties.clone());

            // Reserve the id before touching the store
            {
                let mut map = locks::write(&self.bundles);
                if map.contains_key(&id) {
                    continue;
                }
                map.insert(id.clone(), Arc::new(RwLock::new(info.clone())));
            }

            if let Err(e) = self.store.save_bundle(&info) {
                locks::write(&self.bundles).remove(&id);
                return Err(e);
            }
            return Ok(info);
        }
        Err(Error::Io(std::io::Error::other(
            "could not allocate a unique bundle identifier",
        )))
    }

    fn modify<F>(&self, id: &BundleIdentifier, f: F) -> Result<BundleInfo>
    where
        F: FnOnce(&mut BundleInfo) -> bool,
    {
        let entry = self.entry(id)?;
        let mut guard = locks::write(&entry);
        let mut updated = guard.clone();
        if f(&mut updated) {
            self.store.save_bundle(&updated)?;
            *guard = updated;
        }
        Ok(guard.clone())
    }

    pub fn append_dump(&self, id: &BundleIdentifier, dump_id: &str) -> Result<BundleInfo> {
        self.modify(id, |bundle| bundle.add_dump(dump_id))
    }

    pub fn set_error(&self, id: &BundleIdentifier, reason: &str) -> Result<BundleInfo> {
        self.modify(id, |bundle| {
            bundle.error = Some(reason.to_string());
            true
        })
    }

    /// Drop a bundle from memory and storage
    pub fn remove(&self, id: &BundleIdentifier) -> Result<()> {
        locks::write(&self.bundles).remove(id);
        self.store.delete_bundle(id)
    }
}
