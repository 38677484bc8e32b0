// Dump repository: per-dump records keyed by DumpIdentifier
use super::BundleRepository;
use crate::constants;
use crate::error::{Error, Result};
use crate::identifiers::{BundleIdentifier, DumpIdentifier, generate_token};
use crate::locks;
use crate::model::DumpInfo;
use crate::storage::MetadataStore;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

type Entry = Arc<RwLock<DumpInfo>>;

pub struct DumpRepository {
    store: Arc<dyn MetadataStore>,
    bundles: Arc<BundleRepository>,
    dumps: RwLock<HashMap<DumpIdentifier, Entry>>,
}

impl DumpRepository {
    pub fn new(store: Arc<dyn MetadataStore>, bundles: Arc<BundleRepository>) -> Self {
        Self {
            store,
            bundles,
            dumps: RwLock::new(HashMap::new()),
        }
    }

    /// Load dumps of every known bundle. Run after `BundleRepository::populate`.
    pub fn populate(&self) -> Result<usize> {
        let mut count = 0;
        for bundle in self.bundles.all() {
            for dump in self.store.load_dumps(&bundle.id)? {
                // A dump saved right before a crash may be missing from its bundle
                if !bundle.dump_ids.contains(&dump.id.dump_id) {
                    self.bundles.append_dump(&bundle.id, &dump.id.dump_id)?;
                }
                locks::write(&self.dumps).insert(dump.id.clone(), Arc::new(RwLock::new(dump)));
                count += 1;
            }
        }
        log::debug!("[Dumps] Loaded {} dumps", count);
        Ok(count)
    }

    fn entry(&self, id: &DumpIdentifier) -> Result<Entry> {
        locks::read(&self.dumps)
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("dump {}", id)))
    }

    pub fn get(&self, id: &DumpIdentifier) -> Option<DumpInfo> {
        let entry = locks::read(&self.dumps).get(id).cloned()?;
        let info = locks::read(&entry).clone();
        Some(info)
    }

    pub fn contains(&self, id: &DumpIdentifier) -> bool {
        locks::read(&self.dumps).contains_key(id)
    }

    pub fn len(&self) -> usize {
        locks::read(&self.dumps).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dumps of one bundle in discovery order
    pub fn by_bundle(&self, bundle_id: &BundleIdentifier) -> Result<Vec<DumpInfo>> {
        let bundle = self
            .bundles
            .get(bundle_id)
            .ok_or_else(|| Error::not_found(format!("bundle {}", bundle_id)))?;
        Ok(bundle
            .dump_identifiers()
            .iter()
            .filter_map(|id| self.get(id))
            .collect())
    }

    pub fn all(&self) -> Vec<DumpInfo> {
        let entries: Vec<Entry> = locks::read(&self.dumps).values().cloned().collect();
        let mut dumps: Vec<DumpInfo> = entries.iter().map(|e| locks::read(e).clone()).collect();
        dumps.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        dumps
    }

    /// Register a new dump inside an existing bundle
    pub fn create(
        &self,
        bundle_id: &BundleIdentifier,
        filename: &str,
        file_path: Option<PathBuf>,
    ) -> Result<DumpInfo> {
        let bundle = self
            .bundles
            .get(bundle_id)
            .ok_or_else(|| Error::not_found(format!("bundle {}", bundle_id)))?;

        for _ in 0..constants::ID_ALLOCATION_ATTEMPTS {
            let seed = format!("{}/{}", bundle_id, filename);
            let id = DumpIdentifier::new(
                bundle_id.clone(),
                generate_token(&seed, constants::DUMP_ID_LENGTH),
            )?;
            let info = DumpInfo::new(
                id.clone(),
                filename,
                bundle.custom_properties.clone(),
                file_path.clone(),
            );

            {
                let mut map = locks::write(&self.dumps);
                if map.contains_key(&id) {
                    continue;
                }
                map.insert(id.clone(), Arc::new(RwLock::new(info.clone())));
            }

            let persisted = self
                .store
                .save_dump(&info)
                .and_then(|_| self.bundles.append_dump(bundle_id, &id.dump_id));
            if let Err(e) = persisted {
                locks::write(&self.dumps).remove(&id);
                return Err(e);
            }
            return Ok(info);
        }
        Err(Error::Io(std::io::Error::other(
            "could not allocate a unique dump identifier",
        )))
    }

    /// Apply `f` to a copy of the record, persist it, then publish it
    pub fn update<F>(&self, id: &DumpIdentifier, f: F) -> Result<DumpInfo>
    where
        F: FnOnce(&mut DumpInfo),
    {
        self.try_update(id, |dump| {
            f(dump);
            Ok(())
        })
    }

    /// Like [`update`](Self::update), but `f` may refuse the change. The
    /// entry stays locked from the check to the write, so `f` sees the state
    /// it replaces.
    pub fn try_update<F>(&self, id: &DumpIdentifier, f: F) -> Result<DumpInfo>
    where
        F: FnOnce(&mut DumpInfo) -> Result<()>,
    {
        let entry = self.entry(id)?;
        let mut guard = locks::write(&entry);
        let mut updated = guard.clone();
        f(&mut updated)?;
        self.store.save_dump(&updated)?;
        *guard = updated;
        Ok(guard.clone())
    }
}
