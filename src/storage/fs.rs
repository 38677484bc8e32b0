// Directory-per-bundle store
//
// <root>/<bundle>/bundleinfo.json
// <root>/<bundle>/<dump>/dumpinfo.json
// <root>/<bundle>/<dump>/superdump-result.json.zst

use super::MetadataStore;
use crate::constants;
use crate::error::Result;
use crate::identifiers::{BundleIdentifier, DumpIdentifier};
use crate::model::{BundleInfo, DumpInfo, SdResult};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dump_dir(&self, id: &DumpIdentifier) -> PathBuf {
        constants::dump_dir(&self.root, id.bundle_id.as_str(), &id.dump_id)
    }

    /// Write via a temp file and rename so readers never see partial files
    fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, data)?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                log::warn!("[Store] Failed to read {}: {}", path.display(), e);
                return None;
            }
        };
        match sonic_rs::from_slice(&data) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("[Store] Skipping unreadable {}: {}", path.display(), e);
                None
            }
        }
    }

    fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}

impl MetadataStore for FilesystemStore {
    fn load_bundles(&self) -> Result<Vec<BundleInfo>> {
        let mut bundles: Vec<BundleInfo> = Self::subdirectories(&self.root)?
            .into_iter()
            .map(|dir| dir.join(constants::BUNDLE_INFO_FILENAME))
            .filter(|path| path.is_file())
            .filter_map(|path| Self::read_json(&path))
            .collect();
        bundles.sort_by_key(|b| b.created);
        Ok(bundles)
    }

    fn load_dumps(&self, bundle_id: &BundleIdentifier) -> Result<Vec<DumpInfo>> {
        let dir = constants::bundle_dir(&self.root, bundle_id.as_str());
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut dumps: Vec<DumpInfo> = Self::subdirectories(&dir)?
            .into_iter()
            .map(|dir| dir.join(constants::DUMP_INFO_FILENAME))
            .filter(|path| path.is_file())
            .filter_map(|path| Self::read_json(&path))
            .collect();
        dumps.sort_by_key(|d| d.created);
        Ok(dumps)
    }

    fn save_bundle(&self, bundle: &BundleInfo) -> Result<()> {
        let dir = constants::bundle_dir(&self.root, bundle.id.as_str());
        std::fs::create_dir_all(&dir)?;
        let json = serde_json::to_vec_pretty(bundle)?;
        Self::write_atomic(&dir.join(constants::BUNDLE_INFO_FILENAME), &json)
    }

    fn delete_bundle(&self, bundle_id: &BundleIdentifier) -> Result<()> {
        let dir = constants::bundle_dir(&self.root, bundle_id.as_str());
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    fn save_dump(&self, dump: &DumpInfo) -> Result<()> {
        let dir = self.dump_dir(&dump.id);
        std::fs::create_dir_all(&dir)?;
        let json = serde_json::to_vec_pretty(dump)?;
        Self::write_atomic(&dir.join(constants::DUMP_INFO_FILENAME), &json)
    }

    fn save_result(&self, id: &DumpIdentifier, result: &SdResult) -> Result<()> {
        let dir = self.dump_dir(id);
        std::fs::create_dir_all(&dir)?;
        let json = result.to_json_vec()?;
        let compressed = zstd::encode_all(json.as_slice(), constants::ZSTD_COMPRESSION_LEVEL)?;
        Self::write_atomic(&dir.join(constants::RESULT_FILENAME), &compressed)
    }

    fn load_result(&self, id: &DumpIdentifier) -> Result<Option<SdResult>> {
        let path = self.dump_dir(id).join(constants::RESULT_FILENAME);
        if !path.is_file() {
            return Ok(None);
        }
        let compressed = std::fs::read(&path)?;
        let json = zstd::decode_all(compressed.as_slice())?;
        Ok(Some(serde_json::from_slice(&json)?))
    }

    fn describe(&self) -> String {
        format!("filesystem ({})", self.root.display())
    }
}
