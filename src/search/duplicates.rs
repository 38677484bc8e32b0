// Duplicate detection by result fingerprint
use super::DuplicateIndex;
use crate::error::Result;
use crate::identifiers::DumpIdentifier;
use crate::model::DumpInfo;
use crate::repository::DumpRepository;
use async_trait::async_trait;
use std::sync::Arc;

/// Dumps whose results share a crash signature fingerprint are duplicates.
/// A dump without a fingerprint only matches itself.
pub struct FingerprintIndex {
    dumps: Arc<DumpRepository>,
}

impl FingerprintIndex {
    pub fn new(dumps: Arc<DumpRepository>) -> Self {
        Self { dumps }
    }
}

#[async_trait]
impl DuplicateIndex for FingerprintIndex {
    async fn find_duplicates(&self, dump: &DumpInfo) -> Result<Vec<DumpIdentifier>> {
        let Some(fingerprint) = dump.summary.as_ref().and_then(|s| s.fingerprint.as_deref()) else {
            return Ok(vec![dump.id.clone()]);
        };
        Ok(self
            .dumps
            .all()
            .into_iter()
            .filter(|other| {
                other
                    .summary
                    .as_ref()
                    .and_then(|s| s.fingerprint.as_deref())
                    == Some(fingerprint)
            })
            .map(|other| other.id)
            .collect())
    }

    fn name(&self) -> &str {
        "fingerprint"
    }
}
