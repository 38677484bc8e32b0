//! Bundle and dump identifiers
//!
//! A [`BundleIdentifier`] names one ingestion batch. A [`DumpIdentifier`] names one
//! dump analysis inside a bundle and is written as `bundle:dump`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const MAX_TOKEN_LEN: usize = 128;

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identifier tokens are restricted so they can double as directory names
fn is_valid_token(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_TOKEN_LEN
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Generate a fresh lowercase hex token of `len` characters
///
/// Mixes wall-clock nanoseconds, a process-wide counter, the process id and a
/// caller supplied seed through SHA-256. Callers still check the token against
/// their repository before using it.
pub fn generate_token(seed: &str, len: usize) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut hasher = Sha256::new();
    hasher.update(nanos.to_le_bytes());
    hasher.update(counter.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(seed.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..len.min(hex.len())].to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BundleIdentifier(String);

impl BundleIdentifier {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if !is_valid_token(&id) {
            return Err(Error::InvalidArgument(format!(
                "invalid bundle identifier: {:?}",
                id
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BundleIdentifier {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<BundleIdentifier> for String {
    fn from(id: BundleIdentifier) -> Self {
        id.0
    }
}

impl FromStr for BundleIdentifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for BundleIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BundleIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpIdentifier {
    pub bundle_id: BundleIdentifier,
    pub dump_id: String,
}

impl DumpIdentifier {
    pub fn new(bundle_id: BundleIdentifier, dump_id: impl Into<String>) -> Result<Self> {
        let dump_id = dump_id.into();
        if !is_valid_token(&dump_id) {
            return Err(Error::InvalidArgument(format!(
                "invalid dump identifier: {:?}",
                dump_id
            )));
        }
        Ok(Self { bundle_id, dump_id })
    }

    /// Build from the two path segments used by the HTTP API
    pub fn from_parts(bundle_id: &str, dump_id: &str) -> Result<Self> {
        Self::new(BundleIdentifier::new(bundle_id)?, dump_id)
    }
}

impl FromStr for DumpIdentifier {
    type Err = Error;

    /// Accepts `bundle:dump` and `bundle/dump`
    fn from_str(s: &str) -> Result<Self> {
        let (bundle, dump) = s
            .split_once(':')
            .or_else(|| s.split_once('/'))
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "invalid dump identifier {:?}: expected 'bundle:dump'",
                    s
                ))
            })?;
        Self::from_parts(bundle.trim(), dump.trim())
    }
}

impl fmt::Display for DumpIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bundle_id, self.dump_id)
    }
}
