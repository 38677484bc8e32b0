// Bundle, dump and result records
use crate::constants;
use crate::identifiers::{BundleIdentifier, DumpIdentifier};
use crate::serialization::Acyclic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Free-form key/value pairs supplied at upload
pub type CustomProperties = BTreeMap<String, String>;

/// Analysis state of a single dump
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DumpStatus {
    Created,
    Analyzing,
    Finished,
    Failed,
}

impl DumpStatus {
    /// Finished and Failed are terminal; everything else may still change
    pub fn is_terminal(self) -> bool {
        matches!(self, DumpStatus::Finished | DumpStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DumpStatus::Created => "Created",
            DumpStatus::Analyzing => "Analyzing",
            DumpStatus::Finished => "Finished",
            DumpStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for DumpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to analyze the dump(s) behind a URL or local path
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisInput {
    pub url: String,
    #[serde(default)]
    pub custom_properties: CustomProperties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl AnalysisInput {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_properties.insert(key.into(), value.into());
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleInfo {
    pub id: BundleIdentifier,
    pub source_url: String,
    pub filename: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub custom_properties: CustomProperties,
    /// Dumps discovered in this bundle, in discovery order
    #[serde(default)]
    pub dump_ids: Vec<String>,
    /// Set when the bundle failed before any dump could be registered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BundleInfo {
    pub fn new(
        id: BundleIdentifier,
        source_url: impl Into<String>,
        filename: impl Into<String>,
        custom_properties: CustomProperties,
    ) -> Self {
        Self {
            id,
            source_url: source_url.into(),
            filename: filename.into(),
            created: Utc::now(),
            custom_properties,
            dump_ids: Vec::new(),
            error: None,
        }
    }

    /// Returns false when the dump was already associated
    pub fn add_dump(&mut self, dump_id: &str) -> bool {
        if self.dump_ids.iter().any(|d| d == dump_id) {
            return false;
        }
        self.dump_ids.push(dump_id.to_string());
        true
    }

    pub fn dump_identifiers(&self) -> Vec<DumpIdentifier> {
        self.dump_ids
            .iter()
            .map(|d| DumpIdentifier {
                bundle_id: self.id.clone(),
                dump_id: d.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpInfo {
    pub id: DumpIdentifier,
    pub filename: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub custom_properties: CustomProperties,
    pub status: DumpStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished: Option<DateTime<Utc>>,
    /// Local copy of the dump, kept for reruns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ResultSummary>,
}

impl DumpInfo {
    pub fn new(
        id: DumpIdentifier,
        filename: impl Into<String>,
        custom_properties: CustomProperties,
        file_path: Option<PathBuf>,
    ) -> Self {
        Self {
            id,
            filename: filename.into(),
            created: Utc::now(),
            custom_properties,
            status: DumpStatus::Created,
            error: None,
            finished: None,
            file_path,
            summary: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Opaque analysis output for one dump
///
/// Serialization goes through [`Acyclic`], which elides self-references
/// instead of following them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct SdResult(Value);

impl SdResult {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn summary(&self) -> ResultSummary {
        ResultSummary::from_value(&self.0)
    }

    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

impl Serialize for SdResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Acyclic::new(&self.0).serialize(serializer)
    }
}

/// The part of a result that search and duplicate detection look at
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_description: Option<String>,
    /// Hash over the signature fields; equal fingerprints mark duplicates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

fn pointer_text(value: &Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl ResultSummary {
    pub fn from_value(value: &Value) -> Self {
        let first = |pointers: &[&str]| pointers.iter().find_map(|p| pointer_text(value, p));

        let mut hasher = Sha256::new();
        let mut signed = false;
        for pointer in constants::SIGNATURE_POINTERS {
            if let Some(text) = pointer_text(value, pointer) {
                hasher.update(pointer.as_bytes());
                hasher.update(b"=");
                hasher.update(text.as_bytes());
                hasher.update(b"\n");
                signed = true;
            }
        }
        let fingerprint = signed.then(|| {
            let hex = format!("{:x}", hasher.finalize());
            hex[..16].to_string()
        });

        Self {
            last_event_type: first(constants::LAST_EVENT_TYPE_POINTERS),
            last_event_description: first(constants::LAST_EVENT_DESCRIPTION_POINTERS),
            fingerprint,
        }
    }
}

/// Bundle fields repeated on every dump view
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleSummary {
    pub id: BundleIdentifier,
    pub source_url: String,
    pub filename: String,
    pub created: DateTime<Utc>,
    pub custom_properties: CustomProperties,
}

impl From<&BundleInfo> for BundleSummary {
    fn from(bundle: &BundleInfo) -> Self {
        Self {
            id: bundle.id.clone(),
            source_url: bundle.source_url.clone(),
            filename: bundle.filename.clone(),
            created: bundle.created,
            custom_properties: bundle.custom_properties.clone(),
        }
    }
}

/// Read projection used by search; never persisted
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpViewModel {
    pub bundle: BundleSummary,
    pub dump: DumpInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Arc<SdResult>>,
}

impl DumpViewModel {
    pub fn new(bundle: &BundleInfo, dump: DumpInfo) -> Self {
        Self {
            bundle: BundleSummary::from(bundle),
            dump,
            result: None,
        }
    }

    pub fn id(&self) -> &DumpIdentifier {
        &self.dump.id
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.dump.created
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_terminal() {
        assert!(!DumpStatus::Created.is_terminal());
        assert!(!DumpStatus::Analyzing.is_terminal());
        assert!(DumpStatus::Finished.is_terminal());
        assert!(DumpStatus::Failed.is_terminal());
    }

    #[test]
    fn test_bundle_add_dump_dedupes() {
        let id = BundleIdentifier::new("b1").unwrap();
        let mut bundle = BundleInfo::new(id, "/tmp/a.dmp", "a.dmp", CustomProperties::new());
        assert!(bundle.add_dump("d1"));
        assert!(!bundle.add_dump("d1"));
        assert!(bundle.add_dump("d2"));
        assert_eq!(bundle.dump_ids, vec!["d1", "d2"]);
        assert_eq!(bundle.dump_identifiers()[1].to_string(), "b1:d2");
    }

    #[test]
    fn test_summary_extraction() {
        let result = SdResult::new(json!({
            "LastEvent": { "Type": "ACCESS_VIOLATION", "Description": "read at 0x0" },
            "Modules": ["a.dll"]
        }));
        let summary = result.summary();
        assert_eq!(summary.last_event_type.as_deref(), Some("ACCESS_VIOLATION"));
        assert_eq!(summary.last_event_description.as_deref(), Some("read at 0x0"));
        assert!(summary.fingerprint.is_some());

        let same = SdResult::new(json!({
            "LastEvent": { "Type": "ACCESS_VIOLATION", "Description": "read at 0x0" },
            "Modules": ["b.dll"]
        }));
        assert_eq!(same.summary().fingerprint, summary.fingerprint);
    }

    #[test]
    fn test_summary_without_signature() {
        let summary = SdResult::new(json!({"unrelated": true})).summary();
        assert_eq!(summary, ResultSummary::default());
    }

    #[test]
    fn test_analysis_input_defaults() {
        let input: AnalysisInput = serde_json::from_str(r#"{"url":"/tmp/x.dmp"}"#).unwrap();
        assert!(input.custom_properties.is_empty());
        assert!(input.filename.is_none());
    }
}
