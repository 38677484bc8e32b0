// Service settings, read from <data dir>/superdump.json when present
use crate::constants;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Root of the filesystem store
    pub data_dir: PathBuf,
    /// Read by the external retention job; never enforced here
    pub use_automatic_dump_deletion: bool,
    pub dump_retention_days: u32,
    /// Whether duplicate search reports the queried dump itself
    pub duplicates_include_source: bool,
    pub search_timeout_secs: u64,
    pub source_probe_timeout_secs: u64,
    pub heatmap_bucket_seconds: u32,
    pub elastic: Option<ElasticSettings>,
    pub analyzer: AnalyzerSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ElasticSettings {
    pub url: String,
    pub index: String,
}

impl Default for ElasticSettings {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9200".to_string(),
            index: constants::DEFAULT_ELASTIC_INDEX.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalyzerSettings {
    /// Program and arguments; `{dump}` and `{output}` are substituted per run.
    /// Empty means no analyzer is configured and admissions are refused.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub max_concurrent: usize,
    pub queue_capacity: usize,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: constants::ANALYZER_TIMEOUT_SECS,
            max_concurrent: constants::DEFAULT_MAX_CONCURRENT_ANALYSES,
            queue_capacity: constants::DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            use_automatic_dump_deletion: false,
            dump_retention_days: 30,
            duplicates_include_source: true,
            search_timeout_secs: constants::SEARCH_TIMEOUT_SECS,
            source_probe_timeout_secs: constants::HTTP_PROBE_TIMEOUT_SECS,
            heatmap_bucket_seconds: constants::DEFAULT_BUCKET_SECONDS,
            elastic: None,
            analyzer: AnalyzerSettings::default(),
        }
    }
}

impl Settings {
    /// Load `superdump.json` from `data_dir`, falling back to defaults when absent.
    /// `data_dir` always wins over a value stored in the file.
    pub fn load_or_default<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let path = data_dir.join(constants::SETTINGS_FILENAME);
        let mut settings = if path.exists() {
            Self::load(&path)?
        } else {
            log::debug!("[Settings] {} not found, using defaults", path.display());
            Self::default()
        };
        settings.data_dir = data_dir.to_path_buf();
        settings.validate()?;
        Ok(settings)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let settings: Settings = sonic_rs::from_slice(&data)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.heatmap_bucket_seconds == 0 {
            return Err(Error::Config("heatmapBucketSeconds must be > 0".into()));
        }
        if self.analyzer.max_concurrent == 0 {
            return Err(Error::Config("analyzer.maxConcurrent must be > 0".into()));
        }
        if self.analyzer.queue_capacity == 0 {
            return Err(Error::Config("analyzer.queueCapacity must be > 0".into()));
        }
        Ok(())
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    pub fn source_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.source_probe_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.duplicates_include_source);
        assert!(!settings.use_automatic_dump_deletion);
        assert_eq!(settings.heatmap_bucket_seconds, 3600);
        assert!(settings.analyzer.command.is_empty());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(
            dir.path().join(constants::SETTINGS_FILENAME),
            r#"{"useAutomaticDumpDeletion": true, "analyzer": {"command": ["analyze", "{dump}"]}}"#,
        )?;
        let settings = Settings::load_or_default(dir.path())?;
        assert!(settings.use_automatic_dump_deletion);
        assert_eq!(settings.analyzer.command, vec!["analyze", "{dump}"]);
        assert_eq!(settings.analyzer.max_concurrent, constants::DEFAULT_MAX_CONCURRENT_ANALYSES);
        assert_eq!(settings.data_dir, dir.path());
        Ok(())
    }

    #[test]
    fn test_invalid_file_is_config_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join(constants::SETTINGS_FILENAME), "{not json")?;
        let err = Settings::load_or_default(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        Ok(())
    }

    #[test]
    fn test_zero_bucket_rejected() {
        let settings = Settings {
            heatmap_bucket_seconds: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
