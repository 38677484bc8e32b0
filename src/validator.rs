// Ingestion source resolution and reachability probing
use crate::constants;
use crate::error::{Error, Result};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the bytes of an analysis request live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Local(PathBuf),
    Remote(Url),
}

impl InputSource {
    /// Classify a URL or path without touching the network or filesystem
    pub fn parse(url: &str) -> Result<Self> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_source("empty source"));
        }

        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            let parsed = Url::parse(trimmed)
                .map_err(|e| Error::invalid_source(format!("malformed URL '{}': {}", trimmed, e)))?;
            if parsed.host_str().is_none_or(str::is_empty) {
                return Err(Error::invalid_source(format!("URL '{}' has no host", trimmed)));
            }
            return Ok(InputSource::Remote(parsed));
        }
        if lower.starts_with("file://") {
            let parsed = Url::parse(trimmed)
                .map_err(|e| Error::invalid_source(format!("malformed URL '{}': {}", trimmed, e)))?;
            let path = parsed
                .to_file_path()
                .map_err(|_| Error::invalid_source(format!("'{}' is not a local path", trimmed)))?;
            return Ok(InputSource::Local(path));
        }
        if let Some((scheme, _)) = trimmed.split_once("://") {
            return Err(Error::invalid_source(format!("unsupported scheme '{}'", scheme)));
        }
        Ok(InputSource::Local(PathBuf::from(trimmed)))
    }

    pub fn is_local(&self) -> bool {
        matches!(self, InputSource::Local(_))
    }

    /// Last path component, if any
    pub fn base_name(&self) -> Option<String> {
        match self {
            InputSource::Local(path) => file_name_of(path),
            InputSource::Remote(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Local(path) => write!(f, "{}", path.display()),
            InputSource::Remote(url) => write!(f, "{}", url),
        }
    }
}

fn file_name_of(path: &Path) -> Option<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
}

/// A source that passed the reachability probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub source: InputSource,
    /// Base name for local files; Content-Disposition or last path segment
    /// for remote ones
    pub filename: Option<String>,
    pub size: Option<u64>,
}

pub struct SourceValidator {
    client: reqwest::Client,
    timeout: Duration,
}

impl SourceValidator {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(constants::user_agent())
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }

    /// Probe `url`; on success fill in `filename` for local sources when unset.
    ///
    /// Never downloads the resource.
    pub async fn validate(&self, url: &str, filename: &mut Option<String>) -> bool {
        match self.resolve(url).await {
            Ok(resolved) => {
                if filename.is_none() && resolved.source.is_local() {
                    *filename = resolved.filename;
                }
                true
            }
            Err(e) => {
                log::debug!("[Validator] Rejected {}: {}", url, e);
                false
            }
        }
    }

    /// Like [`validate`](Self::validate) but keeps the rejection reason
    pub async fn resolve(&self, url: &str) -> Result<ResolvedSource> {
        match InputSource::parse(url)? {
            InputSource::Local(path) => self.resolve_local(path).await,
            InputSource::Remote(url) => self.resolve_remote(url).await,
        }
    }

    async fn resolve_local(&self, path: PathBuf) -> Result<ResolvedSource> {
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| Error::invalid_source(format!("{}: {}", path.display(), e)))?;
        if !metadata.is_file() {
            return Err(Error::invalid_source(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        if metadata.len() == 0 {
            return Err(Error::invalid_source(format!("{} is empty", path.display())));
        }
        Ok(ResolvedSource {
            filename: file_name_of(&path),
            size: Some(metadata.len()),
            source: InputSource::Local(path),
        })
    }

    async fn resolve_remote(&self, url: Url) -> Result<ResolvedSource> {
        if url.path().ends_with('/') {
            return Err(Error::invalid_source(format!("{} points at a directory", url)));
        }

        let mut response = self.probe(self.client.head(url.clone())).await?;
        if response.status() == StatusCode::METHOD_NOT_ALLOWED {
            // Dropping the response before reading closes the body
            response = self.probe(self.client.get(url.clone())).await?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(Error::invalid_source(format!("{} answered {}", url, status)));
        }

        let headers = response.headers();
        // The header, not `content_length()`, which is 0 for HEAD responses
        let size = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        if size == Some(0) {
            return Err(Error::invalid_source(format!("{} is empty", url)));
        }
        let is_html = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.to_ascii_lowercase().starts_with("text/html"));
        if is_html {
            return Err(Error::invalid_source(format!(
                "{} is a web page, not a file",
                url
            )));
        }

        let filename = headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(disposition_filename);
        let source = InputSource::Remote(url);
        Ok(ResolvedSource {
            filename: filename.or_else(|| source.base_name()),
            size,
            source,
        })
    }

    async fn probe(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::UpstreamTimeout {
                    service: "source probe".to_string(),
                    timeout: self.timeout,
                }
            } else {
                Error::invalid_source(format!("unreachable: {}", e))
            }
        })
    }
}

/// `attachment; filename="crash.dmp"` -> `crash.dmp`
fn disposition_filename(header: &str) -> Option<String> {
    header.split(';').find_map(|part| {
        let (key, value) = part.trim().split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let name = value.trim().trim_matches('"');
        let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
        (!name.is_empty()).then(|| name.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_sources() {
        assert!(matches!(
            InputSource::parse("https://example.org/a.dmp").unwrap(),
            InputSource::Remote(_)
        ));
        assert_eq!(
            InputSource::parse("/tmp/a.dmp").unwrap(),
            InputSource::Local(PathBuf::from("/tmp/a.dmp"))
        );
        assert_eq!(
            InputSource::parse("file:///tmp/a.dmp").unwrap(),
            InputSource::Local(PathBuf::from("/tmp/a.dmp"))
        );
        assert!(InputSource::parse("").is_err());
        assert!(InputSource::parse("ftp://host/a.dmp").is_err());
        assert!(InputSource::parse("http://").is_err());
    }

    #[test]
    fn test_base_name() {
        let remote = InputSource::parse("http://example/test.dmp").unwrap();
        assert_eq!(remote.base_name().as_deref(), Some("test.dmp"));
        let dir = InputSource::parse("http://example/").unwrap();
        assert_eq!(dir.base_name(), None);
    }

    #[test]
    fn test_disposition_filename() {
        assert_eq!(
            disposition_filename(r#"attachment; filename="crash.dmp""#).as_deref(),
            Some("crash.dmp")
        );
        assert_eq!(
            disposition_filename("attachment; filename=../../x.dmp").as_deref(),
            Some("x.dmp")
        );
        assert_eq!(disposition_filename("inline"), None);
    }

    #[tokio::test]
    async fn test_local_file_sets_filename() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"MDMP")?;
        let validator = SourceValidator::new(Duration::from_secs(2))?;

        let mut filename = None;
        let path = file.path().to_string_lossy().into_owned();
        assert!(validator.validate(&path, &mut filename).await);
        assert_eq!(filename, file_name_of(file.path()));

        let mut preset = Some("given.dmp".to_string());
        assert!(validator.validate(&path, &mut preset).await);
        assert_eq!(preset.as_deref(), Some("given.dmp"));
        Ok(())
    }

    #[tokio::test]
    async fn test_local_rejections() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let empty = dir.path().join("empty.dmp");
        std::fs::write(&empty, b"")?;
        let validator = SourceValidator::new(Duration::from_secs(2))?;

        let mut filename = None;
        assert!(!validator.validate(&dir.path().to_string_lossy(), &mut filename).await);
        assert!(!validator.validate(&empty.to_string_lossy(), &mut filename).await);
        let missing = dir.path().join("missing.dmp");
        assert!(!validator.validate(&missing.to_string_lossy(), &mut filename).await);
        assert!(filename.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_remote_directory_rejected_without_request() -> anyhow::Result<()> {
        let validator = SourceValidator::new(Duration::from_secs(2))?;
        let err = validator.resolve("http://192.0.2.1/dumps/").await.unwrap_err();
        assert!(matches!(err, Error::InvalidSource { .. }));
        Ok(())
    }
}
