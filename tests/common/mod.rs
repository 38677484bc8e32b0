use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use superdump::error::Error;
use superdump::pipeline::{AnalysisJob, AnalysisPipeline, Analyzer};
use superdump::storage::{FilesystemStore, MemoryStore, MetadataStore};
use superdump::{
    AnalysisInput, AppContext, BundleIdentifier, DumpIdentifier, RequestHandler, SdResult, Settings,
};

pub fn setup_temp_dir() -> Result<TempDir> {
    tempfile::tempdir().map_err(anyhow::Error::from)
}

pub fn test_settings(dir: &Path) -> Settings {
    Settings {
        data_dir: dir.to_path_buf(),
        search_timeout_secs: 5,
        source_probe_timeout_secs: 5,
        ..Settings::default()
    }
}

/// Write a small non-empty file standing in for a crash dump
pub fn write_dump_file(dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, b"MDMP\x93\xa7\x00\x00 test dump")?;
    Ok(path)
}

/// Result document as the analyzer would produce it
#[allow(dead_code)]
pub fn result_doc(event_type: &str, description: &str) -> SdResult {
    SdResult::new(json!({
        "LastEvent": { "Type": event_type, "Description": description },
        "SystemInfo": { "OS": "Windows" },
    }))
}

/// Pipeline that records jobs instead of running them
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingPipeline {
    jobs: Mutex<Vec<AnalysisJob>>,
}

#[allow(dead_code)]
impl RecordingPipeline {
    pub fn jobs(&self) -> Vec<AnalysisJob> {
        self.jobs.lock().unwrap().clone()
    }
}

impl AnalysisPipeline for RecordingPipeline {
    fn schedule(&self, job: AnalysisJob) -> superdump::Result<()> {
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }

    fn describe(&self) -> String {
        "recording".to_string()
    }

    fn pending(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}

/// Finds two dumps in every source and reports the same crash for both.
/// Sources whose name contains `bad` fail to analyze.
#[allow(dead_code)]
pub struct FakeAnalyzer;

#[async_trait]
impl Analyzer for FakeAnalyzer {
    async fn discover(&self, path: &Path) -> superdump::Result<Vec<PathBuf>> {
        let second = path.with_extension("thread2.dmp");
        tokio::fs::copy(path, &second).await?;
        Ok(vec![path.to_path_buf(), second])
    }

    async fn analyze(&self, dump: &Path) -> superdump::Result<SdResult> {
        let name = dump.file_name().unwrap().to_string_lossy().into_owned();
        if name.contains("bad") {
            return Err(Error::upstream("fake analyzer", format!("cannot parse {}", name)));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(SdResult::new(json!({
            "LastEvent": { "Type": "EXCEPTION", "Description": "access violation" },
            "Dump": { "FileName": name },
        })))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// [`FakeAnalyzer`] that holds every analysis until a permit is released
#[allow(dead_code)]
pub struct GatedAnalyzer {
    gate: tokio::sync::Semaphore,
}

#[allow(dead_code)]
impl GatedAnalyzer {
    pub fn new() -> Self {
        Self {
            gate: tokio::sync::Semaphore::new(0),
        }
    }

    /// Let `n` more analyses run
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }
}

#[async_trait]
impl Analyzer for GatedAnalyzer {
    async fn discover(&self, path: &Path) -> superdump::Result<Vec<PathBuf>> {
        FakeAnalyzer.discover(path).await
    }

    async fn analyze(&self, dump: &Path) -> superdump::Result<SdResult> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| Error::upstream("gated analyzer", e.to_string()))?;
        permit.forget();
        FakeAnalyzer.analyze(dump).await
    }

    fn name(&self) -> &str {
        "gated"
    }
}

/// Memory-backed context whose jobs are only recorded
#[allow(dead_code)]
pub fn recording_context(dir: &Path) -> Result<(Arc<AppContext>, Arc<RecordingPipeline>)> {
    recording_context_with(test_settings(dir))
}

#[allow(dead_code)]
pub fn recording_context_with(
    settings: Settings,
) -> Result<(Arc<AppContext>, Arc<RecordingPipeline>)> {
    let pipeline = Arc::new(RecordingPipeline::default());
    let store: Arc<dyn MetadataStore> = Arc::new(MemoryStore::new());
    let ctx = AppContext::with_pipeline(settings, store, Arc::clone(&pipeline) as Arc<dyn AnalysisPipeline>)?;
    Ok((Arc::new(ctx), pipeline))
}

/// Filesystem-backed context running the real queue with [`FakeAnalyzer`]
#[allow(dead_code)]
pub fn analyzing_context(dir: &Path) -> Result<Arc<AppContext>> {
    analyzing_context_with(dir, Arc::new(FakeAnalyzer))
}

/// Filesystem-backed context running the real queue with `analyzer`
#[allow(dead_code)]
pub fn analyzing_context_with(dir: &Path, analyzer: Arc<dyn Analyzer>) -> Result<Arc<AppContext>> {
    let store: Arc<dyn MetadataStore> = Arc::new(FilesystemStore::new(dir)?);
    let ctx = AppContext::with_analyzer(test_settings(dir), store, analyzer)?;
    Ok(Arc::new(ctx))
}

/// Admit a bundle without validating its source
#[allow(dead_code)]
pub fn admit(ctx: &AppContext, filename: &str) -> Result<BundleIdentifier> {
    let input = AnalysisInput::new(format!("/var/dumps/{}", filename));
    Ok(ctx.superdump.process_input_file(filename, &input)?)
}

/// Register a dump in `bundle_id` and drive it to Finished with `result`
#[allow(dead_code)]
pub fn finished_dump(
    ctx: &AppContext,
    bundle_id: &BundleIdentifier,
    filename: &str,
    result: &SdResult,
) -> Result<DumpIdentifier> {
    let id = ctx
        .reporter
        .register_dump(bundle_id, filename, Some(PathBuf::from(filename)))?;
    ctx.reporter.mark_analyzing(&id)?;
    ctx.reporter.complete(&id, result)?;
    Ok(id)
}

/// Poll until every dump of the bundle reached a terminal state
#[allow(dead_code)]
pub async fn wait_until_terminal(ctx: &AppContext, bundle_id: &BundleIdentifier) -> Result<()> {
    for _ in 0..200 {
        if ctx.superdump.is_bundle_terminal(bundle_id)? {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    anyhow::bail!("bundle {} did not finish in time", bundle_id)
}

#[cfg(feature = "server")]
#[allow(dead_code)]
pub async fn start_test_server(
    handler: RequestHandler,
    port: u16,
) -> Result<tokio::task::JoinHandle<()>> {
    let config = superdump::server::ServerConfig {
        version: "test".to_string(),
        enable_cors: true,
    };
    let server = superdump::server::Server::new(handler, config);
    let app = server.router();
    let addr = format!("127.0.0.1:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Ok(server_handle)
}

#[cfg(not(feature = "server"))]
#[allow(dead_code)]
pub async fn start_test_server(
    _handler: RequestHandler,
    _port: u16,
) -> Result<tokio::task::JoinHandle<()>> {
    anyhow::bail!("server feature not enabled for tests");
}
