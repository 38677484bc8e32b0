mod common;

use anyhow::Result;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use superdump::error::Error;
use superdump::pipeline::{AnalysisJob, DisabledPipeline};
use superdump::storage::{FilesystemStore, MemoryStore, MetadataStore};
use superdump::{
    AnalysisInput, AppContext, BundleIdentifier, BundleInfo, DumpIdentifier, DumpInfo, DumpStatus,
    Outcome, RequestHandler, SdResult,
};

#[tokio::test]
async fn test_admitted_bundle_is_visible_immediately() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let (ctx, pipeline) = common::recording_context(dir.path())?;
    let dump = common::write_dump_file(dir.path(), "crash.dmp")?;

    let input = AnalysisInput::new(dump.to_string_lossy()).with_property("ticket", "4711");
    let outcome = RequestHandler::new(Arc::clone(&ctx)).create_bundle(input).await;
    let Outcome::Created { bundle_id, location } = outcome else {
        panic!("expected Created, got {:?}", outcome);
    };
    assert_eq!(location, format!("/api/bundles/{}", bundle_id));

    let bundle = ctx.bundles.get(&bundle_id).expect("bundle visible after admission");
    assert_eq!(bundle.filename, "crash.dmp");
    assert_eq!(bundle.custom_properties.get("ticket").map(String::as_str), Some("4711"));
    assert!(bundle.dump_ids.is_empty());
    assert!(!ctx.superdump.is_bundle_terminal(&bundle_id)?);

    let jobs = pipeline.jobs();
    assert_eq!(jobs.len(), 1);
    assert!(matches!(
        &jobs[0],
        AnalysisJob::Bundle { bundle_id: id, filename, .. } if id == &bundle_id && filename == "crash.dmp"
    ));
    Ok(())
}

#[tokio::test]
async fn test_auxiliary_file_produces_no_bundle() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let (ctx, pipeline) = common::recording_context(dir.path())?;

    let input = AnalysisInput::new("/var/dumps/app.pdb");
    let err = ctx.superdump.process_input_file("app.PDB", &input).unwrap_err();
    assert!(matches!(err, Error::NoBundleProduced { .. }));

    // Same through the handler, with a real file behind it
    let symbols = common::write_dump_file(dir.path(), "app.pdb")?;
    let outcome = RequestHandler::new(Arc::clone(&ctx))
        .create_bundle(AnalysisInput::new(symbols.to_string_lossy()))
        .await;
    assert_eq!(outcome.status_code(), 422);

    assert_eq!(ctx.bundles.len(), 0);
    assert!(pipeline.jobs().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_bundle_removed_when_scheduling_fails() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let store: Arc<dyn MetadataStore> = Arc::new(FilesystemStore::new(dir.path())?);
    let ctx = AppContext::with_pipeline(
        common::test_settings(dir.path()),
        Arc::clone(&store),
        Arc::new(DisabledPipeline),
    )?;

    let input = AnalysisInput::new("/var/dumps/crash.dmp");
    let err = ctx.superdump.process_input_file("crash.dmp", &input).unwrap_err();
    assert!(matches!(err, Error::Upstream { .. }));
    assert!(ctx.bundles.is_empty());
    assert!(store.load_bundles()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_result_lifecycle() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let (ctx, _pipeline) = common::recording_context(dir.path())?;
    let bundle_id = common::admit(&ctx, "crash.dmp")?;

    let unknown_bundle = DumpIdentifier::from_parts("nosuchbundle", "d1")?;
    assert!(matches!(
        ctx.results.get_result(&unknown_bundle).await,
        Err(Error::NotFound { .. })
    ));
    let unknown_dump = DumpIdentifier::new(bundle_id.clone(), "nosuchdump")?;
    assert!(matches!(
        ctx.results.get_result(&unknown_dump).await,
        Err(Error::NotFound { .. })
    ));

    let id = ctx.reporter.register_dump(&bundle_id, "crash.dmp", None)?;
    assert!(matches!(
        ctx.results.get_result(&id).await,
        Err(Error::NotReady { status: DumpStatus::Created, .. })
    ));
    ctx.reporter.mark_analyzing(&id)?;
    assert!(matches!(
        ctx.results.get_result(&id).await,
        Err(Error::NotReady { status: DumpStatus::Analyzing, .. })
    ));

    let result = common::result_doc("EXCEPTION", "access violation");
    let dump = ctx.reporter.complete(&id, &result)?;
    assert_eq!(dump.status, DumpStatus::Finished);
    assert!(dump.finished.is_some());
    assert_eq!(
        dump.summary.as_ref().and_then(|s| s.last_event_type.as_deref()),
        Some("EXCEPTION")
    );

    let first = ctx.results.get_result(&id).await?;
    let second = ctx.results.get_result(&id).await?;
    assert_eq!(first.as_value(), result.as_value());
    assert_eq!(first, second);
    assert!(ctx.results.cache().contains(&id));
    assert!(ctx.superdump.is_bundle_terminal(&bundle_id)?);
    Ok(())
}

#[tokio::test]
async fn test_failed_analysis_is_reported() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let (ctx, _pipeline) = common::recording_context(dir.path())?;
    let bundle_id = common::admit(&ctx, "crash.dmp")?;
    let id = ctx.reporter.register_dump(&bundle_id, "crash.dmp", None)?;

    ctx.reporter.mark_analyzing(&id)?;
    ctx.reporter.fail(&id, "unsupported dump format")?;

    match ctx.results.get_result(&id).await {
        Err(Error::AnalysisFailed { reason, .. }) => assert!(reason.contains("unsupported")),
        other => panic!("expected AnalysisFailed, got {:?}", other.map(|_| ())),
    }
    let outcome = RequestHandler::new(Arc::clone(&ctx))
        .get_result(bundle_id.as_str(), &id.dump_id)
        .await;
    assert_eq!(outcome.status_code(), 422);
    Ok(())
}

#[tokio::test]
async fn test_rerun_invalidates_cached_result() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let (ctx, pipeline) = common::recording_context(dir.path())?;
    let bundle_id = common::admit(&ctx, "crash.dmp")?;

    let old = common::result_doc("EXCEPTION", "access violation");
    let id = common::finished_dump(&ctx, &bundle_id, "crash.dmp", &old)?;
    assert_eq!(ctx.results.get_result(&id).await?.as_value(), old.as_value());

    ctx.superdump.rerun(&id)?;
    assert!(!ctx.results.cache().contains(&id));
    assert_eq!(ctx.dumps.get(&id).unwrap().status, DumpStatus::Created);
    assert!(matches!(
        pipeline.jobs().last(),
        Some(AnalysisJob::Rerun { dump_id, .. }) if dump_id == &id
    ));
    assert!(matches!(
        ctx.results.get_result(&id).await,
        Err(Error::NotReady { .. })
    ));

    // A running dump cannot be rerun again
    ctx.reporter.mark_analyzing(&id)?;
    assert!(matches!(ctx.superdump.rerun(&id), Err(Error::NotReady { .. })));

    let new = common::result_doc("HANG", "deadlock");
    ctx.reporter.complete(&id, &new)?;
    assert_eq!(ctx.results.get_result(&id).await?.as_value(), new.as_value());
    Ok(())
}

#[tokio::test]
async fn test_rerun_requires_retained_file() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let (ctx, _pipeline) = common::recording_context(dir.path())?;
    let bundle_id = common::admit(&ctx, "crash.dmp")?;
    let id = ctx.reporter.register_dump(&bundle_id, "crash.dmp", None)?;
    ctx.reporter.fail(&id, "broken")?;

    assert!(matches!(ctx.superdump.rerun(&id), Err(Error::InvalidArgument(_))));
    // The failed record is left untouched
    assert_eq!(ctx.dumps.get(&id).unwrap().status, DumpStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_admissions_get_distinct_bundles() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let (ctx, pipeline) = common::recording_context(dir.path())?;

    let mut tasks = Vec::new();
    for i in 0..16 {
        let ctx = Arc::clone(&ctx);
        tasks.push(tokio::spawn(async move {
            let input = AnalysisInput::new(format!("https://dumps.example.com/{}.dmp", i));
            ctx.superdump.process_input_file(&format!("{}.dmp", i), &input)
        }));
    }

    let mut ids = HashSet::new();
    for task in tasks {
        ids.insert(task.await??);
    }
    assert_eq!(ids.len(), 16);
    assert_eq!(ctx.bundles.len(), 16);
    assert_eq!(pipeline.jobs().len(), 16);
    Ok(())
}

#[tokio::test]
async fn test_bundle_with_two_dumps_end_to_end() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let uploads = common::setup_temp_dir()?;
    let dump = common::write_dump_file(uploads.path(), "crash.dmp")?;

    let ctx = common::analyzing_context(dir.path())?;
    let handler = RequestHandler::new(Arc::clone(&ctx));
    let Outcome::Created { bundle_id, .. } = handler
        .create_bundle(AnalysisInput::new(dump.to_string_lossy()).with_property("product", "editor"))
        .await
    else {
        panic!("admission failed");
    };

    common::wait_until_terminal(&ctx, &bundle_id).await?;

    let dumps = ctx.dumps.by_bundle(&bundle_id)?;
    assert_eq!(dumps.len(), 2);
    let ids: HashSet<_> = dumps.iter().map(|d| d.id.clone()).collect();
    assert_eq!(ids.len(), 2);
    for dump in &dumps {
        assert_eq!(dump.status, DumpStatus::Finished);
        assert_eq!(dump.custom_properties.get("product").map(String::as_str), Some("editor"));
        let result = ctx.results.get_result(&dump.id).await?;
        assert_eq!(result.as_value()["Dump"]["FileName"], dump.filename.as_str());
    }
    ctx.shutdown().await;

    // Everything survives a restart of the store
    let store: Arc<dyn MetadataStore> = Arc::new(FilesystemStore::new(dir.path())?);
    let reopened = AppContext::with_pipeline(
        common::test_settings(dir.path()),
        store,
        Arc::new(DisabledPipeline),
    )?;
    assert_eq!(reopened.bundles.len(), 1);
    assert_eq!(reopened.dumps.by_bundle(&bundle_id)?.len(), 2);
    for dump in &dumps {
        assert!(reopened.results.get_result(&dump.id).await.is_ok());
    }
    Ok(())
}

#[tokio::test]
async fn test_analyzer_failure_marks_dumps_failed() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let uploads = common::setup_temp_dir()?;
    let dump = common::write_dump_file(uploads.path(), "bad.dmp")?;

    let ctx = common::analyzing_context(dir.path())?;
    let bundle_id = ctx
        .superdump
        .process_input_file("bad.dmp", &AnalysisInput::new(dump.to_string_lossy()))?;
    common::wait_until_terminal(&ctx, &bundle_id).await?;

    let dumps = ctx.dumps.by_bundle(&bundle_id)?;
    assert_eq!(dumps.len(), 2);
    for dump in &dumps {
        assert_eq!(dump.status, DumpStatus::Failed);
        assert!(dump.error.as_deref().unwrap_or_default().contains("cannot parse"));
        assert!(matches!(
            ctx.results.get_result(&dump.id).await,
            Err(Error::AnalysisFailed { .. })
        ));
    }
    ctx.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_unreachable_source_fails_bundle() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let ctx = common::analyzing_context(dir.path())?;

    // Admission does not validate; the fetch fails inside the queue
    let bundle_id = ctx
        .superdump
        .process_input_file("gone.dmp", &AnalysisInput::new("/nonexistent/gone.dmp"))?;
    common::wait_until_terminal(&ctx, &bundle_id).await?;

    let bundle = ctx.bundles.get(&bundle_id).unwrap();
    assert!(bundle.dump_ids.is_empty());
    assert!(bundle.error.is_some());
    ctx.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_memory_store_is_ephemeral() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let ctx = AppContext::with_pipeline(
        common::test_settings(dir.path()),
        Arc::new(MemoryStore::new()),
        Arc::new(DisabledPipeline),
    )?;
    assert!(ctx.bundles.is_empty());
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_reruns_schedule_one_job() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let (ctx, pipeline) = common::recording_context(dir.path())?;
    let bundle_id = common::admit(&ctx, "crash.dmp")?;
    let id = common::finished_dump(&ctx, &bundle_id, "crash.dmp", &common::result_doc("EXCEPTION", "x"))?;

    let outcomes: Vec<superdump::Result<()>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| ctx.superdump.rerun(&id)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    for outcome in outcomes.iter().filter(|r| r.is_err()) {
        assert!(matches!(outcome, Err(Error::NotReady { .. })), "{:?}", outcome);
    }
    let reruns = pipeline
        .jobs()
        .into_iter()
        .filter(|job| matches!(job, AnalysisJob::Rerun { .. }))
        .count();
    assert_eq!(reruns, 1);
    assert_eq!(ctx.dumps.get(&id).unwrap().status, DumpStatus::Created);
    Ok(())
}

/// Serves `test.dmp` over HTTP with an explicit length
#[cfg(feature = "server")]
async fn start_dump_host(port: u16) -> Result<tokio::task::JoinHandle<()>> {
    use axum::Router;
    use axum::http::header;
    use axum::routing::get;

    let app = Router::new().route(
        "/test.dmp",
        get(|| async {
            (
                [
                    (header::CONTENT_TYPE, "application/octet-stream"),
                    (header::CONTENT_LENGTH, "14"),
                ],
                "MDMP test dump",
            )
        }),
    );
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    Ok(tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    }))
}

#[cfg(feature = "server")]
#[tokio::test]
async fn test_remote_bundle_with_two_dumps() -> Result<()> {
    let port = 3135;
    let host = start_dump_host(port).await?;
    let dir = common::setup_temp_dir()?;
    let analyzer = Arc::new(common::GatedAnalyzer::new());
    let ctx = common::analyzing_context_with(dir.path(), Arc::clone(&analyzer) as _)?;
    let handler = RequestHandler::new(Arc::clone(&ctx));

    let url = format!("http://127.0.0.1:{}/test.dmp", port);
    let Outcome::Created { bundle_id, .. } = handler.create_bundle(AnalysisInput::new(&url)).await
    else {
        panic!("admission of {} failed", url);
    };
    assert_eq!(ctx.bundles.get(&bundle_id).unwrap().filename, "test.dmp");

    // Both dumps are registered before any analysis may run
    let mut dumps = Vec::new();
    for _ in 0..200 {
        dumps = ctx.dumps.by_bundle(&bundle_id)?;
        if dumps.len() == 2 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(dumps.len(), 2);
    for dump in &dumps {
        assert!(matches!(
            ctx.results.get_result(&dump.id).await,
            Err(Error::NotReady { .. })
        ));
    }

    analyzer.release(2);
    common::wait_until_terminal(&ctx, &bundle_id).await?;

    let mut names = HashSet::new();
    for dump in ctx.dumps.by_bundle(&bundle_id)? {
        assert_eq!(dump.status, DumpStatus::Finished);
        let downloaded = dump.file_path.clone().unwrap();
        assert!(downloaded.starts_with(dir.path()));
        assert_eq!(std::fs::read(&downloaded)?, b"MDMP test dump");
        let result = ctx.results.get_result(&dump.id).await?;
        names.insert(result.as_value()["Dump"]["FileName"].as_str().unwrap().to_string());
    }
    assert_eq!(
        names,
        HashSet::from(["test.dmp".to_string(), "test.thread2.dmp".to_string()])
    );

    ctx.shutdown().await;
    host.abort();
    Ok(())
}

/// Answers with a chunked body that ends before any data
async fn start_empty_chunked_host(port: u16) -> Result<tokio::task::JoinHandle<()>> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    Ok(tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                // Read the whole request head so closing does not reset the connection
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let mut response = b"HTTP/1.1 200 OK\r\n\
                    Content-Type: application/octet-stream\r\n\
                    Transfer-Encoding: chunked\r\n\
                    Connection: close\r\n\r\n"
                    .to_vec();
                if !request.starts_with(b"HEAD ") {
                    response.extend_from_slice(b"0\r\n\r\n");
                }
                let _ = stream.write_all(&response).await;
                let _ = stream.shutdown().await;
            });
        }
    }))
}

#[tokio::test]
async fn test_empty_chunked_source_fails_bundle() -> Result<()> {
    let port = 3136;
    let host = start_empty_chunked_host(port).await?;
    let dir = common::setup_temp_dir()?;
    let ctx = common::analyzing_context(dir.path())?;
    let handler = RequestHandler::new(Arc::clone(&ctx));

    // Without Content-Length the validator cannot tell the source is empty
    let url = format!("http://127.0.0.1:{}/empty.dmp", port);
    let Outcome::Created { bundle_id, .. } = handler.create_bundle(AnalysisInput::new(&url)).await
    else {
        panic!("admission of {} failed", url);
    };
    common::wait_until_terminal(&ctx, &bundle_id).await?;

    let bundle = ctx.bundles.get(&bundle_id).unwrap();
    assert!(bundle.dump_ids.is_empty());
    assert!(bundle.error.as_deref().unwrap_or_default().contains("no content"));
    assert!(ctx.dumps.by_bundle(&bundle_id)?.is_empty());
    let files = superdump::constants::bundle_files_dir(dir.path(), bundle_id.as_str());
    assert!(!files.join("empty.dmp").exists());

    ctx.shutdown().await;
    host.abort();
    Ok(())
}

/// Memory store that remembers which threads wrote to it
#[derive(Default)]
struct WriterThreads {
    inner: MemoryStore,
    writers: Mutex<Vec<ThreadId>>,
}

impl WriterThreads {
    fn record(&self) {
        self.writers.lock().unwrap().push(std::thread::current().id());
    }

    fn writers(&self) -> Vec<ThreadId> {
        self.writers.lock().unwrap().clone()
    }
}

impl MetadataStore for WriterThreads {
    fn load_bundles(&self) -> superdump::Result<Vec<BundleInfo>> {
        self.inner.load_bundles()
    }

    fn load_dumps(&self, bundle_id: &BundleIdentifier) -> superdump::Result<Vec<DumpInfo>> {
        self.inner.load_dumps(bundle_id)
    }

    fn save_bundle(&self, bundle: &BundleInfo) -> superdump::Result<()> {
        self.record();
        self.inner.save_bundle(bundle)
    }

    fn delete_bundle(&self, bundle_id: &BundleIdentifier) -> superdump::Result<()> {
        self.record();
        self.inner.delete_bundle(bundle_id)
    }

    fn save_dump(&self, dump: &DumpInfo) -> superdump::Result<()> {
        self.record();
        self.inner.save_dump(dump)
    }

    fn save_result(&self, id: &DumpIdentifier, result: &SdResult) -> superdump::Result<()> {
        self.record();
        self.inner.save_result(id, result)
    }

    fn load_result(&self, id: &DumpIdentifier) -> superdump::Result<Option<SdResult>> {
        self.inner.load_result(id)
    }

    fn describe(&self) -> String {
        "writer threads".to_string()
    }
}

#[tokio::test]
async fn test_store_writes_run_on_blocking_pool() -> Result<()> {
    // The test runtime is single-threaded: async code runs on this thread
    let runtime_thread = std::thread::current().id();
    let dir = common::setup_temp_dir()?;
    let uploads = common::setup_temp_dir()?;
    let dump = common::write_dump_file(uploads.path(), "crash.dmp")?;

    let store = Arc::new(WriterThreads::default());
    let ctx = Arc::new(AppContext::with_analyzer(
        common::test_settings(dir.path()),
        Arc::clone(&store) as Arc<dyn MetadataStore>,
        Arc::new(common::FakeAnalyzer),
    )?);
    let handler = RequestHandler::new(Arc::clone(&ctx));

    let Outcome::Created { bundle_id, .. } = handler
        .create_bundle(AnalysisInput::new(dump.to_string_lossy()))
        .await
    else {
        panic!("admission failed");
    };
    common::wait_until_terminal(&ctx, &bundle_id).await?;

    let first = ctx.dumps.by_bundle(&bundle_id)?.remove(0);
    let outcome = handler.rerun(bundle_id.as_str(), &first.id.dump_id).await;
    assert_eq!(outcome.status_code(), 200);
    common::wait_until_terminal(&ctx, &bundle_id).await?;

    // Failed analyses are recorded the same way
    let bad = common::write_dump_file(uploads.path(), "bad.dmp")?;
    let Outcome::Created { bundle_id: failed, .. } = handler
        .create_bundle(AnalysisInput::new(bad.to_string_lossy()))
        .await
    else {
        panic!("admission failed");
    };
    common::wait_until_terminal(&ctx, &failed).await?;
    assert!(
        ctx.dumps
            .by_bundle(&failed)?
            .iter()
            .all(|d| d.status == DumpStatus::Failed)
    );
    ctx.shutdown().await;

    let writers = store.writers();
    assert!(writers.len() > 5, "only {} writes recorded", writers.len());
    assert!(writers.iter().all(|id| *id != runtime_thread));
    Ok(())
}
