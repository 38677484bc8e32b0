// Bounded job queue with a concurrency-limited dispatcher
use super::{AnalysisJob, AnalysisPipeline, Analyzer};
use crate::constants;
use crate::error::{Error, Result};
use crate::identifiers::{BundleIdentifier, DumpIdentifier};
use crate::repository::AnalysisReporter;
use crate::runtime::ServiceRuntime;
use crate::validator::InputSource;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub capacity: usize,
    pub max_concurrent: usize,
    /// Fetched sources land in `<work_dir>/<bundle>/files/`
    pub work_dir: PathBuf,
    pub download_timeout: Duration,
}

impl QueueConfig {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            capacity: constants::DEFAULT_QUEUE_CAPACITY,
            max_concurrent: constants::DEFAULT_MAX_CONCURRENT_ANALYSES,
            work_dir: work_dir.into(),
            download_timeout: Duration::from_secs(constants::HTTP_DOWNLOAD_TIMEOUT_SECS),
        }
    }
}

pub struct AnalysisQueue {
    tx: mpsc::Sender<AnalysisJob>,
    capacity: usize,
    analyzer_name: String,
}

impl AnalysisQueue {
    /// Spawn the dispatcher. It stops taking jobs once `runtime` shuts down
    /// and waits for running analyses before the handle completes.
    pub fn start(
        analyzer: Arc<dyn Analyzer>,
        reporter: Arc<AnalysisReporter>,
        config: QueueConfig,
        runtime: &ServiceRuntime,
    ) -> Result<(Self, JoinHandle<()>)> {
        let capacity = config.capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let client = reqwest::Client::builder()
            .timeout(config.download_timeout)
            .user_agent(constants::user_agent())
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        let analyzer_name = analyzer.name().to_string();
        let worker = Arc::new(Worker {
            analyzer,
            reporter,
            work_dir: config.work_dir,
            client,
            download_timeout: config.download_timeout,
        });
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        let handle = tokio::spawn(dispatch(rx, worker, semaphore, runtime.shutdown_signal()));

        log::debug!(
            "[Queue] Started with capacity {} and {} workers",
            capacity,
            config.max_concurrent.max(1)
        );
        Ok((
            Self {
                tx,
                capacity,
                analyzer_name,
            },
            handle,
        ))
    }
}

impl AnalysisPipeline for AnalysisQueue {
    fn schedule(&self, job: AnalysisJob) -> Result<()> {
        log::debug!("[Queue] Scheduling {}", job);
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(job) => Error::upstream(
                "analysis queue",
                format!("queue is full ({} jobs), rejected {}", self.capacity, job),
            ),
            mpsc::error::TrySendError::Closed(job) => {
                Error::upstream("analysis queue", format!("not running, rejected {}", job))
            }
        })
    }

    fn describe(&self) -> String {
        format!("queue (analyzer: {})", self.analyzer_name)
    }

    fn pending(&self) -> usize {
        self.capacity.saturating_sub(self.tx.capacity())
    }
}

async fn dispatch(
    mut rx: mpsc::Receiver<AnalysisJob>,
    worker: Arc<Worker>,
    semaphore: Arc<Semaphore>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut running = JoinSet::new();

    loop {
        while running.try_join_next().is_some() {}

        let permit = tokio::select! {
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = shutdown.wait_for(|stop| *stop) => break,
        };
        let job = tokio::select! {
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
            _ = shutdown.wait_for(|stop| *stop) => break,
        };

        let worker = Arc::clone(&worker);
        running.spawn(async move {
            worker.run(job).await;
            drop(permit);
        });
    }

    // Jobs still in the channel are dropped; their dumps stay `Created`
    rx.close();
    if !running.is_empty() {
        log::info!("[Queue] Waiting for {} running analyses", running.len());
    }
    while let Some(result) = running.join_next().await {
        if let Err(e) = result {
            log::error!("[Queue] Analysis task error: {}", e);
        }
    }
    log::debug!("[Queue] Dispatcher stopped");
}

struct Worker {
    analyzer: Arc<dyn Analyzer>,
    reporter: Arc<AnalysisReporter>,
    work_dir: PathBuf,
    client: reqwest::Client,
    download_timeout: Duration,
}

/// Keep only the last path component of a client-supplied name
fn safe_file_name(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty() && n != "." && n != "..")
        .unwrap_or_else(|| "dump".to_string())
}

impl Worker {
    async fn run(&self, job: AnalysisJob) {
        match job {
            AnalysisJob::Bundle {
                bundle_id,
                source,
                filename,
            } => self.run_bundle(&bundle_id, &source, &filename).await,
            AnalysisJob::Rerun { dump_id, file_path } => {
                self.analyze_dump(&dump_id, &file_path).await
            }
        }
    }

    async fn run_bundle(&self, bundle_id: &BundleIdentifier, source: &InputSource, filename: &str) {
        let local = match self.fetch(bundle_id, source, filename).await {
            Ok(path) => path,
            Err(e) => {
                self.fail_bundle(bundle_id, &format!("fetching {} failed: {}", source, e))
                    .await;
                return;
            }
        };

        let found = match self.analyzer.discover(&local).await {
            Ok(found) if !found.is_empty() => found,
            Ok(_) => {
                self.fail_bundle(bundle_id, "no dump files found").await;
                return;
            }
            Err(e) => {
                self.fail_bundle(bundle_id, &format!("dump discovery failed: {}", e))
                    .await;
                return;
            }
        };

        let mut registered = Vec::with_capacity(found.len());
        for path in found {
            let name = safe_file_name(&path.to_string_lossy());
            let (bundle, file_name, file_path) = (bundle_id.clone(), name.clone(), path.clone());
            let outcome = self
                .report(move |reporter| reporter.register_dump(&bundle, &file_name, Some(file_path)))
                .await;
            match outcome {
                Ok(id) => registered.push((id, path)),
                Err(e) => log::error!("[Queue] Registering {} in {} failed: {}", name, bundle_id, e),
            }
        }

        for (id, path) in registered {
            self.analyze_dump(&id, &path).await;
        }
    }

    async fn analyze_dump(&self, id: &DumpIdentifier, path: &Path) {
        let key = id.clone();
        if let Err(e) = self.report(move |reporter| reporter.mark_analyzing(&key)).await {
            log::error!("[Queue] Cannot start analysis of {}: {}", id, e);
            return;
        }

        let key = id.clone();
        let recorded = match self.analyzer.analyze(path).await {
            Ok(result) => self.report(move |reporter| reporter.complete(&key, &result)).await,
            Err(e) => {
                let reason = e.to_string();
                self.report(move |reporter| reporter.fail(&key, &reason)).await
            }
        };
        if let Err(e) = recorded {
            log::error!("[Queue] Recording outcome of {} failed: {}", id, e);
            return;
        }

        if let Err(e) = self.reporter.publish(id).await {
            log::warn!("[Queue] Publishing {} to the query index failed: {}", id, e);
        }
    }

    async fn fail_bundle(&self, bundle_id: &BundleIdentifier, reason: &str) {
        let (key, reason) = (bundle_id.clone(), reason.to_string());
        if let Err(e) = self.report(move |reporter| reporter.fail_bundle(&key, &reason)).await {
            log::error!("[Queue] Recording failure of {} failed: {}", bundle_id, e);
        }
    }

    /// Reporter calls write through to the store; run them on the blocking pool
    async fn report<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&AnalysisReporter) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let reporter = Arc::clone(&self.reporter);
        tokio::task::spawn_blocking(move || f(&reporter)).await?
    }

    async fn fetch(&self, bundle_id: &BundleIdentifier, source: &InputSource, filename: &str) -> Result<PathBuf> {
        let dir = constants::bundle_files_dir(&self.work_dir, bundle_id.as_str());
        tokio::fs::create_dir_all(&dir).await?;
        let target = dir.join(safe_file_name(filename));

        let written = match source {
            InputSource::Local(path) => tokio::fs::copy(path, &target).await?,
            InputSource::Remote(url) => {
                let service = "source download";
                let mut response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|e| Error::from_http(service, self.download_timeout, e))?;
                if !response.status().is_success() {
                    return Err(Error::upstream(
                        service,
                        format!("{} answered {}", url, response.status()),
                    ));
                }
                let mut file = tokio::fs::File::create(&target).await?;
                let mut written: u64 = 0;
                while let Some(chunk) = response
                    .chunk()
                    .await
                    .map_err(|e| Error::from_http(service, self.download_timeout, e))?
                {
                    file.write_all(&chunk).await?;
                    written += chunk.len() as u64;
                }
                file.flush().await?;
                log::debug!("[Queue] Downloaded {} bytes from {}", written, url);
                written
            }
        };

        // Sources without Content-Length pass validation and may still be empty
        if written == 0 {
            if let Err(e) = tokio::fs::remove_file(&target).await {
                log::debug!("[Queue] Removing empty {} failed: {}", target.display(), e);
            }
            return Err(Error::invalid_source(format!("{} has no content", source)));
        }
        Ok(target)
    }
}
