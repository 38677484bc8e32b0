// Wiring of repositories, pipeline and search into one application context
use crate::cache::ResultCache;
use crate::constants;
use crate::error::Result;
use crate::locks;
use crate::pipeline::{
    AnalysisPipeline, AnalysisQueue, Analyzer, CommandAnalyzer, DisabledPipeline, QueueConfig,
};
use crate::repository::{AnalysisReporter, BundleRepository, DumpRepository, SuperDumpRepository};
use crate::results::ResultStore;
use crate::runtime::ServiceRuntime;
use crate::search::{ElasticIndex, FingerprintIndex, JmesPathIndex, QueryIndex, SearchService};
use crate::settings::Settings;
use crate::storage::{FilesystemStore, MetadataStore};
use crate::validator::SourceValidator;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Everything a request handler needs, built once per process
pub struct AppContext {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn MetadataStore>,
    pub bundles: Arc<BundleRepository>,
    pub dumps: Arc<DumpRepository>,
    pub reporter: Arc<AnalysisReporter>,
    pub pipeline: Arc<dyn AnalysisPipeline>,
    pub superdump: Arc<SuperDumpRepository>,
    pub results: Arc<ResultStore>,
    pub search: Arc<SearchService>,
    pub validator: Arc<SourceValidator>,
    pub runtime: ServiceRuntime,
    background: Mutex<Option<JoinHandle<()>>>,
}

type PipelineParts = (Arc<dyn AnalysisPipeline>, Option<JoinHandle<()>>);

impl AppContext {
    /// Filesystem store under `settings.data_dir`; analyses run through the
    /// configured command, or are refused when none is configured
    pub fn open(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let store: Arc<dyn MetadataStore> = Arc::new(FilesystemStore::new(&settings.data_dir)?);
        let analyzer_settings = settings.analyzer.clone();
        let queue_config = queue_config(&settings);

        Self::build(settings, store, move |reporter, runtime| {
            if analyzer_settings.command.is_empty() {
                log::info!("[Context] No analyzer command configured, admissions will be refused");
                return Ok((Arc::new(DisabledPipeline), None));
            }
            let analyzer = CommandAnalyzer::new(
                &analyzer_settings.command,
                Duration::from_secs(analyzer_settings.timeout_secs),
            )?;
            let (queue, handle) =
                AnalysisQueue::start(Arc::new(analyzer), reporter, queue_config, runtime)?;
            Ok((Arc::new(queue), Some(handle)))
        })
    }

    /// Real queue driven by the given analyzer
    pub fn with_analyzer(
        settings: Settings,
        store: Arc<dyn MetadataStore>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Result<Self> {
        let queue_config = queue_config(&settings);
        Self::build(settings, store, move |reporter, runtime| {
            let (queue, handle) = AnalysisQueue::start(analyzer, reporter, queue_config, runtime)?;
            Ok((Arc::new(queue), Some(handle)))
        })
    }

    /// Caller-supplied pipeline; state changes go through `self.reporter`
    pub fn with_pipeline(
        settings: Settings,
        store: Arc<dyn MetadataStore>,
        pipeline: Arc<dyn AnalysisPipeline>,
    ) -> Result<Self> {
        Self::build(settings, store, move |_, _| Ok((pipeline, None)))
    }

    fn build<F>(settings: Settings, store: Arc<dyn MetadataStore>, make_pipeline: F) -> Result<Self>
    where
        F: FnOnce(Arc<AnalysisReporter>, &ServiceRuntime) -> Result<PipelineParts>,
    {
        let settings = Arc::new(settings);
        let runtime = ServiceRuntime::new();

        let bundles = Arc::new(BundleRepository::new(Arc::clone(&store)));
        let dumps = Arc::new(DumpRepository::new(Arc::clone(&store), Arc::clone(&bundles)));
        let bundle_count = bundles.populate()?;
        let dump_count = dumps.populate()?;
        log::info!(
            "[Context] Loaded {} bundles and {} dumps from {}",
            bundle_count,
            dump_count,
            store.describe()
        );

        let cache = Arc::new(ResultCache::new(constants::RESULT_CACHE_CAPACITY));
        let query_index: Arc<dyn QueryIndex> = match &settings.elastic {
            Some(elastic) => Arc::new(ElasticIndex::new(elastic, settings.search_timeout())?),
            None => Arc::new(JmesPathIndex::new(Arc::clone(&bundles), Arc::clone(&dumps))),
        };

        let reporter = Arc::new(AnalysisReporter::new(
            Arc::clone(&bundles),
            Arc::clone(&dumps),
            Arc::clone(&store),
            Arc::clone(&cache),
            Some(Arc::clone(&query_index)),
        ));
        let (pipeline, background) = make_pipeline(Arc::clone(&reporter), &runtime)?;

        let superdump = Arc::new(SuperDumpRepository::new(
            Arc::clone(&bundles),
            Arc::clone(&dumps),
            Arc::clone(&pipeline),
            Arc::clone(&cache),
            settings.use_automatic_dump_deletion,
        ));
        let results = Arc::new(ResultStore::new(
            Arc::clone(&bundles),
            Arc::clone(&dumps),
            Arc::clone(&store),
            cache,
        ));
        let search = Arc::new(
            SearchService::new(
                Arc::clone(&bundles),
                Arc::clone(&dumps),
                Arc::clone(&results),
                Arc::new(FingerprintIndex::new(Arc::clone(&dumps))),
                settings.search_timeout(),
            )
            .with_query_index(query_index)
            .with_duplicates_include_source(settings.duplicates_include_source),
        );
        let validator = Arc::new(SourceValidator::new(settings.source_probe_timeout())?);

        Ok(Self {
            settings,
            store,
            bundles,
            dumps,
            reporter,
            pipeline,
            superdump,
            results,
            search,
            validator,
            runtime,
            background: Mutex::new(background),
        })
    }

    /// Stop accepting jobs and wait for running analyses
    pub async fn shutdown(&self) {
        self.runtime.trigger_shutdown();
        let handle = locks::lock(&self.background).take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            log::error!("[Context] Analysis queue ended abnormally: {}", e);
        }
    }
}

fn queue_config(settings: &Settings) -> QueueConfig {
    let mut config = QueueConfig::new(&settings.data_dir);
    config.capacity = settings.analyzer.queue_capacity;
    config.max_concurrent = settings.analyzer.max_concurrent;
    config
}
