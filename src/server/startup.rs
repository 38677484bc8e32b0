// Server startup and initialization logic
// Opens the data directory, wires the application context and runs axum
// until Ctrl+C or a programmatic shutdown.

use crate::constants;
use crate::context::AppContext;
use crate::handler::RequestHandler;
use crate::server::{Server, ServerConfig};
use crate::settings::Settings;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for server startup
pub struct StartupConfig {
    pub dir: PathBuf,
    pub host: String,
    pub port: u16,
    /// Overrides `analyzer.command` from the settings file when set
    pub analyzer_command: Option<Vec<String>>,
    /// Overrides `elastic.url` from the settings file when set
    pub elastic_url: Option<String>,
    pub enable_cors: bool,
    pub verbose: bool,
}

/// Load settings from the data directory and apply command line overrides
pub fn load_settings(config: &StartupConfig) -> Result<Settings> {
    let mut settings = Settings::load_or_default(&config.dir)
        .with_context(|| format!("Failed to load settings from {}", config.dir.display()))?;

    if let Some(command) = &config.analyzer_command {
        settings.analyzer.command = command.clone();
    }
    if let Some(url) = &config.elastic_url {
        let mut elastic = settings.elastic.take().unwrap_or_default();
        elastic.url = url.clone();
        settings.elastic = Some(elastic);
    }
    if config.verbose {
        log::debug!("[Startup] Effective settings: {:?}", settings);
    }
    Ok(settings)
}

/// Main server startup function that orchestrates all initialization
pub async fn start_server(config: StartupConfig) -> Result<()> {
    let settings = load_settings(&config)?;
    let ctx = Arc::new(AppContext::open(settings).context("Failed to open data directory")?);

    let addr = format!("{}:{}", config.host, config.port);
    let socket_addr: SocketAddr = addr.parse().context("Invalid address format")?;

    let server_config = ServerConfig {
        version: constants::VERSION.to_string(),
        enable_cors: config.enable_cors,
    };
    let server = Server::new(RequestHandler::new(Arc::clone(&ctx)), server_config);
    let app = server.router();

    let listener = tokio::net::TcpListener::bind(socket_addr)
        .await
        .context("Failed to bind to address")?;

    display_server_info(&ctx, &addr);
    eprintln!("\nPress Ctrl+C to stop\n");

    axum::serve(listener, app)
        .with_graceful_shutdown(ctx.runtime.create_shutdown_future())
        .await
        .context("Server error")?;

    // Running analyses finish; queued jobs stay Created for the next start
    ctx.shutdown().await;
    log::info!("[Startup] Server stopped");
    Ok(())
}

fn display_server_info(ctx: &AppContext, addr: &str) {
    eprintln!("{} v{} HTTP server started", constants::BINARY_NAME, constants::VERSION);
    eprintln!("  Directory: {}", ctx.settings.data_dir.display());
    eprintln!("  Listening: http://{}", addr);
    eprintln!("  Pipeline:  {}", ctx.pipeline.describe());
    match ctx.search.query_index_name() {
        Some(name) => eprintln!("  Query index: {}", name),
        None => eprintln!("  Query index: none"),
    }
    eprintln!(
        "  Bundles: {} ({} dumps)",
        ctx.bundles.len(),
        ctx.dumps.len()
    );
    if ctx.settings.use_automatic_dump_deletion {
        eprintln!(
            "  Retention: automatic deletion after {} days (external job)",
            ctx.settings.dump_retention_days
        );
    }
}
