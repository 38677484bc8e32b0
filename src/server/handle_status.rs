// Root page and status handlers

use crate::constants;
use crate::server::ServerState;
use crate::server::error::outcome_response;
use axum::{extract::State, http::StatusCode, response::IntoResponse};

pub async fn handle_root(State(state): State<ServerState>) -> impl IntoResponse {
    let ctx = state.handler.context();
    let mut response = String::new();

    response.push_str(&format!("{} server v{}\n\n", constants::BINARY_NAME, state.config.version));
    response.push_str("Crash-dump bundle ingestion, analysis and search\n");
    response.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    response.push_str(&format!("  Bundles:   {}\n", ctx.bundles.len()));
    response.push_str(&format!("  Dumps:     {}\n", ctx.dumps.len()));
    response.push_str(&format!("  Pipeline:  {}\n", ctx.pipeline.describe()));
    response.push_str(&format!("  Uptime:    {}s\n\n", state.start_time.elapsed().as_secs()));

    response.push_str("Endpoints\n");
    response.push_str("━━━━━━━━━\n");
    response.push_str("  GET  /status\n");
    response.push_str("  POST /api/bundles                          {\"url\": ..., \"customProperties\": {...}}\n");
    response.push_str("  GET  /api/bundles\n");
    response.push_str("  GET  /api/bundles/{bundle}\n");
    response.push_str("  GET  /api/dumps/{bundle}/{dump}\n");
    response.push_str("  GET  /api/dumps/{bundle}/{dump}/result\n");
    response.push_str("  POST /api/dumps/{bundle}/{dump}/rerun\n");
    response.push_str("  GET  /api/search?q=&mode=simple|query|duplicates&details=\n");
    response.push_str("  GET  /api/heatmap?q=&mode=&bucket=&start=&stop=\n");

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; charset=utf-8")],
        response,
    )
}

pub async fn handle_status(State(state): State<ServerState>) -> impl IntoResponse {
    outcome_response(state.handler.status())
}
