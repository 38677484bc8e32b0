// Search and heatmap handlers

use crate::handler::HeatmapRequest;
use crate::server::ServerState;
use crate::server::error::outcome_response;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    q: Option<String>,
    mode: Option<String>,
    #[serde(default)]
    details: bool,
}

#[derive(Debug, Deserialize)]
pub struct HeatmapParams {
    q: Option<String>,
    mode: Option<String>,
    bucket: Option<u32>,
    start: Option<String>,
    stop: Option<String>,
}

pub async fn handle_search(
    State(state): State<ServerState>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    outcome_response(
        state
            .handler
            .search(params.q.as_deref(), params.mode.as_deref(), params.details)
            .await,
    )
}

pub async fn handle_heatmap(
    State(state): State<ServerState>,
    Query(params): Query<HeatmapParams>,
) -> impl IntoResponse {
    let request = HeatmapRequest {
        query: params.q,
        mode: params.mode,
        bucket_seconds: params.bucket,
        start: params.start,
        stop: params.stop,
    };
    outcome_response(state.handler.heatmap(&request).await)
}
