// Dump, result and rerun handlers

use crate::server::ServerState;
use crate::server::error::outcome_response;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
};

pub async fn handle_dump(
    State(state): State<ServerState>,
    Path((bundle, dump)): Path<(String, String)>,
) -> impl IntoResponse {
    outcome_response(state.handler.get_dump(&bundle, &dump))
}

/// 202 while the analysis is still running
pub async fn handle_dump_result(
    State(state): State<ServerState>,
    Path((bundle, dump)): Path<(String, String)>,
) -> impl IntoResponse {
    outcome_response(state.handler.get_result(&bundle, &dump).await)
}

pub async fn handle_dump_rerun(
    State(state): State<ServerState>,
    Path((bundle, dump)): Path<(String, String)>,
) -> impl IntoResponse {
    outcome_response(state.handler.rerun(&bundle, &dump).await)
}
