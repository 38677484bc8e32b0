// Bundle admission and lookup handlers

use crate::model::AnalysisInput;
use crate::server::ServerState;
use crate::server::error::{bad_request, outcome_response};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    response::IntoResponse,
};

pub async fn handle_create_bundle(
    State(state): State<ServerState>,
    payload: Result<Json<AnalysisInput>, JsonRejection>,
) -> impl IntoResponse {
    let Json(input) = match payload {
        Ok(input) => input,
        Err(e) => return bad_request(&e.body_text()).into_response(),
    };
    outcome_response(state.handler.create_bundle(input).await)
}

pub async fn handle_list_bundles(State(state): State<ServerState>) -> impl IntoResponse {
    outcome_response(state.handler.list_bundles())
}

pub async fn handle_bundle(
    State(state): State<ServerState>,
    Path(bundle): Path<String>,
) -> impl IntoResponse {
    outcome_response(state.handler.get_bundle(&bundle))
}
