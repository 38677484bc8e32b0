// Route setup and configuration

use crate::handler::RequestHandler;
use crate::server::ServerState;
use crate::server::config::ServerConfig;
use crate::server::error::not_found;
use crate::server::{
    handle_bundle, handle_create_bundle, handle_dump, handle_dump_rerun, handle_dump_result,
    handle_heatmap, handle_list_bundles, handle_root, handle_search, handle_status,
};
use axum::Router;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

async fn handle_fallback() -> impl IntoResponse {
    not_found("no such endpoint")
}

pub fn create_router(handler: RequestHandler, config: ServerConfig, start_time: Instant) -> Router {
    let router = Router::new()
        .route("/", get(handle_root))
        .route("/status", get(handle_status))
        .route("/api/bundles", post(handle_create_bundle).get(handle_list_bundles))
        .route("/api/bundles/{bundle}", get(handle_bundle))
        .route("/api/dumps/{bundle}/{dump}", get(handle_dump))
        .route("/api/dumps/{bundle}/{dump}/result", get(handle_dump_result))
        .route("/api/dumps/{bundle}/{dump}/rerun", post(handle_dump_rerun))
        .route("/api/search", get(handle_search))
        .route("/api/heatmap", get(handle_heatmap))
        .fallback(handle_fallback);

    let router = if config.enable_cors {
        router.layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
    } else {
        router
    };

    router.with_state(ServerState {
        handler,
        config,
        start_time,
    })
}
