// HTTP server exposing admission, retrieval and search

mod config;
mod error;
mod handle_bundle;
mod handle_dump;
mod handle_search;
mod handle_status;
mod routes;
pub mod startup;

use crate::handler::RequestHandler;
use axum::Router;
use std::time::Instant;

pub use config::ServerConfig;
pub use routes::create_router;
pub use startup::{StartupConfig, start_server};

pub(crate) use handle_bundle::*;
pub(crate) use handle_dump::*;
pub(crate) use handle_search::*;
pub(crate) use handle_status::*;

#[derive(Clone)]
pub struct ServerState {
    pub handler: RequestHandler,
    pub config: ServerConfig,
    pub start_time: Instant,
}

pub struct Server {
    handler: RequestHandler,
    config: ServerConfig,
    start_time: Instant,
}

impl Server {
    pub fn new(handler: RequestHandler, config: ServerConfig) -> Self {
        Self {
            handler,
            config,
            start_time: Instant::now(),
        }
    }

    pub fn router(&self) -> Router {
        create_router(self.handler.clone(), self.config.clone(), self.start_time)
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }
}
