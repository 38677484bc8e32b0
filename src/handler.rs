//! Transport-agnostic request handling
//!
//! Each operation returns an [`Outcome`], a closed set of caller-visible
//! results. The HTTP layer only maps outcomes to status codes; the CLI calls
//! the same handler directly.

use crate::bucket::bucketize;
use crate::constants;
use crate::context::AppContext;
use crate::error::Error;
use crate::identifiers::{BundleIdentifier, DumpIdentifier};
use crate::model::{AnalysisInput, DumpViewModel};
use crate::search::SearchMode;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Created {
        location: String,
        bundle_id: BundleIdentifier,
    },
    Ok(Value),
    BadRequest(String),
    NotFound(String),
    /// Exists but is not finished yet
    Pending(String),
    Unprocessable(String),
    Timeout(String),
    Unavailable(String),
    Internal(String),
}

impl Outcome {
    pub fn status_code(&self) -> u16 {
        match self {
            Outcome::Created { .. } => 201,
            Outcome::Ok(_) => 200,
            Outcome::BadRequest(_) => 400,
            Outcome::NotFound(_) => 404,
            Outcome::Pending(_) => 202,
            Outcome::Unprocessable(_) => 422,
            Outcome::Timeout(_) => 504,
            Outcome::Unavailable(_) => 502,
            Outcome::Internal(_) => 500,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Created { .. } | Outcome::Ok(_))
    }

    /// JSON body for the outcome
    pub fn body(&self) -> Value {
        match self {
            Outcome::Created {
                location,
                bundle_id,
            } => json!({ "bundleId": bundle_id, "location": location }),
            Outcome::Ok(value) => value.clone(),
            Outcome::Pending(reason) => json!({ "status": "pending", "message": reason }),
            Outcome::BadRequest(reason)
            | Outcome::NotFound(reason)
            | Outcome::Unprocessable(reason)
            | Outcome::Timeout(reason)
            | Outcome::Unavailable(reason)
            | Outcome::Internal(reason) => json!({ "error": reason }),
        }
    }
}

impl From<Error> for Outcome {
    fn from(e: Error) -> Self {
        let reason = e.to_string();
        match e {
            Error::InvalidSource { .. } | Error::InvalidQuery { .. } | Error::InvalidArgument(_) => {
                Outcome::BadRequest(reason)
            }
            Error::NoBundleProduced { .. } | Error::AnalysisFailed { .. } => {
                Outcome::Unprocessable(reason)
            }
            Error::NotFound { .. } => Outcome::NotFound(reason),
            Error::NotReady { .. } => Outcome::Pending(reason),
            Error::UpstreamTimeout { .. } => Outcome::Timeout(reason),
            Error::Upstream { .. } => Outcome::Unavailable(reason),
            Error::Config(_) | Error::Io(_) | Error::Json(_) => {
                log::error!("[Handler] Internal error: {}", reason);
                Outcome::Internal(reason)
            }
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Outcome {
    match serde_json::to_value(value) {
        Ok(v) => Outcome::Ok(v),
        Err(e) => Outcome::from(Error::Json(e)),
    }
}

/// Parse RFC 3339 (`2021-01-01T00:00:00Z`) or Unix seconds
pub fn parse_time(text: &str) -> Result<DateTime<Utc>, Error> {
    let text = text.trim();
    if let Ok(seconds) = text.parse::<i64>() {
        return Utc
            .timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| Error::InvalidArgument(format!("timestamp {} out of range", seconds)));
    }
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::InvalidArgument(format!("invalid time '{}': {}", text, e)))
}

/// Parameters of a histogram request
#[derive(Debug, Clone, Default)]
pub struct HeatmapRequest {
    pub query: Option<String>,
    pub mode: Option<String>,
    pub bucket_seconds: Option<u32>,
    pub start: Option<String>,
    pub stop: Option<String>,
}

#[derive(Clone)]
pub struct RequestHandler {
    ctx: Arc<AppContext>,
    start_time: Instant,
}

impl RequestHandler {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            ctx,
            start_time: Instant::now(),
        }
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.ctx
    }

    pub fn status(&self) -> Outcome {
        let settings = &self.ctx.settings;
        Outcome::Ok(json!({
            "server": {
                "version": constants::VERSION,
                "uptimeSeconds": self.start_time.elapsed().as_secs(),
            },
            "bundles": self.ctx.bundles.len(),
            "dumps": self.ctx.dumps.len(),
            "pipeline": {
                "description": self.ctx.pipeline.describe(),
                "pending": self.ctx.pipeline.pending(),
            },
            "store": self.ctx.store.describe(),
            "queryIndex": self.ctx.search.query_index_name(),
            "retention": {
                "useAutomaticDumpDeletion": self.ctx.superdump.use_automatic_dump_deletion(),
                "dumpRetentionDays": settings.dump_retention_days,
            },
        }))
    }

    /// Validate the source, then admit it
    pub async fn create_bundle(&self, input: AnalysisInput) -> Outcome {
        let resolved = match self.ctx.validator.resolve(&input.url).await {
            Ok(resolved) => resolved,
            Err(e) => {
                log::info!("[Handler] Rejected source {}: {}", input.url, e);
                return Outcome::BadRequest(e.to_string());
            }
        };
        let Some(filename) = input.filename.clone().or(resolved.filename) else {
            return Outcome::BadRequest(format!(
                "cannot derive a file name from {}, pass one explicitly",
                input.url
            ));
        };

        let ctx = Arc::clone(&self.ctx);
        let admitted = tokio::task::spawn_blocking(move || {
            ctx.superdump.process_input_file(&filename, &input)
        })
        .await
        .map_err(Error::from)
        .and_then(|r| r);
        match admitted {
            Ok(bundle_id) => Outcome::Created {
                location: constants::bundle_location(bundle_id.as_str()),
                bundle_id,
            },
            Err(e) => Outcome::from(e),
        }
    }

    pub fn list_bundles(&self) -> Outcome {
        to_json(&self.ctx.bundles.all())
    }

    pub fn get_bundle(&self, bundle: &str) -> Outcome {
        let Ok(id) = bundle.parse::<BundleIdentifier>() else {
            return Outcome::NotFound(format!("bundle {} not found", bundle));
        };
        let Some(info) = self.ctx.bundles.get(&id) else {
            return Outcome::from(Error::not_found(format!("bundle {}", id)));
        };
        let dumps = match self.ctx.dumps.by_bundle(&id) {
            Ok(dumps) => dumps,
            Err(e) => return Outcome::from(e),
        };
        let terminal = match self.ctx.superdump.is_bundle_terminal(&id) {
            Ok(terminal) => terminal,
            Err(e) => return Outcome::from(e),
        };
        to_json(&json!({ "bundle": info, "dumps": dumps, "terminal": terminal }))
    }

    fn dump_id(bundle: &str, dump: &str) -> Result<DumpIdentifier, Outcome> {
        DumpIdentifier::from_parts(bundle, dump)
            .map_err(|_| Outcome::NotFound(format!("dump {}:{} not found", bundle, dump)))
    }

    pub fn get_dump(&self, bundle: &str, dump: &str) -> Outcome {
        let id = match Self::dump_id(bundle, dump) {
            Ok(id) => id,
            Err(outcome) => return outcome,
        };
        let Some(bundle_info) = self.ctx.bundles.get(&id.bundle_id) else {
            return Outcome::from(Error::not_found(format!("bundle {}", id.bundle_id)));
        };
        match self.ctx.dumps.get(&id) {
            Some(info) => to_json(&DumpViewModel::new(&bundle_info, info)),
            None => Outcome::from(Error::not_found(format!("dump {}", id))),
        }
    }

    pub async fn get_result(&self, bundle: &str, dump: &str) -> Outcome {
        let id = match Self::dump_id(bundle, dump) {
            Ok(id) => id,
            Err(outcome) => return outcome,
        };
        match self.ctx.results.get_result(&id).await {
            Ok(result) => to_json(result.as_ref()),
            Err(e) => Outcome::from(e),
        }
    }

    pub async fn rerun(&self, bundle: &str, dump: &str) -> Outcome {
        let id = match Self::dump_id(bundle, dump) {
            Ok(id) => id,
            Err(outcome) => return outcome,
        };
        let ctx = Arc::clone(&self.ctx);
        let key = id.clone();
        let scheduled = tokio::task::spawn_blocking(move || ctx.superdump.rerun(&key))
            .await
            .map_err(Error::from)
            .and_then(|r| r);
        match scheduled {
            Ok(()) => Outcome::Ok(json!({ "scheduled": id.to_string() })),
            Err(e) => Outcome::from(e),
        }
    }

    async fn run_search(
        &self,
        query: Option<&str>,
        mode: Option<&str>,
        include_details: bool,
    ) -> Result<Vec<DumpViewModel>, Error> {
        let mode: SearchMode = mode.unwrap_or_default().parse()?;
        self.ctx.search.search(mode, query, include_details).await
    }

    pub async fn search(&self, query: Option<&str>, mode: Option<&str>, include_details: bool) -> Outcome {
        match self.run_search(query, mode, include_details).await {
            Ok(views) => to_json(&views),
            Err(e) => Outcome::from(e),
        }
    }

    /// Histogram of search hits over time. Defaults: hourly buckets over the
    /// last year up to now.
    pub async fn heatmap(&self, request: &HeatmapRequest) -> Outcome {
        let stop = match request.stop.as_deref().map(parse_time).transpose() {
            Ok(stop) => stop.unwrap_or_else(Utc::now),
            Err(e) => return Outcome::from(e),
        };
        let start = match request.start.as_deref().map(parse_time).transpose() {
            Ok(start) => start.unwrap_or_else(|| {
                stop - ChronoDuration::days(constants::DEFAULT_HEATMAP_RANGE_DAYS)
            }),
            Err(e) => return Outcome::from(e),
        };
        let bucket_seconds = request
            .bucket_seconds
            .unwrap_or(self.ctx.settings.heatmap_bucket_seconds);

        let views = match self
            .run_search(request.query.as_deref(), request.mode.as_deref(), false)
            .await
        {
            Ok(views) => views,
            Err(e) => return Outcome::from(e),
        };
        match bucketize(&views, bucket_seconds, start, stop) {
            Ok(histogram) => to_json(&histogram),
            Err(e) => Outcome::from(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DumpStatus;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        let id = DumpIdentifier::from_parts("b", "d").unwrap();
        let cases: Vec<(Error, u16)> = vec![
            (Error::invalid_source("x"), 400),
            (Error::invalid_query("x"), 400),
            (Error::NoBundleProduced { reason: "x".into() }, 422),
            (Error::not_found("bundle b"), 404),
            (
                Error::NotReady {
                    id: id.clone(),
                    status: DumpStatus::Analyzing,
                },
                202,
            ),
            (
                Error::UpstreamTimeout {
                    service: "index".into(),
                    timeout: Duration::from_secs(1),
                },
                504,
            ),
            (Error::upstream("index", "down"), 502),
            (Error::Config("x".into()), 500),
        ];
        for (error, code) in cases {
            assert_eq!(Outcome::from(error).status_code(), code);
        }
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("1609459200").unwrap().timestamp(), 1_609_459_200);
        assert_eq!(
            parse_time("2021-01-01T01:00:00Z").unwrap().timestamp(),
            1_609_462_800
        );
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn test_created_body() {
        let outcome = Outcome::Created {
            location: constants::bundle_location("abc"),
            bundle_id: BundleIdentifier::new("abc").unwrap(),
        };
        assert_eq!(outcome.status_code(), 201);
        assert_eq!(outcome.body()["location"], "/api/bundles/abc");
    }
}
