// Elasticsearch query_string collaborator
use super::QueryIndex;
use crate::constants;
use crate::error::{Error, Result};
use crate::identifiers::DumpIdentifier;
use crate::model::DumpViewModel;
use crate::settings::ElasticSettings;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use std::time::Duration;

const SERVICE: &str = "elasticsearch";

pub struct ElasticIndex {
    client: reqwest::Client,
    base_url: String,
    index: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Deserialize)]
struct Hits {
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
}

impl ElasticIndex {
    pub fn new(settings: &ElasticSettings, timeout: Duration) -> Result<Self> {
        if settings.url.trim().is_empty() {
            return Err(Error::Config("elastic.url must not be empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(constants::user_agent())
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: settings.url.trim_end_matches('/').to_string(),
            index: settings.index.clone(),
            timeout,
        })
    }

    fn endpoint(&self, suffix: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.index, suffix)
    }

    /// Pull the human readable reason out of an error body
    fn error_reason(body: &str) -> String {
        serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                v.pointer("/error/root_cause/0/reason")
                    .or_else(|| v.pointer("/error/reason"))
                    .and_then(|r| r.as_str().map(str::to_string))
            })
            .unwrap_or_else(|| body.chars().take(200).collect())
    }
}

#[async_trait]
impl QueryIndex for ElasticIndex {
    async fn search(&self, query: &str) -> Result<Vec<DumpIdentifier>> {
        let body = json!({
            "query": { "query_string": { "query": query } },
            "size": constants::ELASTIC_MAX_HITS,
            "_source": false,
        });
        let response = self
            .client
            .post(self.endpoint("_search"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::from_http(SERVICE, self.timeout, e))?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::invalid_query(Self::error_reason(&text)));
        }
        if !status.is_success() {
            return Err(Error::upstream(SERVICE, format!("search answered {}", status)));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| Error::from_http(SERVICE, self.timeout, e))?;
        Ok(parsed
            .hits
            .hits
            .into_iter()
            .filter_map(|hit| match DumpIdentifier::from_str(&hit.id) {
                Ok(id) => Some(id),
                Err(_) => {
                    log::warn!("[Elastic] Ignoring foreign document id {}", hit.id);
                    None
                }
            })
            .collect())
    }

    async fn index(&self, view: &DumpViewModel) -> Result<()> {
        let response = self
            .client
            .put(self.endpoint(&format!("_doc/{}", view.id())))
            .json(view)
            .send()
            .await
            .map_err(|e| Error::from_http(SERVICE, self.timeout, e))?;
        if !response.status().is_success() {
            return Err(Error::upstream(
                SERVICE,
                format!("indexing {} answered {}", view.id(), response.status()),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        SERVICE
    }
}
