//! Search over the dump corpus
//!
//! Three strategies share one output shape, a list of [`DumpViewModel`], so
//! downstream consumers such as [`crate::bucket::bucketize`] never care how a
//! list was produced:
//!
//! - simple filter: whitespace tokens matched against the searchable fields
//! - query: an expression handed to a [`QueryIndex`]
//! - duplicates: dumps a [`DuplicateIndex`] considers equivalent to a given one
//!
//! Calls into external indexes are bounded by the configured search timeout.

mod duplicates;
mod elastic;
mod query;
mod simple;

pub use duplicates::FingerprintIndex;
pub use elastic::ElasticIndex;
pub use query::JmesPathIndex;
pub use simple::SimpleFilter;

use crate::error::{Error, Result};
use crate::identifiers::{BundleIdentifier, DumpIdentifier};
use crate::model::{BundleInfo, DumpInfo, DumpStatus, DumpViewModel};
use crate::repository::{BundleRepository, DumpRepository};
use crate::results::ResultStore;
use async_trait::async_trait;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Structured-query collaborator
#[async_trait]
pub trait QueryIndex: Send + Sync {
    /// Identifiers of the dumps matching `query`.
    /// An expression the index cannot parse fails with `InvalidQuery`.
    async fn search(&self, query: &str) -> Result<Vec<DumpIdentifier>>;

    /// Push a changed dump to the index
    async fn index(&self, _view: &DumpViewModel) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str;
}

/// Similarity collaborator
#[async_trait]
pub trait DuplicateIndex: Send + Sync {
    async fn find_duplicates(&self, dump: &DumpInfo) -> Result<Vec<DumpIdentifier>>;

    fn name(&self) -> &str;
}

/// Search mode as selected by callers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchMode {
    #[default]
    Simple,
    Query,
    Duplicates,
}

impl FromStr for SearchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "simple" | "" => Ok(SearchMode::Simple),
            "query" | "elastic" => Ok(SearchMode::Query),
            "duplicates" => Ok(SearchMode::Duplicates),
            other => Err(Error::InvalidArgument(format!(
                "unknown search mode '{}' (expected simple, query or duplicates)",
                other
            ))),
        }
    }
}

/// Every dump joined with its bundle
pub(crate) fn build_corpus(bundles: &BundleRepository, dumps: &DumpRepository) -> Vec<DumpViewModel> {
    let by_id: HashMap<BundleIdentifier, BundleInfo> =
        bundles.all().into_iter().map(|b| (b.id.clone(), b)).collect();
    dumps
        .all()
        .into_iter()
        .filter_map(|dump| {
            let bundle = by_id.get(&dump.id.bundle_id)?;
            Some(DumpViewModel::new(bundle, dump))
        })
        .collect()
}

pub struct SearchService {
    bundles: Arc<BundleRepository>,
    dumps: Arc<DumpRepository>,
    results: Arc<ResultStore>,
    query_index: Option<Arc<dyn QueryIndex>>,
    duplicate_index: Arc<dyn DuplicateIndex>,
    include_source: bool,
    timeout: Duration,
}

impl SearchService {
    pub fn new(
        bundles: Arc<BundleRepository>,
        dumps: Arc<DumpRepository>,
        results: Arc<ResultStore>,
        duplicate_index: Arc<dyn DuplicateIndex>,
        timeout: Duration,
    ) -> Self {
        Self {
            bundles,
            dumps,
            results,
            query_index: None,
            duplicate_index,
            include_source: true,
            timeout,
        }
    }

    pub fn with_query_index(mut self, index: Arc<dyn QueryIndex>) -> Self {
        self.query_index = Some(index);
        self
    }

    /// Whether duplicate search lists the queried dump itself
    pub fn with_duplicates_include_source(mut self, include: bool) -> Self {
        self.include_source = include;
        self
    }

    pub fn query_index_name(&self) -> Option<&str> {
        self.query_index.as_deref().map(|i| i.name())
    }

    /// Dispatch on `mode`; `text` is the filter, query or dump identifier
    pub async fn search(
        &self,
        mode: SearchMode,
        text: Option<&str>,
        include_details: bool,
    ) -> Result<Vec<DumpViewModel>> {
        match mode {
            SearchMode::Simple => self.search_by_simple_filter(text, include_details).await,
            SearchMode::Query => {
                self.search_by_elastic_filter(text.unwrap_or_default(), include_details)
                    .await
            }
            SearchMode::Duplicates => {
                let raw = text.unwrap_or_default().trim();
                let id = DumpIdentifier::from_str(raw).map_err(|_| {
                    Error::InvalidArgument(format!("'{}' is not a dump identifier", raw))
                })?;
                self.search_duplicates(&id, include_details).await
            }
        }
    }

    /// A blank or missing filter lists the whole corpus
    pub async fn search_by_simple_filter(
        &self,
        filter: Option<&str>,
        include_details: bool,
    ) -> Result<Vec<DumpViewModel>> {
        let corpus = build_corpus(&self.bundles, &self.dumps);
        let mut views = match SimpleFilter::parse(filter) {
            None => corpus,
            Some(filter) => corpus
                .into_par_iter()
                .filter(|view| filter.matches(view))
                .collect(),
        };
        log::debug!(
            "[Search] Simple filter {:?} matched {} dumps",
            filter.unwrap_or_default(),
            views.len()
        );
        if include_details {
            self.attach_details(&mut views).await;
        }
        Ok(views)
    }

    pub async fn search_by_elastic_filter(
        &self,
        query: &str,
        include_details: bool,
    ) -> Result<Vec<DumpViewModel>> {
        let index = self
            .query_index
            .as_ref()
            .ok_or_else(|| Error::upstream("query index", "no query index configured"))?;
        if query.trim().is_empty() {
            return Err(Error::invalid_query("empty query"));
        }

        let ids = self.bounded(index.name(), index.search(query)).await?;
        let mut views = self.views_of(&ids);
        log::debug!(
            "[Search] Query {:?} on {}: {} hits, {} known",
            query,
            index.name(),
            ids.len(),
            views.len()
        );
        if include_details {
            self.attach_details(&mut views).await;
        }
        Ok(views)
    }

    pub async fn search_duplicates(
        &self,
        id: &DumpIdentifier,
        include_details: bool,
    ) -> Result<Vec<DumpViewModel>> {
        if !self.bundles.contains(&id.bundle_id) {
            return Err(Error::not_found(format!("bundle {}", id.bundle_id)));
        }
        let dump = self
            .dumps
            .get(id)
            .ok_or_else(|| Error::not_found(format!("dump {}", id)))?;

        let found = self
            .bounded(
                self.duplicate_index.name(),
                self.duplicate_index.find_duplicates(&dump),
            )
            .await?;

        let mut seen = HashSet::new();
        let mut ids: Vec<DumpIdentifier> = Vec::with_capacity(found.len() + 1);
        if self.include_source {
            seen.insert(id.clone());
            ids.push(id.clone());
        }
        for candidate in found {
            if &candidate != id && seen.insert(candidate.clone()) {
                ids.push(candidate);
            }
        }

        let mut views = self.views_of(&ids);
        if include_details {
            self.attach_details(&mut views).await;
        }
        Ok(views)
    }

    async fn bounded<T, F>(&self, service: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("[Search] {} did not answer within {:?}", service, self.timeout);
                Err(Error::UpstreamTimeout {
                    service: service.to_string(),
                    timeout: self.timeout,
                })
            }
        }
    }

    fn views_of(&self, ids: &[DumpIdentifier]) -> Vec<DumpViewModel> {
        ids.iter()
            .filter_map(|id| {
                let bundle = self.bundles.get(&id.bundle_id)?;
                let dump = self.dumps.get(id)?;
                Some(DumpViewModel::new(&bundle, dump))
            })
            .collect()
    }

    async fn attach_details(&self, views: &mut [DumpViewModel]) {
        for view in views.iter_mut() {
            if view.dump.status != DumpStatus::Finished {
                continue;
            }
            match self.results.get_result(view.id()).await {
                Ok(result) => view.result = Some(result),
                Err(e) => log::debug!("[Search] No details for {}: {}", view.id(), e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("simple".parse::<SearchMode>().unwrap(), SearchMode::Simple);
        assert_eq!("Query".parse::<SearchMode>().unwrap(), SearchMode::Query);
        assert_eq!("elastic".parse::<SearchMode>().unwrap(), SearchMode::Query);
        assert_eq!(
            "duplicates".parse::<SearchMode>().unwrap(),
            SearchMode::Duplicates
        );
        assert!("fuzzy".parse::<SearchMode>().is_err());
    }
}
