// JMESPath predicates evaluated over the local corpus
use super::{QueryIndex, build_corpus};
use crate::error::{Error, Result};
use crate::identifiers::DumpIdentifier;
use crate::repository::{BundleRepository, DumpRepository};
use async_trait::async_trait;
use rayon::prelude::*;
use std::sync::Arc;

/// Evaluates the expression against each dump document; a truthy result is
/// a match. Documents are the serialized view models without result payloads.
pub struct JmesPathIndex {
    bundles: Arc<BundleRepository>,
    dumps: Arc<DumpRepository>,
}

impl JmesPathIndex {
    pub fn new(bundles: Arc<BundleRepository>, dumps: Arc<DumpRepository>) -> Self {
        Self { bundles, dumps }
    }
}

fn evaluate(query: &str, documents: &[(DumpIdentifier, String)]) -> Result<Vec<DumpIdentifier>> {
    let expr = jmespath::compile(query).map_err(|e| Error::invalid_query(e.to_string()))?;

    let matches = documents
        .par_iter()
        .filter_map(|(id, json)| {
            let data = match jmespath::Variable::from_json(json) {
                Ok(data) => data,
                Err(e) => {
                    log::warn!("[Query] Skipping {}: {}", id, e);
                    return None;
                }
            };
            // Runtime errors (wrong argument types etc.) depend on the document
            match expr.search(&data) {
                Ok(result) if result.is_truthy() => Some(id.clone()),
                Ok(_) => None,
                Err(e) => {
                    log::debug!("[Query] {} on {}: {}", query, id, e);
                    None
                }
            }
        })
        .collect();
    Ok(matches)
}

#[async_trait]
impl QueryIndex for JmesPathIndex {
    async fn search(&self, query: &str) -> Result<Vec<DumpIdentifier>> {
        let documents = build_corpus(&self.bundles, &self.dumps)
            .into_iter()
            .map(|view| Ok((view.id().clone(), serde_json::to_string(&view)?)))
            .collect::<Result<Vec<_>>>()?;
        let query = query.to_string();
        tokio::task::spawn_blocking(move || evaluate(&query, &documents)).await?
    }

    fn name(&self) -> &str {
        "jmespath"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs() -> Vec<(DumpIdentifier, String)> {
        vec![
            (
                DumpIdentifier::from_parts("b1", "d1").unwrap(),
                r#"{"dump":{"status":"Finished","customProperties":{"product":"editor"}}}"#.into(),
            ),
            (
                DumpIdentifier::from_parts("b1", "d2").unwrap(),
                r#"{"dump":{"status":"Failed","customProperties":{}}}"#.into(),
            ),
        ]
    }

    #[test]
    fn test_truthy_results_match() {
        let hits = evaluate("dump.status == 'Finished'", &docs()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].dump_id, "d1");

        let hits = evaluate("dump.customProperties.product", &docs()).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_syntax_error_is_invalid_query() {
        let err = evaluate("dump.[", &docs()).unwrap_err();
        assert!(matches!(err, Error::InvalidQuery { .. }));
    }
}
