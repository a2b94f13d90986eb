//! The single entry point of the pipeline.
//!
//! A [`Searcher`] owns everything that is read-only across requests: the
//! configuration, the namespace registry, the escaper, the error classifier
//! and the executor with its admission pools. Every request flows through
//! the same value pipeline:
//!
//! ```text
//! RawQuery -> ParsedQuery -> AssembledQuery -> (dump | execute) -> SearchOutput
//! ```
//!
//! A backend parse error gets exactly one more attempt with the degraded
//! query. Every other failure is surfaced as a [`SearchFailure`].

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::SearchBackend;
use crate::classify::Classifier;
use crate::config::SearchConfig;
use crate::error::{Result, SearchFailure, keys};
use crate::executor::metrics::{ExecutionMetrics, ExecutionTiming};
use crate::executor::pool::OpClass;
use crate::executor::{ExecutionFailure, ExecutionOutcome, Executor};
use crate::namespace::NamespaceRegistry;
use crate::query::assembled::AssembledQuery;
use crate::query::boost::BoostSpec;
use crate::query::builder::QueryBuilder;
use crate::query::escaper::Escaper;
use crate::query::extractor::{Extractor, StageContext};
use crate::query::parsed::{ParsedQuery, RawQuery};
use crate::results::{ResultTransformer, SearchOutput};

/// A successful search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub output: SearchOutput,

    /// Message keys of non-fatal problems (partial results, degraded query).
    pub warnings: Vec<&'static str>,

    /// The results come from the degraded fallback query.
    pub degraded: bool,

    /// Timing of the attempt that produced the results.
    pub timing: ExecutionTiming,

    /// Correlates log lines of one request.
    pub request_id: String,
}

/// What would be sent to the backend, without sending it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dump {
    /// Search endpoint path, `None` for an empty query.
    pub path: Option<String>,
    pub op_class: Option<OpClass>,
    pub params: Vec<(String, String)>,
    pub body: Value,
}

/// Runs queries end to end.
#[derive(Debug)]
pub struct Searcher {
    config: SearchConfig,
    registry: NamespaceRegistry,
    escaper: Escaper,
    classifier: Classifier,
    executor: Executor,
}

impl Searcher {
    pub fn new(config: SearchConfig, backend: Arc<dyn SearchBackend>) -> Result<Self> {
        config.validate()?;
        let registry = NamespaceRegistry::new(&config.namespaces);
        let escaper = Escaper::new(config.language.corpus_language.clone());
        let classifier = Classifier::new(&config.classifier)?;
        let executor = Executor::new(backend, &config.pools);
        Ok(Searcher {
            config,
            registry,
            escaper,
            classifier,
            executor,
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn registry(&self) -> &NamespaceRegistry {
        &self.registry
    }

    /// Counters of the executor.
    pub fn metrics(&self) -> ExecutionMetrics {
        self.executor.metrics()
    }

    /// Extract clauses and escape the remaining text.
    pub fn parse(&self, raw: &RawQuery) -> ParsedQuery {
        let context = StageContext {
            namespaces: &self.registry,
            recency: &self.config.recency,
            regex_enabled: self.config.regex.enabled,
        };
        Extractor::new(context, &self.escaper).extract(&raw.text)
    }

    fn builder(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(&self.config, &self.registry)
    }

    /// Build the full request for a parsed query. `None` when there is
    /// nothing to search for.
    pub fn assemble(&self, parsed: &ParsedQuery, raw: &RawQuery) -> Option<AssembledQuery> {
        if parsed.is_empty() {
            return None;
        }
        let boosts = BoostSpec::derive(parsed, raw, &self.config, &self.registry);
        Some(self.builder().build(parsed, raw, &boosts, Utc::now()))
    }

    /// The request a search would send. Never contacts the backend.
    pub fn dump(&self, raw: &RawQuery) -> Dump {
        let parsed = self.parse(raw);
        match self.assemble(&parsed, raw) {
            Some(query) => Dump {
                path: Some(format!("{}/_search", query.index.path())),
                op_class: Some(query.op_class),
                params: query.params(),
                body: query.to_body(),
            },
            None => Dump {
                path: None,
                op_class: None,
                params: Vec::new(),
                body: Value::Object(Default::default()),
            },
        }
    }

    /// Run a search.
    ///
    /// Returns [`crate::error::SearchlineError::Search`] when the search
    /// failed; the carried [`SearchFailure`] has a stable message key.
    pub async fn search(&self, raw: &RawQuery) -> Result<SearchResponse> {
        let request_id = Uuid::new_v4().to_string();
        let parsed = self.parse(raw);
        let Some(query) = self.assemble(&parsed, raw) else {
            debug!(request_id = %request_id, "Empty query, nothing to search for");
            return Ok(SearchResponse {
                output: SearchOutput::empty(raw.results_type),
                warnings: Vec::new(),
                degraded: false,
                timing: ExecutionTiming::default(),
                request_id,
            });
        };

        debug!(
            request_id = %request_id,
            query = %raw.text,
            index = %query.index.path(),
            op_class = query.op_class.as_str(),
            "Executing search"
        );

        let failure = match self.executor.execute(&query).await {
            ExecutionOutcome::Hits {
                response,
                timing,
                warning,
            } => {
                return Ok(self.respond(&response, raw, &parsed, timing, warning, false, request_id));
            }
            ExecutionOutcome::Failure { failure, .. } => failure,
        };

        let backend_failure = match failure {
            ExecutionFailure::Backend(backend_failure) => backend_failure,
            other => return Err(self.surface(&request_id, other).into()),
        };
        let class = self.classifier.classify(&backend_failure);
        warn!(
            request_id = %request_id,
            error_class = class.as_str(),
            error = %backend_failure,
            "Search failed"
        );
        let explained = self.classifier.explain(&backend_failure, class);
        if !class.allows_degraded_retry() {
            return Err(explained.into());
        }

        let Some(degraded) = self.builder().build_degraded(&parsed, raw) else {
            return Err(explained.into());
        };
        info!(
            request_id = %request_id,
            diagnostic = %explained.diagnostic,
            "Retrying with degraded query"
        );
        match self.executor.execute(&degraded).await {
            ExecutionOutcome::Hits {
                response,
                timing,
                warning,
            } => Ok(self.respond(&response, raw, &parsed, timing, warning, true, request_id)),
            ExecutionOutcome::Failure { failure, .. } => {
                Err(self.surface(&request_id, failure).into())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn respond(
        &self,
        response: &crate::backend::RawResponse,
        raw: &RawQuery,
        parsed: &ParsedQuery,
        timing: ExecutionTiming,
        warning: Option<&'static str>,
        degraded: bool,
        request_id: String,
    ) -> SearchResponse {
        let transformer =
            ResultTransformer::new(&self.registry, &self.config.backend.index_base_name);
        let output = transformer.transform(response, raw.results_type, parsed);
        let mut warnings: Vec<&'static str> = warning.into_iter().collect();
        if degraded {
            warnings.push(keys::DEGRADED_QUERY);
        }
        debug!(
            request_id = %request_id,
            hits = output.len(),
            total_hits = output.total_hits(),
            took_ms = response.took,
            degraded,
            "Search finished"
        );
        SearchResponse {
            output,
            warnings,
            degraded,
            timing,
            request_id,
        }
    }

    /// Failure reported to the caller for an attempt that is not retried.
    fn surface(&self, request_id: &str, failure: ExecutionFailure) -> SearchFailure {
        match failure {
            ExecutionFailure::Rejected(op) => SearchFailure::too_busy(
                op.too_busy_key(),
                format!("admission pool '{}' exhausted", op.as_str()),
            ),
            ExecutionFailure::TimedOut(op) => SearchFailure::timeout(
                op.timed_out_key(),
                format!("{} request exceeded its deadline", op.as_str()),
            ),
            ExecutionFailure::Backend(failure) => {
                let class = self.classifier.classify(&failure);
                warn!(
                    request_id = %request_id,
                    error_class = class.as_str(),
                    error = %failure,
                    "Search failed"
                );
                self.classifier.explain(&failure, class)
            }
        }
    }
}
