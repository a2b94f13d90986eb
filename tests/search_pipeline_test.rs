//! Integration tests for the search pipeline against a scripted backend.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use searchline::backend::{BackendFailure, BackendRequest, ErrorCause, RawResponse};
use searchline::error::{FailureKind, keys};
use searchline::prelude::*;

type Reply = std::result::Result<RawResponse, BackendFailure>;

/// Answers requests from a script and records what it was sent.
#[derive(Default)]
struct ScriptedBackend {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<BackendRequest>>,
    delay: Duration,
}

impl ScriptedBackend {
    fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(ScriptedBackend {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        })
    }

    fn slow(replies: Vec<Reply>, delay: Duration) -> Arc<Self> {
        Arc::new(ScriptedBackend {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            delay,
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    fn request(&self, n: usize) -> BackendRequest {
        self.requests.lock()[n].clone()
    }
}

#[async_trait]
impl SearchBackend for ScriptedBackend {
    async fn search(&self, request: &BackendRequest) -> Reply {
        self.requests.lock().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let reply = self.replies.lock().pop_front();
        reply.unwrap_or_else(|| Err(BackendFailure::transport("script exhausted")))
    }
}

fn hits(titles: &[&str]) -> RawResponse {
    let hits = titles
        .iter()
        .enumerate()
        .map(|(i, title)| {
            json!({
                "_index": "wiki_content",
                "_id": i.to_string(),
                "_score": 1.0,
                "_source": {"namespace": 0, "title": title},
                "highlight": {"title": [format!("<span class=\"searchmatch\">{title}</span>")]}
            })
        })
        .collect::<Vec<_>>();
    serde_json::from_value(json!({
        "took": 3,
        "timed_out": false,
        "hits": {"total": {"value": titles.len(), "relation": "eq"}, "max_score": 1.0, "hits": hits}
    }))
    .unwrap()
}

fn parse_failure() -> BackendFailure {
    BackendFailure::new(
        Some(400),
        ErrorCause::new("search_phase_execution_exception", "all shards failed")
            .with_root_cause(ErrorCause::new("query_shard_exception", "Failed to parse query"))
            .with_failed_shard(
                ErrorCause::new("query_shard_exception", "Failed to parse query").with_caused_by(
                    ErrorCause::new("parse_exception", "Cannot parse 'foo AND bar:'\nat line 1"),
                ),
            ),
    )
}

fn searcher(backend: Arc<ScriptedBackend>) -> Searcher {
    Searcher::new(SearchConfig::default(), backend).unwrap()
}

fn titles(response: &SearchResponse) -> Vec<String> {
    match &response.output {
        SearchOutput::FullText(full) => full.results.iter().map(|r| r.title.text.clone()).collect(),
        other => panic!("expected full text output, got {other:?}"),
    }
}

#[tokio::test]
async fn test_parse_error_retries_once_with_degraded_query() {
    let backend = ScriptedBackend::new(vec![Err(parse_failure()), Ok(hits(&["Foo"]))]);
    let searcher = searcher(backend.clone());

    let response = searcher.search(&RawQuery::new("foo \"bar baz\"")).await.unwrap();
    assert_eq!(titles(&response), vec!["Foo".to_string()]);
    assert!(response.degraded);
    assert_eq!(response.warnings, vec![keys::DEGRADED_QUERY]);
    assert_eq!(backend.calls(), 2);

    let retry = backend.request(1);
    let must = &retry.body["query"]["bool"]["must"][0];
    assert_eq!(must["simple_query_string"]["query"], "foo bar baz");
    assert!(retry.body.get("rescore").is_none());
    assert!(retry.body.get("suggest").is_none());
    assert_eq!(retry.index, backend.request(0).index);
}

#[tokio::test]
async fn test_degraded_failure_is_not_retried() {
    let backend = ScriptedBackend::new(vec![
        Err(parse_failure()),
        Err(parse_failure()),
        Ok(hits(&["Never"])),
    ]);
    let searcher = searcher(backend.clone());

    let error = searcher.search(&RawQuery::new("foo bar")).await.unwrap_err();
    let failure = error.as_search_failure().unwrap();
    assert_eq!(failure.kind, FailureKind::ParseError);
    assert_eq!(failure.message_key, keys::PARSE_ERROR);
    assert_eq!(failure.diagnostic, "Parse error on Cannot parse 'foo AND bar:'");
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn test_parse_error_without_text_surfaces() {
    let backend = ScriptedBackend::new(vec![Err(parse_failure())]);
    let searcher = searcher(backend.clone());

    let error = searcher.search(&RawQuery::new("incategory:Films")).await.unwrap_err();
    assert_eq!(error.as_search_failure().unwrap().message_key, keys::PARSE_ERROR);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_regex_too_complex_is_explained_not_retried() {
    let failure = BackendFailure::new(
        Some(500),
        ErrorCause::new("search_phase_execution_exception", "all shards failed").with_root_cause(
            ErrorCause::new(
                "too_complex_to_determinize_exception",
                "Determinizing automaton would result in more than 20000 states.",
            ),
        ),
    );
    let backend = ScriptedBackend::new(vec![Err(failure)]);
    let searcher = searcher(backend.clone());

    let error = searcher.search(&RawQuery::new("insource:/(a|b)*c{1,9}/")).await.unwrap_err();
    let failure = error.as_search_failure().unwrap();
    assert!(matches!(failure.kind, FailureKind::RegexTooComplex { .. }));
    assert_eq!(failure.message_key, keys::REGEX_TOO_COMPLEX);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_too_busy_never_reaches_backend() {
    let mut config = SearchConfig::default();
    config.pools.regex = 1;
    config.pools.admission_wait = Duration::from_millis(10);
    let backend = ScriptedBackend::slow(
        vec![Ok(hits(&["Slow"])), Ok(hits(&["Unused"]))],
        Duration::from_millis(300),
    );
    let searcher = Searcher::new(config, backend.clone()).unwrap();

    let slow_query = RawQuery::new("insource:/slow/");
    let busy_query = RawQuery::new("insource:/busy/");
    let slow = searcher.search(&slow_query);
    let busy = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        searcher.search(&busy_query).await
    };
    let (slow, busy) = tokio::join!(slow, busy);

    assert!(slow.is_ok());
    let failure = busy.unwrap_err();
    let failure = failure.as_search_failure().unwrap();
    assert_eq!(failure.kind, FailureKind::TooBusy);
    assert_eq!(failure.message_key, keys::REGEX_TOO_BUSY);
    assert!(failure.class.is_none());
    assert_eq!(backend.calls(), 1);

    let metrics = searcher.metrics();
    assert_eq!(metrics.rejected_requests, 1);
    assert_eq!(metrics.successful_requests, 1);
}

#[tokio::test]
async fn test_client_timeout() {
    let mut config = SearchConfig::default();
    config.timeouts.client_search = Duration::from_millis(20);
    let backend = ScriptedBackend::slow(vec![Ok(hits(&["Late"]))], Duration::from_millis(500));
    let searcher = Searcher::new(config, backend).unwrap();

    let error = searcher.search(&RawQuery::new("foo")).await.unwrap_err();
    let failure = error.as_search_failure().unwrap();
    assert_eq!(failure.kind, FailureKind::Timeout);
    assert_eq!(failure.message_key, keys::TIMED_OUT);
}

#[tokio::test]
async fn test_partial_results_carry_warning() {
    let mut partial = hits(&["Foo", "Bar"]);
    partial.timed_out = true;
    let backend = ScriptedBackend::new(vec![Ok(partial)]);
    let searcher = searcher(backend);

    let response = searcher.search(&RawQuery::new("foo")).await.unwrap();
    assert_eq!(titles(&response).len(), 2);
    assert_eq!(response.warnings, vec![keys::TIMED_OUT]);
    assert!(!response.degraded);
}

#[tokio::test]
async fn test_empty_query_short_circuits() {
    let backend = ScriptedBackend::new(vec![]);
    let searcher = searcher(backend.clone());

    let response = searcher
        .search(&RawQuery::new("   ").with_results_type(ResultsType::Titles))
        .await
        .unwrap();
    assert!(response.output.is_empty());
    assert!(matches!(response.output, SearchOutput::Titles { .. }));
    assert_eq!(backend.calls(), 0);
}

#[test]
fn test_dump_never_executes() {
    let backend = ScriptedBackend::new(vec![]);
    let searcher = searcher(backend.clone());

    let dump = searcher.dump(&RawQuery::new("prefix:Help:Con").with_namespaces([12]));
    assert_eq!(dump.path.as_deref(), Some("wiki_general/_search"));
    assert_eq!(
        dump.body["query"]["bool"]["filter"][0]["terms"]["namespace"],
        json!([12])
    );
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_unmatched_redirect_is_dropped() {
    let response: RawResponse = serde_json::from_value(json!({
        "took": 1,
        "hits": {"total": 1, "max_score": 2.0, "hits": [{
            "_index": "wiki_content",
            "_id": "7",
            "_score": 2.0,
            "_source": {"namespace": 0, "title": "Foo", "redirect": [{"namespace": 0, "title": "Fu"}]},
            "highlight": {"redirect.title": ["<span class=\"searchmatch\">Bar</span>"]}
        }]}
    }))
    .unwrap();
    let backend = ScriptedBackend::new(vec![Ok(response)]);
    let searcher = searcher(backend);

    let response = searcher.search(&RawQuery::new("bar")).await.unwrap();
    let SearchOutput::FullText(full) = response.output else {
        panic!("expected full text output");
    };
    assert_eq!(full.results[0].title.text, "Foo");
    assert!(full.results[0].redirect_title.is_none());
    assert_eq!(full.results[0].redirect_snippet, "");
    assert_eq!(full.results[0].title_snippet, "");
}

#[tokio::test]
async fn test_suggestion_keeps_consumed_syntax() {
    let response: RawResponse = serde_json::from_value(json!({
        "took": 1,
        "hits": {"total": 0, "hits": []},
        "suggest": {"title_suggest": [{"text": "speling", "offset": 0, "length": 7, "options": [
            {"text": "spelling", "highlighted": "<em>spelling</em>", "score": 0.9}
        ]}]}
    }))
    .unwrap();
    let backend = ScriptedBackend::new(vec![Ok(response)]);
    let searcher = searcher(backend.clone());

    let response = searcher.search(&RawQuery::new("incategory:Words speling")).await.unwrap();
    let SearchOutput::FullText(full) = response.output else {
        panic!("expected full text output");
    };
    let suggestion = full.suggestion.unwrap();
    assert_eq!(suggestion.text, "incategory:Words spelling");
    assert_eq!(suggestion.snippet, "incategory:Words <em>spelling</em>");
    assert_eq!(backend.request(0).body["suggest"]["text"], "speling");
}

#[test]
fn test_searcher_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"backend": {{"index_base_name": "enwiki"}}, "regex": {{"enabled": false}}}}"#
    )
    .unwrap();
    let config = SearchConfig::from_file(file.path()).unwrap();
    let backend = ScriptedBackend::new(vec![Ok(hits(&["Foo"]))]);
    let searcher = Searcher::new(config, backend.clone()).unwrap();

    let parsed = searcher.parse(&RawQuery::new("insource:/abc/i"));
    assert!(!parsed.uses_regex());

    let response = tokio_test::block_on(searcher.search(&RawQuery::new("foo"))).unwrap();
    assert_eq!(titles(&response), vec!["Foo".to_string()]);
    assert_eq!(backend.request(0).index, "enwiki");
}
